//! Login detection on a simulated job board.
//!
//! The state graph comes from YAML, the step functions from code. A
//! background task prints overlay-style progress from a `ChannelSink`, and
//! Ctrl-C cancels the run even while it waits for a manual login.
//!
//! Run with `RUST_LOG=tsunagi=debug cargo run --example seek_login`.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tsunagi::prelude::*;
use tsunagi::{
    BrowserDriver, CancellationToken, ChannelSink, DriverError, Element, SelectorCatalog,
    SelectorSet, StatusEvent, StepLibrary, TracingSink, WorkflowDefinition,
};

const DEFINITION: &str = r#"
workflow_meta:
  title: Seek
  description: Open the job board and wait until the user is signed in
  start_step: open_homepage
terminal_states: [done]
engine:
  max_steps: 50
  step_delay_ms: 100
steps_config:
  open_homepage:
    step: 1
    transitions:
      homepage_opened: wait_for_load
      page_navigation_failed: done
    timeout: 20
    on_timeout_event: page_navigation_failed
    on_crash: fail
  wait_for_load:
    step: 2
    transitions: { page_loaded: detect_page_state, page_load_retry: open_homepage }
    timeout: 20
    max_visits: 3
  detect_page_state:
    step: 3
    transitions: { sign_in_required: await_manual_login, logged_in: done }
  await_manual_login:
    step: 4
    transitions:
      login_pending: await_manual_login
      login_detected: detect_page_state
      "*": detect_page_state
    max_visits: 30
    backoff: { kind: fixed, delay: 250 }
"#;

const SELECTORS: &str = r#"{
    "sign_in": ["a[data-automation='sign in']", "a[href*='oauth/login']"],
    "account_menu": "button[data-automation='account menu']"
}"#;

/// Pretends to be a browser tab; the user "signs in" after a few polls.
struct SimulatedBrowser {
    polls_until_login: AtomicU32,
}

#[async_trait]
impl BrowserDriver for SimulatedBrowser {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!("  [browser] loaded {}", url);
        Ok(())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn find(&self, selectors: &SelectorSet) -> Result<Option<Element>, DriverError> {
        if self.polls_until_login.load(Ordering::SeqCst) == 0 {
            return Ok(None);
        }
        Ok(selectors.iter().next().map(|s| Element::new("sign-in-link", s)))
    }

    async fn click(&self, _element: &Element) -> Result<(), DriverError> {
        Ok(())
    }

    async fn fill(&self, _element: &Element, _text: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for(
        &self,
        selectors: &SelectorSet,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        tokio::time::sleep(timeout).await;
        let remaining = self.polls_until_login.load(Ordering::SeqCst);
        if remaining > 0 {
            self.polls_until_login.store(remaining - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(selectors.iter().next().map(|s| Element::new("account-menu", s)))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok("https://www.seek.com.au/".to_string())
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok("SEEK - Australia's no. 1 jobs site".to_string())
    }
}

define_step!(OpenHomepage);

#[async_trait]
impl Step for OpenHomepage {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let url: String = ctx.setting("home_url")?;
        ctx.driver()?.navigate(&url).await?;
        Ok(Some("homepage_opened".into()))
    }
}

define_step!(WaitForLoad);

#[async_trait]
impl Step for WaitForLoad {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let title = ctx.driver()?.title().await?;
        let outcome = if title.contains("SEEK") {
            "page_loaded"
        } else {
            "page_load_retry"
        };
        Ok(Some(outcome.into()))
    }
}

define_step!(DetectPageState);

#[async_trait]
impl Step for DetectPageState {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let sign_in = ctx.selector("sign_in")?;
        let outcome = match ctx.driver()?.find(sign_in).await? {
            Some(_) => "sign_in_required",
            None => "logged_in",
        };
        Ok(Some(outcome.into()))
    }
}

define_step!(AwaitManualLogin);

#[async_trait]
impl Step for AwaitManualLogin {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let menu = ctx.selector("account_menu")?;
        let found = ctx
            .driver()?
            .wait_for(menu, Duration::from_millis(500))
            .await?;
        let outcome = match found {
            Some(_) => "login_detected",
            None => "login_pending",
        };
        Ok(Some(outcome.into()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let definition = WorkflowDefinition::from_yaml_str(DEFINITION)?;
    let library = StepLibrary::new()
        .with("open_homepage", OpenHomepage)
        .with("wait_for_load", WaitForLoad)
        .with("detect_page_state", DetectPageState)
        .with("await_manual_login", AwaitManualLogin);

    let (sink, mut events) = ChannelSink::new();
    let workflow = definition
        .into_workflow(&library)?
        .with_status_sink(Arc::new(sink))
        .with_status_sink(Arc::new(TracingSink));

    let overlay = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                StatusEvent::Entry(entry) => println!(
                    "[overlay] #{} {} -> {}",
                    entry.sequence,
                    entry.state,
                    entry.outcome.as_ref().map(Outcome::as_str).unwrap_or("(none)")
                ),
                StatusEvent::Finished(status) => println!("[overlay] finished: {}", status),
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let browser = Arc::new(SimulatedBrowser {
        polls_until_login: AtomicU32::new(4),
    });
    let ctx = Context::builder()
        .driver(browser)
        .selectors(SelectorCatalog::from_json_str(SELECTORS)?)
        .settings(json!({ "home_url": "https://www.seek.com.au/" }))
        .build();

    let result = workflow
        .run_with_cancel(
            definition.start_state(),
            ctx,
            definition.terminal_states(),
            cancel,
        )
        .await;

    drop(workflow);
    overlay.await?;

    println!("\nPath:");
    for entry in &result.trace {
        println!(
            "  {:>2}. {:<20} {:>5} ms  {:?}",
            entry.sequence,
            entry.state.as_str(),
            entry.duration.as_millis(),
            entry.source
        );
    }

    match result.into_result() {
        Ok(_) => println!("Signed in, ready to search"),
        Err(e) => eprintln!("Run did not complete: {}", e),
    }

    Ok(())
}
