use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tsunagi::prelude::*;
use tsunagi::{
    BrowserDriver, DriverError, Element, OutcomeSource, SelectorCatalog, SelectorSet,
    StepLibrary, WorkflowDefinition,
};

/// In-memory browser: the sign-in link disappears once the user has
/// "logged in", which happens after a fixed number of polls.
struct FakeBrowser {
    title: String,
    url: Mutex<String>,
    navigations: Mutex<Vec<String>>,
    polls_until_login: AtomicU32,
}

impl FakeBrowser {
    fn new(title: &str, polls_until_login: u32) -> Self {
        Self {
            title: title.to_string(),
            url: Mutex::new("about:blank".to_string()),
            navigations: Mutex::new(Vec::new()),
            polls_until_login: AtomicU32::new(polls_until_login),
        }
    }

    fn logged_in(&self) -> bool {
        self.polls_until_login.load(Ordering::SeqCst) == 0
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        if !url.starts_with("https://") {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                details: "unsupported scheme".to_string(),
            });
        }
        *self.url.lock().unwrap() = url.to_string();
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn find(&self, selectors: &SelectorSet) -> Result<Option<Element>, DriverError> {
        let sign_in_visible = !self.logged_in();
        Ok(selectors
            .iter()
            .find(|s| s.contains("sign in") && sign_in_visible)
            .map(|s| Element::new("el-1", s)))
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
        _timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        let remaining = self.polls_until_login.load(Ordering::SeqCst);
        if remaining > 0 {
            self.polls_until_login.store(remaining - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(selectors.iter().next().map(|s| Element::new("avatar", s)))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.title.clone())
    }
}

define_step!(OpenHomepage);

#[async_trait]
impl Step for OpenHomepage {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let url: String = ctx.setting("search_url")?;
        ctx.driver()?.navigate(&url).await?;
        Ok(Some("homepage_opened".into()))
    }
}

define_step!(WaitForPageLoad);

#[async_trait]
impl Step for WaitForPageLoad {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let title = ctx.driver()?.title().await?;
        let outcome = if title.to_lowercase().contains("seek") {
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
        let found = ctx.driver()?.find(sign_in).await?;
        let outcome = if found.is_some() {
            "sign_in_required"
        } else {
            "logged_in"
        };
        Ok(Some(outcome.into()))
    }
}

define_step!(AwaitManualLogin);

#[async_trait]
impl Step for AwaitManualLogin {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let avatar = ctx.selector("avatar")?;
        let found = ctx
            .driver()?
            .wait_for(avatar, Duration::from_secs(5))
            .await?;
        let polls = ctx.get::<u32>("login_polls").copied().unwrap_or(0);
        ctx.insert("login_polls", polls + 1);
        Ok(Some(
            if found.is_some() {
                "login_detected"
            } else {
                "login_pending"
            }
            .into(),
        ))
    }
}

define_step!(FinishRun);

#[async_trait]
impl Step for FinishRun {
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
        let url = ctx.driver()?.current_url().await?;
        ctx.insert("final_url", url);
        Ok(None)
    }
}

fn catalog() -> SelectorCatalog {
    SelectorCatalog::from_json_str(
        r#"{
            "sign_in": ["a[data-automation='sign in']", "a[href*='oauth/login']"],
            "avatar": "button[data-automation='account menu']"
        }"#,
    )
    .unwrap()
}

fn login_workflow() -> Workflow {
    Workflow::builder()
        .title("Seek login")
        .step("open_homepage", OpenHomepage)
        .step("wait_for_load", WaitForPageLoad)
        .step("detect_page_state", DetectPageState)
        .step("await_manual_login", AwaitManualLogin)
        .step("finish_run", FinishRun)
        .transition("open_homepage", "homepage_opened", "wait_for_load")
        .transition("open_homepage", "open_homepage_crashed", "no_browser")
        .transition("wait_for_load", "page_loaded", "detect_page_state")
        .transition("wait_for_load", "page_load_retry", "open_homepage")
        .transition("detect_page_state", "sign_in_required", "await_manual_login")
        .transition("detect_page_state", "logged_in", "finish_run")
        .transition("await_manual_login", "login_pending", "await_manual_login")
        .transition("await_manual_login", "login_detected", "detect_page_state")
        .max_visits("await_manual_login", 30)
        .max_visits("open_homepage", 2)
        .build()
        .unwrap()
}

fn context(browser: Arc<FakeBrowser>) -> Context {
    Context::builder()
        .driver(browser)
        .selectors(catalog())
        .settings(json!({ "search_url": "https://www.seek.com.au/rust-jobs/in-sydney" }))
        .build()
}

#[tokio::test]
async fn test_manual_login_flow() {
    let browser = Arc::new(FakeBrowser::new("SEEK - Jobs", 4));
    let workflow = login_workflow();
    assert!(workflow.validate(["finish_run", "no_browser"]).is_ok());

    let result = workflow
        .run("open_homepage", context(browser.clone()), ["finish_run", "no_browser"])
        .await;

    assert!(result.is_completed(), "status: {}", result.status);
    assert_eq!(result.final_state, "finish_run");
    assert_eq!(result.trace.visits("await_manual_login"), 5);
    assert_eq!(result.trace.visits("detect_page_state"), 2);
    assert_eq!(result.context.get::<u32>("login_polls"), Some(&5));
    assert_eq!(
        result.context.get::<String>("final_url").map(String::as_str),
        Some("https://www.seek.com.au/rust-jobs/in-sydney")
    );
    assert_eq!(browser.navigations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_already_logged_in_stops_early() {
    let browser = Arc::new(FakeBrowser::new("SEEK - Jobs", 0));
    let result = login_workflow()
        .run("open_homepage", context(browser), ["finish_run", "no_browser"])
        .await;

    assert!(result.is_completed());
    assert_eq!(result.trace.visits("await_manual_login"), 0);
}

#[tokio::test]
async fn test_stop_once_logged_in() {
    let browser = Arc::new(FakeBrowser::new("SEEK - Jobs", 0));
    let result = login_workflow()
        .run("open_homepage", context(browser), ["detect_page_state"])
        .await;

    assert!(result.is_completed());
    assert_eq!(result.final_state, "detect_page_state");
    assert!(!result.context.contains_key("final_url"));
}

#[tokio::test]
async fn test_missing_driver_routes_crash() {
    let ctx = Context::builder()
        .selectors(catalog())
        .settings(json!({ "search_url": "https://www.seek.com.au" }))
        .build();
    let result = login_workflow()
        .run("open_homepage", ctx, ["finish_run", "no_browser"])
        .await;

    assert!(result.is_completed());
    assert_eq!(result.final_state, "no_browser");
    let entry = &result.trace.entries()[0];
    assert_eq!(entry.source, OutcomeSource::Crashed);
    assert_eq!(
        entry.error.as_deref(),
        Some("No browser driver attached to the context")
    );
}

#[tokio::test]
async fn test_wrong_site_exhausts_reload_loop() {
    let browser = Arc::new(FakeBrowser::new("Example Domain", 0));
    let result = login_workflow()
        .run("open_homepage", context(browser.clone()), ["finish_run"])
        .await;

    assert_eq!(
        result.error(),
        Some(&WorkflowError::Exhausted {
            state: State::new("open_homepage"),
            visits: 2,
            max_visits: 2,
        })
    );
    assert_eq!(browser.navigations.lock().unwrap().len(), 2);
}

const LOGIN_YAML: &str = r#"
workflow_meta:
  title: Seek
  description: Detect login state on seek.com.au
  start_step: open_homepage
terminal_states: [done]
steps_config:
  open_homepage:
    step: 1
    transitions: { homepage_opened: wait_for_load, "*": done }
    timeout: 20
    on_timeout_event: page_navigation_failed
  wait_for_load:
    step: 2
    transitions: { page_loaded: detect_page_state, page_load_retry: open_homepage }
    timeout: 20
  detect_page_state:
    step: 3
    transitions: { sign_in_required: await_manual_login, logged_in: done }
  await_manual_login:
    step: 4
    func: poll_login
    transitions: { login_pending: await_manual_login, login_detected: detect_page_state }
    max_visits: 10
"#;

#[tokio::test]
async fn test_yaml_defined_workflow() {
    let definition = WorkflowDefinition::from_yaml_str(LOGIN_YAML).unwrap();
    let library = StepLibrary::new()
        .with("open_homepage", OpenHomepage)
        .with("wait_for_load", WaitForPageLoad)
        .with("detect_page_state", DetectPageState)
        .with("poll_login", AwaitManualLogin);
    let workflow = definition.into_workflow(&library).unwrap();

    let browser = Arc::new(FakeBrowser::new("SEEK - Jobs", 2));
    let result = workflow
        .run(
            definition.start_state(),
            context(browser),
            definition.terminal_states(),
        )
        .await;

    assert!(result.is_completed(), "status: {}", result.status);
    assert_eq!(result.final_state, "done");
    let path: Vec<&str> = result.trace.path().iter().map(|s| s.as_str()).collect();
    assert_eq!(
        path,
        vec![
            "open_homepage",
            "wait_for_load",
            "detect_page_state",
            "await_manual_login",
            "await_manual_login",
            "await_manual_login",
            "detect_page_state",
        ]
    );
}
