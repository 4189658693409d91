//! # Tsunagi (繋ぎ)
//!
//! A small state-machine runtime for multi-step browser automation.
//!
//! "Tsunagi" (繋ぎ) means "a link" or "a connection" in Japanese: each step
//! reports what happened, and a transition table links that outcome to the
//! next step.
//!
//! Real sites are flaky. A page sometimes asks for a login and sometimes
//! doesn't, an element sometimes never loads. Tsunagi keeps the control
//! flow for such runs deterministic and inspectable:
//!
//! - **States and transitions are data**: a [`TransitionTable`] maps
//!   `(state, outcome)` to the next state, with an optional `"*"` catch-all
//! - **One outcome per step**: a [`Step`] suspends as long as it needs and
//!   resolves to exactly one [`Outcome`]
//! - **Crashes are outcomes**: errors and panics become `"<state>_crashed"`
//!   and are routed like anything else (or fail fast, per [`CrashPolicy`])
//! - **Bounded retries**: a per-state [`RetryPolicy`] ends runs that loop
//! - **Cancellable**: every suspension races a [`CancellationToken`]
//! - **Inspectable**: every run returns its [`ExecutionTrace`]
//!
//! ## Quick Start
//!
//! ```rust
//! use tsunagi::prelude::*;
//! use async_trait::async_trait;
//!
//! define_step!(DetectPageState);
//! define_step!(ShowSignInBanner);
//!
//! #[async_trait]
//! impl Step for DetectPageState {
//!     async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
//!         let signed_in = ctx.get::<bool>("signed_in").copied().unwrap_or(false);
//!         let outcome = if signed_in { "logged_in" } else { "sign_in_required" };
//!         Ok(Some(outcome.into()))
//!     }
//! }
//!
//! #[async_trait]
//! impl Step for ShowSignInBanner {
//!     async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
//!         // a human signs in here
//!         ctx.insert("signed_in", true);
//!         Ok(Some("signin_banner_shown".into()))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let workflow = Workflow::builder()
//!     .step("detect_page_state", DetectPageState)
//!     .step("show_sign_in_banner", ShowSignInBanner)
//!     .transition("detect_page_state", "logged_in", "done")
//!     .transition("detect_page_state", "sign_in_required", "show_sign_in_banner")
//!     .transition("show_sign_in_banner", "signin_banner_shown", "detect_page_state")
//!     .build()
//!     .expect("valid workflow");
//!
//! let result = workflow.run("detect_page_state", Context::new(), ["done"]).await;
//!
//! assert!(result.is_completed());
//! assert_eq!(result.trace.visits("detect_page_state"), 2);
//! # }
//! ```
//!
//! ## Handling Failures
//!
//! Every run returns a [`RunResult`]; nothing is thrown past it.
//!
//! ```rust
//! use tsunagi::prelude::*;
//!
//! fn report(result: &RunResult) {
//!     match &result.status {
//!         RunStatus::Completed => println!("done in {} steps", result.trace.len()),
//!         RunStatus::Cancelled => println!("browser closed in {}", result.final_state),
//!         RunStatus::Failed(WorkflowError::UnmappedTransition { state, outcome }) => {
//!             eprintln!("no route for '{}' from '{}'", outcome, state);
//!         }
//!         RunStatus::Failed(error) => eprintln!("run failed: {}", error),
//!     }
//! }
//! ```

mod config;
mod context;
mod driver;
mod error;
mod registry;
mod retry;
mod state;
mod step;
mod trace;
mod transition;
mod workflow;

pub mod prelude;

pub use config::{
    EngineConfig, EngineSection, StateDefinition, StepLibrary, WorkflowDefinition, WorkflowMeta,
    DEFAULT_TERMINAL_STATE,
};
pub use context::{Context, ContextBuilder, ContextKey};
pub use driver::{BrowserDriver, DriverError, Element, SelectorCatalog, SelectorSet};
pub use error::{DefinitionError, StepError, WorkflowError};
pub use registry::StepRegistry;
pub use retry::{Backoff, RetryPolicy, RetryPolicyError, VisitCounts, DEFAULT_MAX_VISITS};
pub use state::{Outcome, State};
pub use step::{CrashPolicy, StateConfig, Step};
pub use trace::{
    ChannelSink, ExecutionTrace, OutcomeSource, StatusEvent, StatusSink, TraceEntry, TracingSink,
};
pub use transition::TransitionTable;
pub use workflow::{run, RunResult, RunStatus, Workflow, WorkflowBuilder};

pub use tokio_util::sync::CancellationToken;

/// Macro to define a step with minimal boilerplate
///
/// This macro creates a unit step struct with:
/// - `const NAME: &'static str` - compile-time step name
/// - `Debug` derive
/// - `Default` implementation
///
/// # Example
///
/// ```rust
/// use tsunagi::define_step;
///
/// define_step!(OpenHomepage);
/// assert_eq!(OpenHomepage::NAME, "OpenHomepage");
/// ```
#[macro_export]
macro_rules! define_step {
    ($name:ident) => {
        #[derive(Debug)]
        pub struct $name;

        impl $name {
            /// Step name as a compile-time constant
            #[allow(dead_code)]
            pub const NAME: &'static str = stringify!($name);
        }

        impl Default for $name {
            fn default() -> Self {
                Self
            }
        }
    };
}
