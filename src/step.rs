use crate::context::Context;
use crate::error::StepError;
use crate::state::{Outcome, State};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the engine does when a step returns an error or panics.
///
/// # Examples
///
/// ```
/// use tsunagi::CrashPolicy;
///
/// assert_eq!(CrashPolicy::default(), CrashPolicy::Route);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashPolicy {
    /// Convert the failure into a `"<state>_crashed"` outcome and route it
    /// through the transition table like any other outcome.
    #[default]
    Route,
    /// End the run with [`WorkflowError::StepExecution`](crate::WorkflowError::StepExecution).
    Fail,
}

/// Per-state execution settings.
///
/// # Examples
///
/// ```
/// use tsunagi::{StateConfig, CrashPolicy};
/// use std::time::Duration;
///
/// let config = StateConfig::default()
///     .with_timeout(Duration::from_secs(20))
///     .with_timeout_outcome("page_load_retry")
///     .with_crash_policy(CrashPolicy::Fail);
///
/// assert_eq!(config.timeout, Some(Duration::from_secs(20)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum time the step may run. `None` falls back to the engine default.
    pub timeout: Option<Duration>,
    /// Outcome produced on timeout. `None` means `"<state>_timeout"`.
    pub timeout_outcome: Option<Outcome>,
    /// Handling of step errors and panics. Default: route as an outcome.
    pub on_crash: CrashPolicy,
}

impl StateConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_outcome(mut self, outcome: impl Into<Outcome>) -> Self {
        self.timeout_outcome = Some(outcome.into());
        self
    }

    pub fn with_crash_policy(mut self, policy: CrashPolicy) -> Self {
        self.on_crash = policy;
        self
    }

    /// The outcome a timeout in `state` resolves to.
    pub fn outcome_on_timeout(&self, state: &State) -> Outcome {
        self.timeout_outcome
            .clone()
            .unwrap_or_else(|| Outcome::timed_out(state))
    }
}

/// A unit of browser interaction bound to a state.
///
/// A step may suspend any number of times (navigation, element waits, a
/// human finishing a manual login) and then resolves to exactly one
/// [`Outcome`]. Returning `Ok(None)` means "no further transition" and is
/// only accepted from terminal states.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
/// use async_trait::async_trait;
///
/// define_step!(WaitForPageLoad);
///
/// #[async_trait]
/// impl Step for WaitForPageLoad {
///     async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
///         let title = ctx.driver()?.title().await?;
///         let outcome = if title.to_lowercase().contains("seek") {
///             "page_loaded"
///         } else {
///             "page_load_retry"
///         };
///         Ok(Some(outcome.into()))
///     }
/// }
/// ```
#[async_trait]
pub trait Step: Send + Sync {
    /// Performs the step's work and reports what happened.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(outcome))` - Route `outcome` through the transition table
    /// - `Ok(None)` - No further transition (terminal states only)
    /// - `Err(error)` - Step crashed; handled per the state's [`CrashPolicy`]
    async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError>;

    /// Returns the step name used in logs.
    ///
    /// By default, uses the type name. Override to provide a custom name.
    fn name(&self) -> String {
        let full_name = std::any::type_name::<Self>();
        full_name
            .split("::")
            .last()
            .unwrap_or("UnknownStep")
            .to_string()
    }

    /// Default configuration for every state this step is bound to.
    ///
    /// Settings given to the workflow builder for a specific state take
    /// precedence.
    fn config(&self) -> StateConfig {
        StateConfig::default()
    }
}
