use crate::driver::DriverError;
use crate::state::{Outcome, State};
use thiserror::Error;

/// Errors that end a workflow run.
///
/// Every variant carries enough context to diagnose the failure without
/// re-running: the offending state, the outcome that could not be routed,
/// or the visit counts that exceeded their bound.
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code. When matching
/// on this error, always include a wildcard pattern:
///
/// ```
/// use tsunagi::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::UnmappedTransition { state, outcome } => {
///             format!("no route for '{}' out of '{}'", outcome, state)
///         }
///         WorkflowError::Exhausted { state, visits, max_visits } => {
///             format!("'{}' visited {} times (max {})", state, visits, max_visits)
///         }
///         WorkflowError::Cancelled { state } => format!("cancelled in '{}'", state),
///         _ => error.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkflowError {
    /// No step is registered for a state the run reached.
    ///
    /// This is a defect in the workflow definition, never a runtime
    /// condition, so it is always fatal.
    #[error("No step registered for state: {0}")]
    UnknownState(State),

    /// The step's outcome has neither an explicit transition nor a catch-all.
    #[error("No transition for outcome '{outcome}' in state '{state}'")]
    UnmappedTransition {
        /// The state whose step produced the outcome
        state: State,
        /// The outcome that could not be routed
        outcome: Outcome,
    },

    /// The retry policy refused another visit to a state.
    #[error("State '{state}' exhausted after {visits} visits (max {max_visits})")]
    Exhausted {
        /// The state that could not be entered again
        state: State,
        /// Visits completed before the refusal
        visits: u32,
        /// The configured bound for the state
        max_visits: u32,
    },

    /// A step failed in a state configured to fail fast on crashes.
    #[error("Step failed in state '{state}': {details}")]
    StepExecution {
        /// The state whose step failed
        state: State,
        /// Details about the failure
        details: String,
    },

    /// A non-terminal step finished without producing an outcome.
    #[error("Step in non-terminal state '{0}' produced no outcome")]
    MissingOutcome(State),

    /// The engine-wide step cap was reached.
    #[error("Step limit of {limit} reached")]
    StepLimitReached {
        /// The configured cap
        limit: u32,
    },

    /// External cancellation was observed while the run was suspended.
    #[error("Run cancelled in state '{state}'")]
    Cancelled {
        /// The state that was executing when cancellation fired
        state: State,
    },

    /// The workflow configuration is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),
}

/// Failure raised inside a step.
///
/// Depending on the state's [`CrashPolicy`](crate::CrashPolicy) the engine
/// either converts it into a `"<state>_crashed"` outcome or fails the run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StepError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("No browser driver attached to the context")]
    NoDriver,

    #[error("Selector '{0}' not found in catalog")]
    MissingSelector(String),

    #[error("Context value '{0}' missing or of unexpected type")]
    MissingValue(String),

    #[error("Setting '{key}' unavailable: {details}")]
    Setting { key: String, details: String },

    #[error("Step panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn failed(details: impl Into<String>) -> Self {
        StepError::Failed(details.into())
    }
}

/// Errors produced while loading workflow definitions or selector catalogs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("Failed to read definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State '{state}' references unknown step function '{func}'")]
    UnknownFunction { state: String, func: String },

    #[error("Invalid definition: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = WorkflowError::UnmappedTransition {
            state: State::new("S0"),
            outcome: Outcome::new("weird"),
        };
        assert_eq!(
            error.to_string(),
            "No transition for outcome 'weird' in state 'S0'"
        );

        let error = WorkflowError::Exhausted {
            state: State::new("S0"),
            visits: 3,
            max_visits: 3,
        };
        assert_eq!(
            error.to_string(),
            "State 'S0' exhausted after 3 visits (max 3)"
        );

        let error = WorkflowError::UnknownState(State::new("ghost"));
        assert_eq!(error.to_string(), "No step registered for state: ghost");
    }

    #[test]
    fn test_step_error_from_driver() {
        let error: StepError = DriverError::SessionClosed.into();
        assert_eq!(error.to_string(), "Browser session closed");
        assert_eq!(StepError::failed("no cards").to_string(), "no cards");
    }
}
