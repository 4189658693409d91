//! Commonly used types and traits

pub use crate::context::Context;
pub use crate::define_step;
pub use crate::error::{StepError, WorkflowError};
pub use crate::registry::StepRegistry;
pub use crate::state::{Outcome, State};
pub use crate::step::{CrashPolicy, StateConfig, Step};
pub use crate::transition::TransitionTable;
pub use crate::workflow::{RunResult, RunStatus, Workflow};
