//! Engine settings and YAML workflow definitions.
//!
//! A definition describes the state graph as data: which step function each
//! state runs, where each outcome leads, and the per-state timeout and retry
//! settings. Step functions themselves are code and are supplied through a
//! [`StepLibrary`] when the definition is turned into a [`Workflow`].
//!
//! ```yaml
//! workflow_meta:
//!   title: Seek
//!   description: Search and apply on seek.com.au
//!   start_step: open_homepage
//! terminal_states: [done]
//! engine:
//!   max_steps: 50
//!   step_delay_ms: 100
//! steps_config:
//!   open_homepage:
//!     func: open_homepage
//!     transitions:
//!       homepage_opened: wait_for_load
//!       "*": done
//!     timeout: 20
//!     on_timeout_event: page_navigation_failed
//!   wait_for_load:
//!     transitions: { page_loaded: done, page_load_retry: open_homepage }
//!     max_visits: 3
//!     backoff: { kind: fixed, delay: 500 }
//!     on_crash: fail
//! ```

use crate::error::DefinitionError;
use crate::retry::Backoff;
use crate::state::State;
use crate::step::{CrashPolicy, Step};
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Terminal state assumed when a definition declares none.
pub const DEFAULT_TERMINAL_STATE: &str = "done";

/// Engine-wide execution settings.
///
/// # Examples
///
/// ```
/// use tsunagi::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig {
///     max_steps: Some(50),
///     step_delay: Duration::from_millis(100),
///     ..EngineConfig::default()
/// };
/// assert_eq!(config.default_timeout, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cap on step invocations per run. `None` leaves termination to the
    /// retry policy alone.
    pub max_steps: Option<u32>,
    /// Pause between consecutive steps. Default: none.
    pub step_delay: Duration,
    /// Timeout for states that configure none. Default: no timeout.
    pub default_timeout: Option<Duration>,
}

/// Named step functions a [`WorkflowDefinition`] can refer to.
#[derive(Default, Clone)]
pub struct StepLibrary {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl std::fmt::Debug for StepLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.steps.keys()).finish()
    }
}

impl StepLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Step + 'static>(mut self, name: impl Into<String>, step: S) -> Self {
        self.insert(name, Arc::new(step));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, step: Arc<dyn Step>) {
        self.steps.insert(name.into(), step);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_steps: Option<u32>,
    pub step_delay_ms: u64,
    /// Seconds.
    pub default_timeout: Option<f64>,
}

/// One state in a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDefinition {
    /// Display ordinal, e.g. `1.5` for a step inserted between 1 and 2.
    pub step: Option<f64>,
    /// Step function name. Defaults to the state name.
    pub func: Option<String>,
    pub transitions: BTreeMap<String, String>,
    /// Seconds.
    pub timeout: Option<f64>,
    pub on_timeout_event: Option<String>,
    pub max_visits: Option<u32>,
    pub backoff: Option<Backoff>,
    pub on_crash: Option<CrashPolicy>,
}

/// A workflow graph loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_meta: WorkflowMeta,
    #[serde(default)]
    pub terminal_states: Vec<String>,
    #[serde(default)]
    pub engine: EngineSection,
    pub steps_config: BTreeMap<String, StateDefinition>,
}

fn seconds(value: f64, what: &str) -> Result<Duration, DefinitionError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        DefinitionError::Invalid(format!(
            "{} must be a non-negative number of seconds",
            what
        ))
    })
}

impl WorkflowDefinition {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        if !definition
            .steps_config
            .contains_key(&definition.workflow_meta.start_step)
        {
            return Err(DefinitionError::Invalid(format!(
                "start_step '{}' is not defined in steps_config",
                definition.workflow_meta.start_step
            )));
        }
        Ok(definition)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn start_state(&self) -> State {
        State::new(&self.workflow_meta.start_step)
    }

    /// Declared terminal states, or `["done"]` when none are declared.
    pub fn terminal_states(&self) -> Vec<State> {
        if self.terminal_states.is_empty() {
            vec![State::new(DEFAULT_TERMINAL_STATE)]
        } else {
            self.terminal_states.iter().map(State::new).collect()
        }
    }

    /// Resolves step functions against `library` and assembles a workflow.
    ///
    /// The result is validated against the definition's terminal states, so
    /// every transition target either has a step or is terminal.
    pub fn into_workflow(&self, library: &StepLibrary) -> Result<Workflow, DefinitionError> {
        let mut builder = Workflow::builder().title(&self.workflow_meta.title);
        if !self.workflow_meta.description.is_empty() {
            builder = builder.description(&self.workflow_meta.description);
        }

        if let Some(limit) = self.engine.max_steps {
            builder = builder.max_steps(limit);
        }
        builder = builder.step_delay(Duration::from_millis(self.engine.step_delay_ms));
        if let Some(secs) = self.engine.default_timeout {
            builder = builder.default_timeout(seconds(secs, "engine.default_timeout")?);
        }

        for (name, def) in &self.steps_config {
            let func = def.func.as_deref().unwrap_or(name);
            let step = library
                .get(func)
                .ok_or_else(|| DefinitionError::UnknownFunction {
                    state: name.clone(),
                    func: func.to_string(),
                })?;
            debug!(state = %name, func, "Binding step function");
            builder = builder.shared_step(name.as_str(), Arc::clone(step));
            if let Some(ordinal) = def.step {
                builder = builder.ordinal(name.as_str(), ordinal);
            }

            for (outcome, target) in &def.transitions {
                builder = builder.transition(name.as_str(), outcome.as_str(), target.as_str());
            }
            if let Some(secs) = def.timeout {
                let timeout = seconds(secs, &format!("{}.timeout", name))?;
                builder = builder.timeout(name.as_str(), timeout);
            }
            if let Some(event) = &def.on_timeout_event {
                builder = builder.timeout_outcome(name.as_str(), event.as_str());
            }
            if let Some(max) = def.max_visits {
                builder = builder.max_visits(name.as_str(), max);
            }
            if let Some(backoff) = &def.backoff {
                builder = builder.backoff(name.as_str(), backoff.clone());
            }
            if let Some(policy) = def.on_crash {
                builder = builder.crash_policy(name.as_str(), policy);
            }
        }

        let workflow = builder
            .build()
            .map_err(|e| DefinitionError::Invalid(e.to_string()))?;
        workflow
            .validate(self.terminal_states())
            .map_err(|e| DefinitionError::Invalid(e.to_string()))?;
        Ok(workflow)
    }
}
