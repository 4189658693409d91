use crate::error::WorkflowError;
use crate::state::State;
use crate::step::{StateConfig, Step};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct StepEntry {
    step: Arc<dyn Step>,
    config: StateConfig,
}

/// Maps each state to the step bound to it.
///
/// One step may serve several states (the same "refresh and wait" logic
/// behind different retry paths), so steps are held behind an `Arc`.
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<State, StepEntry>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.steps
                    .iter()
                    .map(|(state, entry)| (state.as_str(), entry.step.name())),
            )
            .finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `step` to `state`, using the step's own default config.
    pub fn register<S: Step + 'static>(&mut self, state: impl Into<State>, step: S) {
        self.register_shared(state, Arc::new(step));
    }

    pub fn register_shared(&mut self, state: impl Into<State>, step: Arc<dyn Step>) {
        let config = step.config();
        self.steps.insert(state.into(), StepEntry { step, config });
    }

    /// Replaces the config of an already registered state.
    ///
    /// Returns `false` when nothing is registered for `state`.
    pub fn configure(&mut self, state: &State, config: StateConfig) -> bool {
        match self.steps.get_mut(state) {
            Some(entry) => {
                entry.config = config;
                true
            }
            None => false,
        }
    }

    /// Returns the step bound to `state`.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::UnknownState`] when nothing is registered.
    pub fn lookup(&self, state: &State) -> Result<&Arc<dyn Step>, WorkflowError> {
        self.steps
            .get(state)
            .map(|entry| &entry.step)
            .ok_or_else(|| WorkflowError::UnknownState(state.clone()))
    }

    /// The effective config for `state`, if registered.
    pub fn config(&self, state: &State) -> Option<&StateConfig> {
        self.steps.get(state).map(|entry| &entry.config)
    }

    pub fn contains(&self, state: &State) -> bool {
        self.steps.contains_key(state)
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.steps.keys()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
