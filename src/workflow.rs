use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{StepError, WorkflowError};
use crate::registry::StepRegistry;
use crate::retry::{Backoff, RetryPolicy, VisitCounts};
use crate::state::{Outcome, State};
use crate::step::{CrashPolicy, StateConfig, Step};
use crate::trace::{ExecutionTrace, OutcomeSource, StatusSink};
use crate::transition::TransitionTable;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// A terminal state was reached.
    Completed,
    /// The run stopped on a fatal error.
    Failed(WorkflowError),
    /// External cancellation fired while the run was suspended.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed(e) => write!(f, "failed: {}", e),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunResult {
    pub status: RunStatus,
    pub trace: ExecutionTrace,
    /// The context as the last step left it.
    pub context: Context,
    /// The state the run stopped in.
    pub final_state: State,
    /// Visit counters at the end of the run.
    pub visits: VisitCounts,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled)
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        match &self.status {
            RunStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Converts to a plain `Result`, mapping cancellation to
    /// [`WorkflowError::Cancelled`].
    pub fn into_result(self) -> Result<Context, WorkflowError> {
        match self.status {
            RunStatus::Completed => Ok(self.context),
            RunStatus::Failed(e) => Err(e),
            RunStatus::Cancelled => Err(WorkflowError::Cancelled {
                state: self.final_state,
            }),
        }
    }
}

/// Runs a workflow with the default [`RetryPolicy`] and engine settings.
///
/// ```
/// use tsunagi::prelude::*;
/// use async_trait::async_trait;
///
/// define_step!(AlwaysOk);
///
/// #[async_trait]
/// impl Step for AlwaysOk {
///     async fn execute(&self, _ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
///         Ok(Some(Outcome::new("ok")))
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let table = TransitionTable::new()
///     .on("S0", "ok", "S1")
///     .on("S1", "ok", "TERMINAL");
///
/// let mut registry = StepRegistry::new();
/// registry.register("S0", AlwaysOk);
/// registry.register("S1", AlwaysOk);
///
/// let result = tsunagi::run("S0", Context::new(), ["TERMINAL"], table, registry).await;
/// assert!(result.is_completed());
/// assert_eq!(result.trace.len(), 2);
/// # }
/// ```
pub async fn run<I, S>(
    initial: impl Into<State>,
    ctx: Context,
    terminals: I,
    table: TransitionTable,
    registry: StepRegistry,
) -> RunResult
where
    I: IntoIterator<Item = S>,
    S: Into<State>,
{
    Workflow::new(registry, table, RetryPolicy::default())
        .run(initial, ctx, terminals)
        .await
}

/// The execution loop: a step registry, a transition table and a retry
/// policy, driven one step at a time.
///
/// A `Workflow` holds no per-run state, so one instance can serve any
/// number of runs, concurrently or one after another.
pub struct Workflow {
    registry: StepRegistry,
    table: TransitionTable,
    retry: RetryPolicy,
    engine: EngineConfig,
    sinks: Vec<Arc<dyn StatusSink>>,
    title: String,
    description: Option<String>,
    ordinals: HashMap<State, f64>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("title", &self.title)
            .field("states", &self.registry.states().collect::<Vec<_>>())
            .field("transitions", &self.table.len())
            .field("engine", &self.engine)
            .finish()
    }
}

enum Invocation {
    Resolved {
        outcome: Option<Outcome>,
        source: OutcomeSource,
        error: Option<String>,
        duration: Duration,
    },
    Cancelled,
}

impl Workflow {
    pub fn new(registry: StepRegistry, table: TransitionTable, retry: RetryPolicy) -> Self {
        Self {
            registry,
            table,
            retry,
            engine: EngineConfig::default(),
            sinks: Vec::new(),
            title: "workflow".to_string(),
            description: None,
            ordinals: HashMap::new(),
        }
    }

    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Display ordinal of `state`, shown alongside its step in logs.
    pub fn ordinal(&self, state: &State) -> Option<f64> {
        self.ordinals.get(state).copied()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.table
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Attaches a progress sink, e.g. to a workflow loaded from a definition.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Checks that every state reachable through the table has a step.
    ///
    /// Terminal states may go without one. Running this before a run turns
    /// a mid-run [`WorkflowError::UnknownState`] into an upfront failure.
    pub fn validate<I, S>(&self, terminals: I) -> Result<(), WorkflowError>
    where
        I: IntoIterator<Item = S>,
        S: Into<State>,
    {
        let terminals: HashSet<State> = terminals.into_iter().map(Into::into).collect();
        let mut referenced: Vec<&State> = self.table.states().chain(self.table.targets()).collect();
        referenced.sort();
        referenced.dedup();

        match referenced
            .into_iter()
            .find(|s| !self.registry.contains(s) && !terminals.contains(*s))
        {
            Some(missing) => Err(WorkflowError::UnknownState(missing.clone())),
            None => Ok(()),
        }
    }

    /// Runs from `initial` until a terminal state is reached or the run fails.
    pub async fn run<I, S>(
        &self,
        initial: impl Into<State>,
        ctx: Context,
        terminals: I,
    ) -> RunResult
    where
        I: IntoIterator<Item = S>,
        S: Into<State>,
    {
        self.run_with_cancel(initial, ctx, terminals, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but stops with [`RunStatus::Cancelled`] as
    /// soon as `cancel` fires, whatever the current step is waiting on.
    pub async fn run_with_cancel<I, S>(
        &self,
        initial: impl Into<State>,
        mut ctx: Context,
        terminals: I,
        cancel: CancellationToken,
    ) -> RunResult
    where
        I: IntoIterator<Item = S>,
        S: Into<State>,
    {
        let terminals: HashSet<State> = terminals.into_iter().map(Into::into).collect();
        let mut current = initial.into();
        let mut trace = ExecutionTrace::new();
        let mut visits = VisitCounts::new();

        info!(
            title = %self.title,
            description = self.description.as_deref(),
            initial = %current,
            "Starting workflow"
        );

        let status = self
            .drive(&mut current, &mut ctx, &terminals, &mut trace, &mut visits, &cancel)
            .await;

        match &status {
            RunStatus::Completed => {
                info!(state = %current, steps = trace.len(), "Workflow completed")
            }
            RunStatus::Failed(e) => warn!(state = %current, error = %e, "Workflow failed"),
            RunStatus::Cancelled => warn!(state = %current, "Workflow cancelled"),
        }
        for sink in &self.sinks {
            sink.on_finish(&status);
        }

        RunResult {
            status,
            trace,
            context: ctx,
            final_state: current,
            visits,
        }
    }

    async fn drive(
        &self,
        current: &mut State,
        ctx: &mut Context,
        terminals: &HashSet<State>,
        trace: &mut ExecutionTrace,
        visits: &mut VisitCounts,
        cancel: &CancellationToken,
    ) -> RunStatus {
        if let Err(e) = self.admit(current, visits) {
            return RunStatus::Failed(e);
        }

        loop {
            let is_terminal = terminals.contains(&*current);
            if is_terminal && !self.registry.contains(current) {
                return RunStatus::Completed;
            }

            let step = match self.registry.lookup(current) {
                Ok(step) => Arc::clone(step),
                Err(e) => return RunStatus::Failed(e),
            };

            if let Some(limit) = self.engine.max_steps {
                if trace.len() >= limit as usize {
                    return RunStatus::Failed(WorkflowError::StepLimitReached { limit });
                }
            }

            let config = self.registry.config(current).cloned().unwrap_or_default();
            let (outcome, source, error, duration) =
                match self.invoke(step.as_ref(), current, &config, ctx, cancel).await {
                    Invocation::Resolved {
                        outcome,
                        source,
                        error,
                        duration,
                    } => (outcome, source, error, duration),
                    Invocation::Cancelled => return RunStatus::Cancelled,
                };

            let entry = trace.record(current.clone(), outcome.clone(), source, error, duration);
            for sink in &self.sinks {
                sink.on_entry(entry);
            }

            if source == OutcomeSource::Crashed && config.on_crash == CrashPolicy::Fail {
                return RunStatus::Failed(WorkflowError::StepExecution {
                    state: current.clone(),
                    details: entry.error.clone().unwrap_or_default(),
                });
            }

            if is_terminal {
                return RunStatus::Completed;
            }

            let Some(outcome) = outcome else {
                return RunStatus::Failed(WorkflowError::MissingOutcome(current.clone()));
            };

            let next = match self.table.next(current, &outcome) {
                Some(next) => next.clone(),
                None => {
                    return RunStatus::Failed(WorkflowError::UnmappedTransition {
                        state: current.clone(),
                        outcome,
                    })
                }
            };
            debug!(from = %current, outcome = %outcome, to = %next, "Transition");

            let visit = match self.admit(&next, visits) {
                Ok(visit) => visit,
                Err(e) => return RunStatus::Failed(e),
            };
            *current = next;

            let delay = self.engine.step_delay
                + self
                    .retry
                    .delay_before_visit(current, visit)
                    .unwrap_or_default();
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return RunStatus::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Counts a visit to `state` and checks it against the retry policy.
    fn admit(&self, state: &State, visits: &mut VisitCounts) -> Result<u32, WorkflowError> {
        let visit = visits.get(state) + 1;
        if self.retry.should_continue(state, visit) {
            visits.record(state);
            if visit > 1 {
                debug!(state = %state, visit, "Re-entering state");
            }
            return Ok(visit);
        }
        Err(WorkflowError::Exhausted {
            state: state.clone(),
            visits: visit - 1,
            max_visits: self.retry.max_visits(state).unwrap_or_default(),
        })
    }

    async fn invoke(
        &self,
        step: &dyn Step,
        state: &State,
        config: &StateConfig,
        ctx: &mut Context,
        cancel: &CancellationToken,
    ) -> Invocation {
        let started = Instant::now();
        let timeout = config.timeout.or(self.engine.default_timeout);
        let execution = AssertUnwindSafe(step.execute(ctx)).catch_unwind();
        let guarded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, execution).await.ok(),
                None => Some(execution.await),
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(state = %state, step = %step.name(), "Cancelled while step was running");
                return Invocation::Cancelled;
            }
            result = guarded => result,
        };
        let duration = started.elapsed();

        let (outcome, source, error) = match result {
            Some(Ok(Ok(outcome))) => (outcome, OutcomeSource::Step, None),
            Some(Ok(Err(e))) => {
                warn!(state = %state, step = %step.name(), error = %e, "Step failed");
                (Some(Outcome::crashed(state)), OutcomeSource::Crashed, Some(e.to_string()))
            }
            Some(Err(panic)) => {
                let error = StepError::Panicked(panic_message(panic.as_ref()));
                warn!(state = %state, step = %step.name(), error = %error, "Step panicked");
                (Some(Outcome::crashed(state)), OutcomeSource::Crashed, Some(error.to_string()))
            }
            None => {
                warn!(state = %state, step = %step.name(), ?timeout, "Step timed out");
                (Some(config.outcome_on_timeout(state)), OutcomeSource::TimedOut, None)
            }
        };

        info!(
            state = %state,
            ordinal = self.ordinal(state),
            outcome = outcome.as_ref().map(Outcome::as_str).unwrap_or("-"),
            elapsed_ms = duration.as_millis() as u64,
            "Step '{}' resolved",
            step.name()
        );

        Invocation::Resolved {
            outcome,
            source,
            error,
            duration,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Assembles a [`Workflow`].
///
/// ```
/// use tsunagi::prelude::*;
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// define_step!(WaitForLoad);
/// define_step!(RefreshPage);
///
/// #[async_trait]
/// impl Step for WaitForLoad {
///     async fn execute(&self, _ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
///         Ok(Some("page_loaded".into()))
///     }
/// }
///
/// #[async_trait]
/// impl Step for RefreshPage {
///     async fn execute(&self, _ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
///         Ok(Some("page_refreshed".into()))
///     }
/// }
///
/// let workflow = Workflow::builder()
///     .title("Seek")
///     .step("wait_for_load", WaitForLoad)
///     .step("refresh_page", RefreshPage)
///     .transition("wait_for_load", "page_loaded", "done")
///     .transition("wait_for_load", "page_load_retry", "refresh_page")
///     .transition("refresh_page", "page_refreshed", "wait_for_load")
///     .otherwise("wait_for_load", "refresh_page")
///     .timeout("wait_for_load", Duration::from_secs(20))
///     .max_visits("refresh_page", 3)
///     .build()
///     .expect("valid workflow");
///
/// assert!(workflow.validate(["done"]).is_ok());
/// ```
pub struct WorkflowBuilder {
    registry: StepRegistry,
    table: TransitionTable,
    retry: RetryPolicy,
    engine: EngineConfig,
    sinks: Vec<Arc<dyn StatusSink>>,
    title: Option<String>,
    description: Option<String>,
    ordinals: HashMap<State, f64>,
    overrides: HashMap<State, Vec<ConfigOverride>>,
}

enum ConfigOverride {
    Timeout(Duration),
    TimeoutOutcome(Outcome),
    Crash(CrashPolicy),
    Replace(StateConfig),
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            registry: StepRegistry::new(),
            table: TransitionTable::new(),
            retry: RetryPolicy::default(),
            engine: EngineConfig::default(),
            sinks: Vec::new(),
            title: None,
            description: None,
            ordinals: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the display ordinal of `state`, e.g. `1.5` for a step inserted
    /// between steps 1 and 2.
    pub fn ordinal(mut self, state: impl Into<State>, ordinal: f64) -> Self {
        self.ordinals.insert(state.into(), ordinal);
        self
    }

    /// Binds `step` to `state`.
    pub fn step<S: Step + 'static>(mut self, state: impl Into<State>, step: S) -> Self {
        self.registry.register(state, step);
        self
    }

    /// Binds a shared step to `state`.
    pub fn shared_step(mut self, state: impl Into<State>, step: Arc<dyn Step>) -> Self {
        self.registry.register_shared(state, step);
        self
    }

    pub fn transition(
        mut self,
        from: impl Into<State>,
        outcome: impl Into<Outcome>,
        to: impl Into<State>,
    ) -> Self {
        self.table.insert(from, outcome, to);
        self
    }

    /// Routes every unmapped outcome of `from` to `to`.
    pub fn otherwise(self, from: impl Into<State>, to: impl Into<State>) -> Self {
        self.transition(from, Outcome::WILDCARD, to)
    }

    /// Replaces the whole transition table.
    pub fn transitions(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    /// Replaces the retry policy, including per-state bounds set so far.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_visits(mut self, state: impl Into<State>, max_visits: u32) -> Self {
        self.retry.set_max_visits(state, max_visits);
        self
    }

    pub fn backoff(mut self, state: impl Into<State>, backoff: Backoff) -> Self {
        self.retry.set_backoff(state, backoff);
        self
    }

    pub fn timeout(self, state: impl Into<State>, timeout: Duration) -> Self {
        self.with_override(state, ConfigOverride::Timeout(timeout))
    }

    pub fn timeout_outcome(self, state: impl Into<State>, outcome: impl Into<Outcome>) -> Self {
        self.with_override(state, ConfigOverride::TimeoutOutcome(outcome.into()))
    }

    pub fn crash_policy(self, state: impl Into<State>, policy: CrashPolicy) -> Self {
        self.with_override(state, ConfigOverride::Crash(policy))
    }

    /// Replaces the step's default config for `state`.
    pub fn state_config(self, state: impl Into<State>, config: StateConfig) -> Self {
        self.with_override(state, ConfigOverride::Replace(config))
    }

    pub fn engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn max_steps(mut self, limit: u32) -> Self {
        self.engine.max_steps = Some(limit);
        self
    }

    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.engine.step_delay = delay;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.engine.default_timeout = Some(timeout);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn with_override(mut self, state: impl Into<State>, edit: ConfigOverride) -> Self {
        self.overrides.entry(state.into()).or_default().push(edit);
        self
    }

    pub fn build(mut self) -> Result<Workflow, WorkflowError> {
        if self.registry.is_empty() {
            return Err(WorkflowError::Configuration(
                "At least one step must be registered".to_string(),
            ));
        }

        self.retry
            .validate()
            .map_err(|e| WorkflowError::Configuration(e.to_string()))?;

        for (state, edits) in self.overrides {
            let mut config = self.registry.config(&state).cloned().ok_or_else(|| {
                WorkflowError::Configuration(format!(
                    "Settings given for state '{}' which has no step",
                    state
                ))
            })?;
            for edit in edits {
                match edit {
                    ConfigOverride::Timeout(t) => config.timeout = Some(t),
                    ConfigOverride::TimeoutOutcome(o) => config.timeout_outcome = Some(o),
                    ConfigOverride::Crash(p) => config.on_crash = p,
                    ConfigOverride::Replace(c) => config = c,
                }
            }
            self.registry.configure(&state, config);
        }

        Ok(Workflow {
            registry: self.registry,
            table: self.table,
            retry: self.retry,
            engine: self.engine,
            sinks: self.sinks,
            title: self.title.unwrap_or_else(|| "workflow".to_string()),
            description: self.description,
            ordinals: self.ordinals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_step;
    use async_trait::async_trait;

    define_step!(LoggedIn);

    #[async_trait]
    impl Step for LoggedIn {
        async fn execute(&self, ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
            ctx.insert("logged_in", true);
            Ok(Some(Outcome::new("logged_in")))
        }
    }

    define_step!(Finish);

    #[async_trait]
    impl Step for Finish {
        async fn execute(&self, _ctx: &mut Context) -> Result<Option<Outcome>, StepError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_terminal_step_runs_once() {
        let workflow = Workflow::builder()
            .step("detect_login", LoggedIn)
            .step("finish_run", Finish)
            .transition("detect_login", "logged_in", "finish_run")
            .build()
            .unwrap();

        let result = workflow
            .run("detect_login", Context::new(), ["finish_run"])
            .await;
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.trace.len(), 2);
        assert_eq!(result.trace.last().and_then(|e| e.outcome.clone()), None);
        assert_eq!(result.final_state, "finish_run");
        assert_eq!(result.context.get::<bool>("logged_in"), Some(&true));
    }

    #[tokio::test]
    async fn test_terminal_stop_point_chosen_at_call_time() {
        let workflow = Workflow::builder()
            .step("detect_login", LoggedIn)
            .step("finish_run", Finish)
            .transition("detect_login", "logged_in", "finish_run")
            .build()
            .unwrap();

        let result = workflow
            .run("detect_login", Context::new(), ["detect_login"])
            .await;
        assert!(result.is_completed());
        assert_eq!(result.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_outcome_in_non_terminal_state() {
        let workflow = Workflow::builder()
            .step("finish_run", Finish)
            .build()
            .unwrap();

        let result = workflow
            .run("finish_run", Context::new(), Vec::<State>::new())
            .await;
        assert_eq!(
            result.error(),
            Some(&WorkflowError::MissingOutcome(State::new("finish_run")))
        );
    }

    #[tokio::test]
    async fn test_unknown_initial_state() {
        let workflow = Workflow::builder().step("a", LoggedIn).build().unwrap();
        let result = workflow.run("ghost", Context::new(), ["done"]).await;
        assert_eq!(
            result.error(),
            Some(&WorkflowError::UnknownState(State::new("ghost")))
        );
        assert!(result.trace.is_empty());
    }

    #[test]
    fn test_builder_validation() {
        let result = Workflow::builder().build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));

        let result = Workflow::builder()
            .step("a", LoggedIn)
            .timeout("b", Duration::from_secs(1))
            .build();
        match result {
            Err(WorkflowError::Configuration(msg)) => {
                assert_eq!(msg, "Settings given for state 'b' which has no step")
            }
            other => panic!("unexpected: {:?}", other),
        }

        let result = Workflow::builder()
            .step("a", LoggedIn)
            .backoff(
                "a",
                Backoff::Exponential {
                    initial_delay: Duration::from_secs(1),
                    max_delay: Duration::from_secs(1),
                    multiplier: 0,
                },
            )
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let workflow = Workflow::builder()
            .step("a", LoggedIn)
            .timeout("a", Duration::from_secs(5))
            .crash_policy("a", CrashPolicy::Fail)
            .build()
            .unwrap();
        let config = workflow.registry().config(&State::new("a")).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.on_crash, CrashPolicy::Fail);
    }

    #[test]
    fn test_validate_reports_unregistered_target() {
        let workflow = Workflow::builder()
            .step("a", LoggedIn)
            .transition("a", "logged_in", "b")
            .build()
            .unwrap();
        assert_eq!(
            workflow.validate(["done"]),
            Err(WorkflowError::UnknownState(State::new("b")))
        );
        assert!(workflow.validate(["b"]).is_ok());
    }

    #[test]
    fn test_into_result_maps_cancellation() {
        let result = RunResult {
            status: RunStatus::Cancelled,
            trace: ExecutionTrace::new(),
            context: Context::new(),
            final_state: State::new("await_login"),
            visits: VisitCounts::new(),
        };
        assert_eq!(
            result.into_result().unwrap_err(),
            WorkflowError::Cancelled {
                state: State::new("await_login")
            }
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");

        let payload: Box<dyn Any + Send> = Box::new("boom");
        let error = StepError::Panicked(panic_message(payload.as_ref()));
        assert_eq!(error.to_string(), "Step panicked: boom");
    }
}
