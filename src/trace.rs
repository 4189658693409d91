//! Execution trace and progress reporting.

use crate::state::{Outcome, State};
use crate::workflow::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// How a trace entry's outcome came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    /// Produced by the step itself.
    Step,
    /// Synthesized after the step returned an error or panicked.
    Crashed,
    /// Synthesized after the step exceeded its timeout.
    TimedOut,
}

/// One step invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the run, starting at 0.
    pub sequence: usize,
    pub state: State,
    /// `None` only for terminal steps that produced no outcome.
    pub outcome: Option<Outcome>,
    pub source: OutcomeSource,
    /// Error message for crashed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time at which the step resolved.
    pub at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Append-only log of one run's step invocations.
///
/// Entries are ordered by invocation; the trace outlives the run and is
/// returned in the [`RunResult`](crate::RunResult).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry stamped with the current time and returns it.
    pub(crate) fn record(
        &mut self,
        state: State,
        outcome: Option<Outcome>,
        source: OutcomeSource,
        error: Option<String>,
        duration: Duration,
    ) -> &TraceEntry {
        let sequence = self.entries.len();
        self.entries.push(TraceEntry {
            sequence,
            state,
            outcome,
            source,
            error,
            at: Utc::now(),
            duration,
        });
        &self.entries[sequence]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Number of times `state` ran.
    pub fn visits(&self, state: &str) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Outcomes produced in `state`, in order.
    pub fn outcomes_for<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a Outcome> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.state == state)
            .filter_map(|e| e.outcome.as_ref())
    }

    /// The visited states in order.
    pub fn path(&self) -> Vec<&State> {
        self.entries.iter().map(|e| &e.state).collect()
    }
}

impl<'a> IntoIterator for &'a ExecutionTrace {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One-way progress notifications for an external display.
///
/// Sinks observe the run, they never steer it: both methods are
/// synchronous and infallible.
pub trait StatusSink: Send + Sync {
    fn on_entry(&self, entry: &TraceEntry);

    fn on_finish(&self, _status: &RunStatus) {}
}

/// Logs every entry through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_entry(&self, entry: &TraceEntry) {
        info!(
            sequence = entry.sequence,
            state = %entry.state,
            outcome = entry.outcome.as_ref().map(Outcome::as_str).unwrap_or("-"),
            source = ?entry.source,
            "Step {} -> {}",
            entry.state,
            entry.outcome.as_ref().map(Outcome::as_str).unwrap_or("(none)"),
        );
    }

    fn on_finish(&self, status: &RunStatus) {
        info!(status = %status, "Run finished");
    }
}

/// Event forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Entry(TraceEntry),
    Finished(RunStatus),
}

/// Forwards progress to a tokio channel, e.g. for an on-page overlay task.
///
/// A closed receiver is ignored.
///
/// ```
/// use tsunagi::ChannelSink;
///
/// let (sink, mut rx) = ChannelSink::new();
/// drop(sink);
/// assert!(rx.try_recv().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn on_entry(&self, entry: &TraceEntry) {
        let _ = self.tx.send(StatusEvent::Entry(entry.clone()));
    }

    fn on_finish(&self, status: &RunStatus) {
        let _ = self.tx.send(StatusEvent::Finished(status.clone()));
    }
}
