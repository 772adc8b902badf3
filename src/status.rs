//! Run status tracking.
//!
//! The tracker records what a run is doing, step by step, and fans the
//! records out to pluggable sinks. The dispatcher consults the last recorded
//! label when a run fails, so errors can name the step that broke.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Strategy;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The run is executing.
    Running,
    /// The run converged and persisted.
    Succeeded,
    /// The run failed and its mutations were fully undone.
    RolledBack,
    /// The run failed and compensation could not undo everything.
    PartiallyRolledBack,
    /// The run failed before any mutation was made.
    Failed,
}

/// One recorded step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// What the step did, e.g. `"share/sales"`.
    pub label: String,
    /// Step detail, e.g. `"updated: added 2 asset(s)"`.
    pub detail: String,
    /// When the step was recorded.
    pub at: DateTime<Utc>,
}

/// The full status of one run.
#[derive(Debug, Clone)]
pub struct RunStatus {
    /// Run identifier.
    pub run_id: Uuid,
    /// Pack being provisioned.
    pub pack_name: String,
    /// Strategy the run executes.
    pub strategy: Strategy,
    /// Current lifecycle state.
    pub state: RunState,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Steps recorded so far, oldest first.
    pub steps: Vec<StepRecord>,
    /// Warnings recorded so far.
    pub warnings: Vec<String>,
    /// The error that ended the run, for failed terminal states.
    pub error: Option<String>,
    /// Label of the step that was executing when the run failed.
    pub failed_step: Option<String>,
}

/// Receiver for run status updates.
pub trait StatusSink: Send + Sync {
    /// Called after a step is recorded.
    fn on_step(&self, status: &RunStatus, step: &StepRecord);
    /// Called when the run reaches a terminal state.
    fn on_finished(&self, status: &RunStatus);
}

/// Records run progress and notifies sinks.
pub struct StatusTracker {
    status: RunStatus,
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl StatusTracker {
    /// Starts tracking a run.
    #[must_use]
    pub fn new(run_id: Uuid, pack_name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            status: RunStatus {
                run_id,
                pack_name: pack_name.into(),
                strategy,
                state: RunState::Running,
                started_at: Utc::now(),
                finished_at: None,
                steps: Vec::new(),
                warnings: Vec::new(),
                error: None,
                failed_step: None,
            },
            sinks: Vec::new(),
        }
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Records one step.
    pub fn record(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        let step = StepRecord {
            label: label.into(),
            detail: detail.into(),
            at: Utc::now(),
        };
        for sink in &self.sinks {
            sink.on_step(&self.status, &step);
        }
        self.status.steps.push(step);
    }

    /// Records a warning.
    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.status.warnings.push(message.into());
    }

    /// The label of the most recent step, if any.
    #[must_use]
    pub fn last_label(&self) -> Option<&str> {
        self.status.steps.last().map(|s| s.label.as_str())
    }

    /// Moves the run to a terminal state and notifies sinks.
    pub fn finish(&mut self, state: RunState) {
        self.status.state = state;
        self.status.finished_at = Some(Utc::now());
        for sink in &self.sinks {
            sink.on_finished(&self.status);
        }
    }

    /// Moves the run to a failed terminal state, recording the triggering
    /// error and the step that was executing, then notifies sinks.
    pub fn fail(&mut self, state: RunState, message: impl Into<String>) {
        self.status.error = Some(message.into());
        self.status.failed_step = self.status.steps.last().map(|s| s.label.clone());
        self.finish(state);
    }

    /// The current status.
    #[must_use]
    pub const fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Consumes the tracker, returning the final status.
    #[must_use]
    pub fn into_status(self) -> RunStatus {
        self.status
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("status", &self.status)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Sink that logs steps through `tracing`.
#[derive(Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn on_step(&self, status: &RunStatus, step: &StepRecord) {
        info!(
            "[{} {}] {}: {}",
            status.pack_name, status.strategy, step.label, step.detail
        );
    }

    fn on_finished(&self, status: &RunStatus) {
        match status.state {
            RunState::Succeeded => info!(
                "[{} {}] run {} finished: {} step(s)",
                status.pack_name,
                status.strategy,
                status.run_id,
                status.steps.len()
            ),
            state => match &status.error {
                Some(error) => warn!(
                    "[{} {}] run {} ended in {state:?}: {error}",
                    status.pack_name, status.strategy, status.run_id
                ),
                None => warn!(
                    "[{} {}] run {} ended in {state:?}",
                    status.pack_name, status.strategy, status.run_id
                ),
            },
        }
    }
}

/// Sink that keeps every update in memory, for tests and reporting.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    steps: Mutex<Vec<StepRecord>>,
    finished: Mutex<Option<RunStatus>>,
}

impl MemoryStatusSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The steps seen so far.
    #[must_use]
    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The final status, once the run finished.
    #[must_use]
    pub fn finished(&self) -> Option<RunStatus> {
        self.finished.lock().ok().and_then(|f| f.clone())
    }
}

impl StatusSink for MemoryStatusSink {
    fn on_step(&self, _status: &RunStatus, step: &StepRecord) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(step.clone());
        }
    }

    fn on_finished(&self, status: &RunStatus) {
        if let Ok(mut finished) = self.finished.lock() {
            *finished = Some(status.clone());
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::RolledBack => "rolled back",
            Self::PartiallyRolledBack => "partially rolled back",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_records_steps_and_last_label() {
        let sink = Arc::new(MemoryStatusSink::new());
        let mut tracker = StatusTracker::new(Uuid::new_v4(), "pack", Strategy::Update)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);

        assert!(tracker.last_label().is_none());
        tracker.record("recipient/acme", "created");
        tracker.record("share/sales", "updated: added 1 asset(s)");

        assert_eq!(tracker.last_label(), Some("share/sales"));
        assert_eq!(sink.steps().len(), 2);
        assert!(sink.finished().is_none());
    }

    #[test]
    fn test_tracker_finish_notifies_sinks() {
        let sink = Arc::new(MemoryStatusSink::new());
        let mut tracker = StatusTracker::new(Uuid::new_v4(), "pack", Strategy::Delete)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);

        tracker.record("share/sales", "torn down");
        tracker.finish(RunState::Succeeded);

        let finished = sink.finished().expect("finished status");
        assert_eq!(finished.state, RunState::Succeeded);
        assert_eq!(finished.steps.len(), 1);
        assert!(finished.finished_at.is_some());
        assert!(finished.error.is_none());
    }

    #[test]
    fn test_tracker_fail_carries_error_and_step() {
        let sink = Arc::new(MemoryStatusSink::new());
        let mut tracker = StatusTracker::new(Uuid::new_v4(), "pack", Strategy::Update)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);

        tracker.record("recipient/acme", "created");
        tracker.record("share/sales", "updated: added 1 asset(s)");
        tracker.fail(RunState::RolledBack, "pipeline backend down");

        let finished = sink.finished().expect("finished status");
        assert_eq!(finished.state, RunState::RolledBack);
        assert_eq!(finished.error.as_deref(), Some("pipeline backend down"));
        assert_eq!(finished.failed_step.as_deref(), Some("share/sales"));
    }
}
