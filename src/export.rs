//! Timeline export: a versioned JSON rendering of the cached report.
//!
//! Intended for deployment dashboards and post-startup forensics: the
//! timeline carries per-signal offsets and durations so consumers can
//! render a waterfall of the startup run. The schema is versioned; bump
//! [`TIMELINE_SCHEMA_VERSION`] on any breaking field change.

use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationReason;
use crate::coordinator::CoordinatorState;
use crate::health::HealthStatus;
use crate::outcome::{SignalOutcome, SignalStatus, StartupReport, StatusCounts};

/// Version tag stamped into every exported timeline.
pub const TIMELINE_SCHEMA_VERSION: &str = "1.0";

/// One signal's entry in the exported timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSignal {
    /// The signal's name.
    pub name: String,
    /// The terminal status.
    pub status: SignalStatus,
    /// Offset from run start in milliseconds, absent when never dispatched.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at_ms: Option<u64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Effective timeout in milliseconds, when one applied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_ms: Option<u64>,
    /// Rendered failure message, for failed signals.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure: Option<String>,
    /// Direct failed prerequisites, for skipped signals.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed_prerequisites: Vec<String>,
    /// Cancellation reason, for cancelled signals.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cancellation_reason: Option<CancellationReason>,
    /// Signal that triggered the cancellation, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cancellation_trigger: Option<String>,
}

/// One stage's entry in the exported timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStage {
    /// The stage index.
    pub stage: usize,
    /// Offset from run start at which the stage began, in milliseconds.
    pub started_at_ms: u64,
    /// Offset from run start at which the stage settled, in milliseconds.
    pub ended_at_ms: u64,
    /// Per-status counts for the stage.
    pub counts: StatusCounts,
    /// `true` when the run stopped progressing at this stage.
    pub terminal: bool,
}

/// The exported document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    /// Schema version, always [`TIMELINE_SCHEMA_VERSION`] on export.
    pub version: String,
    /// The coordinator's terminal state.
    pub state: CoordinatorState,
    /// The ternary health mapping of the report.
    pub health: HealthStatus,
    /// Total run duration in milliseconds.
    pub total_duration_ms: u64,
    /// Whether the global deadline expired before the run settled.
    pub global_timeout_observed: bool,
    /// Per-signal entries in registration order.
    pub signals: Vec<TimelineSignal>,
    /// Per-stage entries (staged mode).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stages: Option<Vec<TimelineStage>>,
}

impl Timeline {
    /// Renders the cached aggregate as an exportable timeline.
    #[must_use]
    pub fn from_report(report: &StartupReport) -> Self {
        let signals = report
            .signals
            .iter()
            .map(|signal| {
                let mut entry = TimelineSignal {
                    name: signal.name.clone(),
                    status: signal.status(),
                    started_at_ms: signal.started_at.map(|at| at.as_millis() as u64),
                    duration_ms: signal.duration.as_millis() as u64,
                    timeout_ms: signal.effective_timeout.map(|t| t.as_millis() as u64),
                    failure: None,
                    failed_prerequisites: Vec::new(),
                    cancellation_reason: None,
                    cancellation_trigger: None,
                };
                match &signal.outcome {
                    SignalOutcome::Failed(error) => entry.failure = Some(error.to_string()),
                    SignalOutcome::Skipped {
                        failed_prerequisites,
                    } => entry.failed_prerequisites = failed_prerequisites.clone(),
                    SignalOutcome::Cancelled { reason, trigger } => {
                        entry.cancellation_reason = Some(*reason);
                        entry.cancellation_trigger = trigger.clone();
                    }
                    SignalOutcome::Succeeded | SignalOutcome::TimedOut { .. } => {}
                }
                entry
            })
            .collect();

        let stages = report.stages.as_ref().map(|stages| {
            stages
                .iter()
                .map(|stage| TimelineStage {
                    stage: stage.stage,
                    started_at_ms: stage.started_at.as_millis() as u64,
                    ended_at_ms: stage.ended_at.as_millis() as u64,
                    counts: stage.counts,
                    terminal: stage.terminal,
                })
                .collect()
        });

        Self {
            version: TIMELINE_SCHEMA_VERSION.to_string(),
            state: report.state,
            health: report.health(),
            total_duration_ms: report.total_duration.as_millis() as u64,
            global_timeout_observed: report.global_timeout_observed,
            signals,
            stages,
        }
    }

    /// Serializes the timeline as a JSON string.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
