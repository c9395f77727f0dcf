//! Per-signal and aggregate outcome records.
//!
//! Every registered signal produces exactly one [`SignalReport`] with a
//! terminal [`SignalOutcome`]; the run as a whole produces one immutable
//! [`StartupReport`] that is cached and returned verbatim thereafter.

use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationReason;
use crate::coordinator::CoordinatorState;

/// Captured failure of a signal, shareable across report clones.
pub type SignalFailure = Arc<dyn std::error::Error + Send + Sync>;

/// Terminal status of a signal. Absorbing: assigned exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "timeline-export",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum SignalStatus {
    /// The wait operation completed normally.
    Succeeded,
    /// The wait operation produced a domain failure.
    Failed,
    /// A per-signal or hard global deadline expired.
    TimedOut,
    /// Never dispatched: a prerequisite failed, a policy halted dispatch,
    /// or the hard global deadline fired first.
    Skipped,
    /// The owning scope was cancelled.
    Cancelled,
}

impl SignalStatus {
    /// Stable lower-case label, used by metrics and export.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminated terminal outcome of a signal.
#[derive(Clone)]
pub enum SignalOutcome {
    /// Completed normally.
    Succeeded,
    /// Domain failure, captured verbatim.
    Failed(SignalFailure),
    /// Deadline expired; the failure is synthesized.
    TimedOut {
        /// The deadline that expired, when it was a per-signal one.
        timeout: Option<Duration>,
    },
    /// The owning scope was cancelled.
    Cancelled {
        /// Why the scope was cancelled.
        reason: CancellationReason,
        /// Name of the signal that triggered the cancellation, if any.
        trigger: Option<String>,
    },
    /// Never dispatched.
    Skipped {
        /// Direct prerequisites with a non-success status. Empty when the
        /// skip came from a policy halt or the hard global deadline.
        failed_prerequisites: Vec<String>,
    },
}

impl SignalOutcome {
    /// The terminal status this outcome maps to.
    #[must_use]
    pub fn status(&self) -> SignalStatus {
        match self {
            Self::Succeeded => SignalStatus::Succeeded,
            Self::Failed(_) => SignalStatus::Failed,
            Self::TimedOut { .. } => SignalStatus::TimedOut,
            Self::Cancelled { .. } => SignalStatus::Cancelled,
            Self::Skipped { .. } => SignalStatus::Skipped,
        }
    }

    /// `true` only for [`SignalOutcome::Succeeded`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Debug for SignalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed(err) => f.debug_tuple("Failed").field(&err.to_string()).finish(),
            Self::TimedOut { timeout } => {
                f.debug_struct("TimedOut").field("timeout", timeout).finish()
            }
            Self::Cancelled { reason, trigger } => f
                .debug_struct("Cancelled")
                .field("reason", reason)
                .field("trigger", trigger)
                .finish(),
            Self::Skipped {
                failed_prerequisites,
            } => f
                .debug_struct("Skipped")
                .field("failed_prerequisites", failed_prerequisites)
                .finish(),
        }
    }
}

/// One signal's terminal record.
#[derive(Debug, Clone)]
pub struct SignalReport {
    /// The signal's name.
    pub name: String,
    /// The terminal outcome.
    pub outcome: SignalOutcome,
    /// Offset from run start at which the envelope began, or `None` when
    /// the wait operation never ran.
    pub started_at: Option<Duration>,
    /// Wall-clock time from envelope start to terminal classification.
    pub duration: Duration,
    /// The effective timeout the strategy applied, if any.
    pub effective_timeout: Option<Duration>,
}

impl SignalReport {
    /// The terminal status.
    #[must_use]
    pub fn status(&self) -> SignalStatus {
        self.outcome.status()
    }

    /// `true` if the signal succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The captured domain failure, for failed signals.
    #[must_use]
    pub fn failure(&self) -> Option<&SignalFailure> {
        match &self.outcome {
            SignalOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Direct failed prerequisites, for skipped signals.
    #[must_use]
    pub fn failed_prerequisites(&self) -> &[String] {
        match &self.outcome {
            SignalOutcome::Skipped {
                failed_prerequisites,
            } => failed_prerequisites,
            _ => &[],
        }
    }

    /// The cancellation cause, for cancelled signals.
    #[must_use]
    pub fn cancellation(&self) -> Option<(CancellationReason, Option<&str>)> {
        match &self.outcome {
            SignalOutcome::Cancelled { reason, trigger } => {
                Some((*reason, trigger.as_deref()))
            }
            _ => None,
        }
    }
}

/// Per-status counters for a stage or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "timeline-export",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct StatusCounts {
    /// Signals that succeeded.
    pub succeeded: usize,
    /// Signals that failed.
    pub failed: usize,
    /// Signals that timed out.
    pub timed_out: usize,
    /// Signals that were skipped.
    pub skipped: usize,
    /// Signals that were cancelled.
    pub cancelled: usize,
}

impl StatusCounts {
    /// Total number of signals counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.skipped + self.cancelled
    }

    pub(crate) fn record(&mut self, status: SignalStatus) {
        match status {
            SignalStatus::Succeeded => self.succeeded += 1,
            SignalStatus::Failed => self.failed += 1,
            SignalStatus::TimedOut => self.timed_out += 1,
            SignalStatus::Skipped => self.skipped += 1,
            SignalStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub(crate) fn tally<'a>(reports: impl IntoIterator<Item = &'a SignalReport>) -> Self {
        let mut counts = Self::default();
        for report in reports {
            counts.record(report.status());
        }
        counts
    }
}

/// One stage's record (staged mode only).
#[derive(Debug, Clone)]
pub struct StageReport {
    /// The stage index.
    pub stage: usize,
    /// Offset from run start at which the stage began dispatching.
    pub started_at: Duration,
    /// Offset from run start at which every signal of the stage settled.
    pub ended_at: Duration,
    /// Per-status counts for the stage's signals.
    pub counts: StatusCounts,
    /// `true` when the run stopped progressing at this stage.
    pub terminal: bool,
}

/// The aggregate outcome of a startup run.
///
/// Constructed exactly once when the coordinator reaches a terminal state;
/// immutable and returned verbatim on every subsequent query.
#[derive(Debug)]
pub struct StartupReport {
    /// One report per registered signal, in registration order.
    pub signals: Vec<SignalReport>,
    /// Per-stage records, present in staged mode.
    pub stages: Option<Vec<StageReport>>,
    /// Wall-clock duration of the whole run.
    pub total_duration: Duration,
    /// `true` when the global deadline expired before the run settled.
    pub global_timeout_observed: bool,
    /// The coordinator's terminal state.
    pub state: CoordinatorState,
}

impl StartupReport {
    /// `true` when the global deadline was observed or any signal timed out.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.global_timeout_observed
            || self
                .signals
                .iter()
                .any(|signal| signal.status() == SignalStatus::TimedOut)
    }

    /// `true` when every registered signal succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.signals.iter().all(SignalReport::is_success)
    }

    /// Per-status counts across all signals.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.signals)
    }

    /// Looks up a signal report by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SignalReport> {
        self.signals.iter().find(|signal| signal.name == name)
    }

    /// Every signal that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &SignalReport> {
        self.signals.iter().filter(|signal| !signal.is_success())
    }
}
