//! Error types for plan construction and the composite startup failure.

use std::fmt;
use std::sync::Arc;

use crate::outcome::{SignalOutcome, SignalReport, StartupReport};

/// Construction-time errors.
///
/// Raised synchronously by [`SignalCollection::build`](crate::SignalCollection::build);
/// none of these can reach a running coordinator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// Two signals registered under the same name.
    #[error("duplicate signal name: {0}")]
    DuplicateName(String),
    /// A signal registered with an empty name.
    #[error("signal names must be non-empty")]
    EmptyName,
    /// A signal declared a zero per-signal timeout.
    #[error("signal {signal} declares a zero timeout")]
    ZeroTimeout {
        /// The offending signal.
        signal: String,
    },
    /// A prerequisite reference does not resolve to a registered signal.
    #[error("signal {signal} depends on unknown signal {prerequisite}")]
    UnknownPrerequisite {
        /// The dependent signal.
        signal: String,
        /// The unresolved prerequisite name.
        prerequisite: String,
    },
    /// The prerequisite relation contains a cycle.
    #[error("prerequisite cycle: {}", .path.join(" -> "))]
    CycleDetected {
        /// A path that revisits its first element.
        path: Vec<String>,
    },
    /// An option value is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

/// Composite failure returned by `wait_all` under the fail-fast policy.
///
/// Exposes every captured non-success; every invocation of `wait_all`
/// observes the same composite, assembled once from the cached report.
#[derive(Debug, Clone)]
pub struct StartupFailed {
    report: Arc<StartupReport>,
}

impl StartupFailed {
    pub(crate) fn new(report: Arc<StartupReport>) -> Self {
        Self { report }
    }

    /// The cached aggregate report behind this failure.
    #[must_use]
    pub fn report(&self) -> &Arc<StartupReport> {
        &self.report
    }

    /// Every signal that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &SignalReport> {
        self.report.failures()
    }
}

impl fmt::Display for StartupFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.report.signals.len();
        let failed = self.report.failures().count();
        write!(f, "startup failed: {failed} of {total} signals did not succeed")?;
        for (index, signal) in self.report.failures().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            f.write_str(separator)?;
            match &signal.outcome {
                SignalOutcome::Failed(err) => write!(f, "{} failed: {err}", signal.name)?,
                SignalOutcome::TimedOut { timeout } => {
                    write!(f, "{} timed out", signal.name)?;
                    if let Some(timeout) = timeout {
                        write!(f, " after {timeout:?}")?;
                    }
                }
                SignalOutcome::Cancelled { reason, trigger } => {
                    write!(f, "{} cancelled: {}", signal.name, reason.description())?;
                    if let Some(trigger) = trigger {
                        write!(f, " (triggered by {trigger})")?;
                    }
                }
                SignalOutcome::Skipped {
                    failed_prerequisites,
                } => {
                    write!(f, "{} skipped", signal.name)?;
                    if !failed_prerequisites.is_empty() {
                        write!(
                            f,
                            " (failed prerequisites: {})",
                            failed_prerequisites.join(", ")
                        )?;
                    }
                }
                SignalOutcome::Succeeded => {}
            }
        }
        Ok(())
    }
}

impl std::error::Error for StartupFailed {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorState;
    use std::time::Duration;

    #[test]
    fn cycle_error_names_the_path() {
        let err = BuildError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "prerequisite cycle: a -> b -> a");
    }

    #[test]
    fn composite_lists_every_non_success() {
        let report = Arc::new(StartupReport {
            signals: vec![
                SignalReport {
                    name: "good".into(),
                    outcome: SignalOutcome::Succeeded,
                    started_at: Some(Duration::ZERO),
                    duration: Duration::from_millis(1),
                    effective_timeout: None,
                },
                SignalReport {
                    name: "broken".into(),
                    outcome: SignalOutcome::Failed(Arc::new(std::io::Error::other("boom"))),
                    started_at: Some(Duration::ZERO),
                    duration: Duration::from_millis(2),
                    effective_timeout: None,
                },
                SignalReport {
                    name: "slow".into(),
                    outcome: SignalOutcome::TimedOut {
                        timeout: Some(Duration::from_millis(100)),
                    },
                    started_at: Some(Duration::ZERO),
                    duration: Duration::from_millis(100),
                    effective_timeout: Some(Duration::from_millis(100)),
                },
            ],
            stages: None,
            total_duration: Duration::from_millis(100),
            global_timeout_observed: false,
            state: CoordinatorState::Failed,
        });

        let failure = StartupFailed::new(report);
        let message = failure.to_string();
        assert!(message.contains("2 of 3"), "message: {message}");
        assert!(message.contains("broken failed: boom"), "message: {message}");
        assert!(message.contains("slow timed out after 100ms"), "message: {message}");
        assert!(!message.contains("good"), "successes are not listed: {message}");
        assert_eq!(failure.failures().count(), 2);
    }
}
