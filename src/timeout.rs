//! Pluggable per-signal timeout strategies.

use std::time::Duration;

use crate::options::CoordinatorOptions;

/// Read-only view of a signal handed to a [`TimeoutStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct SignalView<'a> {
    /// The signal's name.
    pub name: &'a str,
    /// The signal's declared per-signal timeout, if any.
    pub timeout: Option<Duration>,
    /// The signal's stage index, if any.
    pub stage: Option<usize>,
}

/// The strategy's verdict for one signal.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutDecision {
    /// Effective timeout; `None` disables the per-signal deadline.
    pub timeout: Option<Duration>,
    /// Whether exceeding the deadline cancels the signal's token.
    pub cancel_on_exceed: bool,
}

/// Decides the effective timeout for each signal.
///
/// Implementations must be pure functions of their inputs: for a given
/// signal and options bundle the decision is always the same, keeping
/// timeout classification deterministic.
pub trait TimeoutStrategy: Send + Sync {
    /// Returns the effective timeout and cancel-on-exceed flag for `signal`.
    fn effective_timeout(
        &self,
        signal: SignalView<'_>,
        options: &CoordinatorOptions,
    ) -> TimeoutDecision;
}

/// Uses each signal's declared timeout as-is.
///
/// The cancel-on-exceed flag mirrors
/// [`CoordinatorOptions::cancel_individual_on_timeout`].
#[derive(Debug, Default)]
pub struct DefaultTimeoutStrategy;

impl TimeoutStrategy for DefaultTimeoutStrategy {
    fn effective_timeout(
        &self,
        signal: SignalView<'_>,
        options: &CoordinatorOptions,
    ) -> TimeoutDecision {
        TimeoutDecision {
            timeout: signal.timeout,
            cancel_on_exceed: options.cancel_individual_on_timeout,
        }
    }
}

/// Scales every declared timeout by a constant factor.
///
/// Useful for slow environments (CI, cold container starts) where the
/// declared budgets are too tight but their relative proportions are right.
#[derive(Debug)]
pub struct ScaledTimeoutStrategy {
    factor: f64,
}

impl ScaledTimeoutStrategy {
    /// Creates a strategy multiplying declared timeouts by `factor`.
    #[must_use]
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl TimeoutStrategy for ScaledTimeoutStrategy {
    fn effective_timeout(
        &self,
        signal: SignalView<'_>,
        options: &CoordinatorOptions,
    ) -> TimeoutDecision {
        TimeoutDecision {
            timeout: signal.timeout.map(|t| t.mul_f64(self.factor)),
            cancel_on_exceed: options.cancel_individual_on_timeout,
        }
    }
}
