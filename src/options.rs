//! Coordinator configuration: execution mode, policies, timeouts.

use std::time::Duration;

use crate::error::BuildError;

/// How the registered signal population is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// All signals dispatched concurrently in a single wave.
    #[default]
    Parallel,
    /// One signal at a time, in registration order.
    Sequential,
    /// Waves partitioned by stage index, ascending.
    Staged,
    /// Waves derived from prerequisite declarations (topological layers).
    DependencyAware,
}

/// Coordinator-level rule for whether non-success halts dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// First non-success halts further waves; `wait_all` returns the
    /// composite failure.
    FailFast,
    /// Every wave is dispatched; callers inspect the report.
    #[default]
    BestEffort,
    /// Best-effort that additionally tolerates the global deadline with
    /// softened logging.
    ContinueOnTimeout,
}

/// Per-stage rule for whether the next stage runs (staged mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagePolicy {
    /// Subsequent stages run only if every signal in the current stage
    /// succeeded.
    AllMustSucceed,
    /// Subsequent stages run unconditionally.
    #[default]
    BestEffort,
    /// First non-success aborts remaining dispatch in the stage and skips
    /// later stages.
    FailFast,
    /// The next stage begins once a success-fraction threshold is met;
    /// the remainder of the stage settles alongside.
    EarlyPromotion,
}

/// The coordinator's options bundle.
///
/// Construct with [`CoordinatorOptions::default`] and refine fluently:
///
/// ```
/// use std::time::Duration;
/// use liftoff::{CoordinatorOptions, ExecutionMode, FailurePolicy};
///
/// let options = CoordinatorOptions::default()
///     .with_global_timeout(Duration::from_secs(10))
///     .with_execution_mode(ExecutionMode::DependencyAware)
///     .with_policy(FailurePolicy::FailFast)
///     .with_max_degree_of_parallelism(4);
/// # assert_eq!(options.max_degree_of_parallelism, Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Deadline for the whole startup run. Default 30 seconds.
    pub global_timeout: Duration,
    /// Scheduling mode. Default [`ExecutionMode::Parallel`].
    pub execution_mode: ExecutionMode,
    /// Failure policy. Default [`FailurePolicy::BestEffort`].
    pub policy: FailurePolicy,
    /// Stage policy; meaningful only in staged mode.
    pub stage_policy: StagePolicy,
    /// Success fraction in `(0, 1]` unblocking the next stage under
    /// [`StagePolicy::EarlyPromotion`].
    pub early_promotion_threshold: f64,
    /// Concurrency bound; `None` means unbounded.
    pub max_degree_of_parallelism: Option<usize>,
    /// Hard global timeout: cancel the root scope when the deadline fires.
    pub cancel_on_global_timeout: bool,
    /// Cancel a signal's token when its own deadline fires.
    pub cancel_individual_on_timeout: bool,
    /// Cancel a failing signal's scope so in-flight scope-sharers observe
    /// dependency failure (dependency-aware mode).
    pub cancel_dependents_on_failure: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(30),
            execution_mode: ExecutionMode::default(),
            policy: FailurePolicy::default(),
            stage_policy: StagePolicy::default(),
            early_promotion_threshold: 1.0,
            max_degree_of_parallelism: None,
            cancel_on_global_timeout: false,
            cancel_individual_on_timeout: false,
            cancel_dependents_on_failure: false,
        }
    }
}

impl CoordinatorOptions {
    /// Sets the global deadline.
    #[must_use]
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the coordinator-level failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the stage policy (staged mode).
    #[must_use]
    pub fn with_stage_policy(mut self, policy: StagePolicy) -> Self {
        self.stage_policy = policy;
        self
    }

    /// Sets the early-promotion success threshold.
    #[must_use]
    pub fn with_early_promotion_threshold(mut self, threshold: f64) -> Self {
        self.early_promotion_threshold = threshold;
        self
    }

    /// Bounds signal concurrency.
    #[must_use]
    pub fn with_max_degree_of_parallelism(mut self, limit: usize) -> Self {
        self.max_degree_of_parallelism = Some(limit);
        self
    }

    /// Makes the global timeout hard: the root scope is cancelled when the
    /// deadline fires.
    #[must_use]
    pub fn with_cancel_on_global_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_global_timeout = cancel;
        self
    }

    /// Cancels a signal's token when its own deadline fires.
    #[must_use]
    pub fn with_cancel_individual_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_individual_on_timeout = cancel;
        self
    }

    /// Cancels a failing signal's scope to fail its dependents promptly.
    #[must_use]
    pub fn with_cancel_dependents_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_dependents_on_failure = cancel;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.global_timeout.is_zero() {
            return Err(BuildError::InvalidOption(
                "global_timeout must be positive".to_string(),
            ));
        }
        if self.max_degree_of_parallelism == Some(0) {
            return Err(BuildError::InvalidOption(
                "max_degree_of_parallelism must be at least 1".to_string(),
            ));
        }
        let threshold = self.early_promotion_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(BuildError::InvalidOption(format!(
                "early_promotion_threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(())
    }
}
