//! The coordinator façade: registration, the idempotent `wait_all`, and
//! the observable lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::cancellation::CancellationToken;
use crate::error::{BuildError, StartupFailed};
use crate::events::{ObserverSet, StartupObserver};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::options::{CoordinatorOptions, FailurePolicy};
use crate::outcome::StartupReport;
use crate::plan::{build_plan, Plan};
use crate::scheduler;
use crate::signal::{Signal, SignalDescriptor};
use crate::timeout::{DefaultTimeoutStrategy, TimeoutStrategy};

/// The coordinator's observable lifecycle.
///
/// `NotStarted → Running → {Completed, Failed, TimedOut}`; terminal states
/// are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "timeline-export",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum CoordinatorState {
    /// `wait_all` has never been invoked.
    NotStarted,
    /// The first `wait_all` invocation is in flight.
    Running,
    /// Every signal succeeded and the global deadline held.
    Completed,
    /// At least one signal did not succeed.
    Failed,
    /// The global deadline was observed.
    TimedOut,
}

impl CoordinatorState {
    /// Stable lower-case label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    fn encode(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::TimedOut => 4,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::TimedOut,
            _ => Self::NotStarted,
        }
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the scheduler needs, frozen at build time.
pub(crate) struct CoordinatorShared {
    pub(crate) signals: Vec<SignalDescriptor>,
    pub(crate) plan: Plan,
    pub(crate) options: CoordinatorOptions,
    pub(crate) strategy: Arc<dyn TimeoutStrategy>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) observers: ObserverSet,
}

/// Registration surface for startup signals.
///
/// Collect descriptors, options, observers, and sinks, then [`build`]
/// a [`Coordinator`]. Construction validates everything: duplicate or
/// empty names, unresolved prerequisites, dependency cycles, and invalid
/// option values are rejected before anything runs.
///
/// [`build`]: SignalCollection::build
///
/// # Examples
///
/// ```
/// use liftoff::{SignalCollection, SignalDescriptor};
///
/// let mut signals = SignalCollection::new();
/// signals.add(SignalDescriptor::new("database", |_token| async {
///     // open the pool, run a ping
///     Ok(())
/// }));
/// signals.add(SignalDescriptor::new("cache", |_token| async { Ok(()) }).after(["database"]));
///
/// let coordinator = signals.build().expect("valid registration");
/// assert_eq!(coordinator.state(), liftoff::CoordinatorState::NotStarted);
/// ```
pub struct SignalCollection {
    signals: Vec<SignalDescriptor>,
    options: CoordinatorOptions,
    strategy: Arc<dyn TimeoutStrategy>,
    metrics: Arc<dyn MetricsSink>,
    observers: Vec<Arc<dyn StartupObserver>>,
}

impl SignalCollection {
    /// Creates an empty collection with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signals: Vec::new(),
            options: CoordinatorOptions::default(),
            strategy: Arc::new(DefaultTimeoutStrategy),
            metrics: Arc::new(NoopMetrics),
            observers: Vec::new(),
        }
    }

    /// Registers a signal descriptor. Registration order is preserved in
    /// the aggregate report and drives sequential execution.
    pub fn add(&mut self, descriptor: SignalDescriptor) -> &mut Self {
        self.signals.push(descriptor);
        self
    }

    /// Registers a [`Signal`] trait object, adopting its name and timeout.
    pub fn add_signal<S>(&mut self, signal: S) -> &mut Self
    where
        S: Signal + 'static,
    {
        self.add(SignalDescriptor::from_signal(signal))
    }

    /// Replaces the options bundle.
    pub fn with_options(&mut self, options: CoordinatorOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Replaces the timeout strategy.
    pub fn with_timeout_strategy<S>(&mut self, strategy: S) -> &mut Self
    where
        S: TimeoutStrategy + 'static,
    {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Replaces the metrics sink.
    pub fn with_metrics<M>(&mut self, metrics: M) -> &mut Self
    where
        M: MetricsSink + 'static,
    {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Shares an already-wrapped metrics sink (useful to keep a handle for
    /// inspecting a [`CollectingMetrics`](crate::CollectingMetrics) later).
    pub fn with_shared_metrics(&mut self, metrics: Arc<dyn MetricsSink>) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// Subscribes a lifecycle observer.
    pub fn observe<O>(&mut self, observer: O) -> &mut Self
    where
        O: StartupObserver + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Subscribes an already-wrapped observer.
    pub fn observe_shared(&mut self, observer: Arc<dyn StartupObserver>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Validates the registration and constructs the coordinator.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for duplicate or empty names, zero
    /// timeouts, unresolved prerequisites, dependency cycles, or invalid
    /// option values.
    pub fn build(self) -> Result<Coordinator, BuildError> {
        self.options.validate()?;
        let plan = build_plan(&self.signals, self.options.execution_mode)?;
        Ok(Coordinator {
            shared: Arc::new(CoordinatorShared {
                signals: self.signals,
                plan,
                options: self.options,
                strategy: self.strategy,
                metrics: self.metrics,
                observers: ObserverSet::new(self.observers),
            }),
            state: AtomicU8::new(CoordinatorState::NotStarted.encode()),
            cell: OnceCell::new(),
        })
    }
}

impl Default for SignalCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct RunResult {
    report: Arc<StartupReport>,
    failure: Option<StartupFailed>,
}

/// Coordinates the registered signals behind one idempotent `wait_all`.
///
/// The first `wait_all` invocation performs the plan; concurrent and later
/// invocations await or return the same cached [`StartupReport`]. The
/// coordinator runs once per process lifetime — there is no reset.
pub struct Coordinator {
    shared: Arc<CoordinatorShared>,
    state: AtomicU8,
    cell: OnceCell<RunResult>,
}

impl Coordinator {
    /// Waits for every registered signal to reach a terminal status.
    ///
    /// Idempotent: all callers observe the same aggregate. Under
    /// [`FailurePolicy::FailFast`] every invocation returns the same
    /// composite [`StartupFailed`] when any signal did not succeed; under
    /// the other policies the report is always returned and must be
    /// inspected.
    pub async fn wait_all(&self) -> Result<Arc<StartupReport>, StartupFailed> {
        self.wait_all_inner(None).await
    }

    /// Like [`wait_all`](Self::wait_all), with an ambient token that
    /// cancels the run's root scope (reason: manual) when cancelled.
    ///
    /// Only the token of the invocation that starts the run is observed;
    /// later invocations merely await the cached outcome.
    pub async fn wait_all_with_token(
        &self,
        ambient: CancellationToken,
    ) -> Result<Arc<StartupReport>, StartupFailed> {
        self.wait_all_inner(Some(ambient)).await
    }

    async fn wait_all_inner(
        &self,
        ambient: Option<CancellationToken>,
    ) -> Result<Arc<StartupReport>, StartupFailed> {
        let result = self
            .cell
            .get_or_init(|| async {
                self.store_state(CoordinatorState::Running);
                let output = scheduler::run(self.shared.clone(), ambient).await;

                let state = if output.global_timeout_observed {
                    CoordinatorState::TimedOut
                } else if output.reports.iter().all(|report| report.is_success()) {
                    CoordinatorState::Completed
                } else {
                    CoordinatorState::Failed
                };

                let report = Arc::new(StartupReport {
                    signals: output.reports,
                    stages: output.stages,
                    total_duration: output.total_duration,
                    global_timeout_observed: output.global_timeout_observed,
                    state,
                });

                self.store_state(state);
                self.shared.metrics.record_total_duration(report.total_duration);
                self.shared
                    .observers
                    .coordinator_completed(state, report.total_duration);

                let failure = (self.shared.options.policy == FailurePolicy::FailFast
                    && !report.all_succeeded())
                .then(|| StartupFailed::new(report.clone()));

                RunResult { report, failure }
            })
            .await;

        match &result.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(result.report.clone()),
        }
    }

    /// The cached aggregate, or `None` while `wait_all` has never entered
    /// the running state or has not yet finished.
    #[must_use]
    pub fn result(&self) -> Option<Arc<StartupReport>> {
        self.cell.get().map(|result| result.report.clone())
    }

    /// The current lifecycle value.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::decode(self.state.load(Ordering::SeqCst))
    }

    /// The options the coordinator was built with.
    #[must_use]
    pub fn options(&self) -> &CoordinatorOptions {
        &self.shared.options
    }

    fn store_state(&self, state: CoordinatorState) {
        self.state.store(state.encode(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_encoding() {
        for state in [
            CoordinatorState::NotStarted,
            CoordinatorState::Running,
            CoordinatorState::Completed,
            CoordinatorState::Failed,
            CoordinatorState::TimedOut,
        ] {
            assert_eq!(CoordinatorState::decode(state.encode()), state);
        }
    }

    #[test]
    fn build_rejects_invalid_options() {
        let mut signals = SignalCollection::new();
        signals.with_options(CoordinatorOptions::default().with_max_degree_of_parallelism(0));
        assert!(matches!(
            signals.build(),
            Err(BuildError::InvalidOption(_))
        ));
    }

    #[tokio::test]
    async fn empty_collection_completes_immediately() {
        let coordinator = SignalCollection::new().build().unwrap();
        let report = coordinator.wait_all().await.unwrap();
        assert!(report.signals.is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Completed);
    }
}
