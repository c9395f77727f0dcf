//! Lifecycle events for startup observability.
//!
//! Observers receive synchronous callbacks on the worker that classifies a
//! signal. Handlers are isolated: a panic in one observer does not affect
//! the others or the coordinator's own progress.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorState;
use crate::outcome::SignalStatus;

/// Observer of coordinator lifecycle events.
///
/// All methods default to no-ops; implement the ones you care about.
/// For a signal, `signal_started` strictly precedes `signal_completed`;
/// `coordinator_completed` fires exactly once, after every per-signal
/// completion. Keep implementations lightweight — they run inline on the
/// scheduler's workers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use liftoff::{SignalStatus, StartupObserver};
///
/// struct PrintObserver;
///
/// impl StartupObserver for PrintObserver {
///     fn signal_completed(&self, name: &str, status: SignalStatus, duration: Duration) {
///         println!("{name}: {status} in {duration:?}");
///     }
/// }
/// ```
pub trait StartupObserver: Send + Sync {
    /// A signal's execution envelope began. `started_at` is the offset
    /// from the start of the run.
    fn signal_started(&self, name: &str, started_at: Duration) {
        let _ = (name, started_at);
    }

    /// A signal reached its terminal status.
    fn signal_completed(&self, name: &str, status: SignalStatus, duration: Duration) {
        let _ = (name, status, duration);
    }

    /// The global deadline expired. `at` is the offset from the start of
    /// the run; fires in both soft and hard modes.
    fn global_timeout_fired(&self, at: Duration) {
        let _ = at;
    }

    /// The coordinator reached its terminal state. Fires exactly once.
    fn coordinator_completed(&self, state: CoordinatorState, total_duration: Duration) {
        let _ = (state, total_duration);
    }
}

/// Immutable set of observers with panic isolation.
#[derive(Clone)]
pub(crate) struct ObserverSet {
    observers: Arc<Vec<Arc<dyn StartupObserver>>>,
}

impl ObserverSet {
    pub(crate) fn new(observers: Vec<Arc<dyn StartupObserver>>) -> Self {
        Self {
            observers: Arc::new(observers),
        }
    }

    pub(crate) fn signal_started(&self, name: &str, started_at: Duration) {
        self.each(|observer| observer.signal_started(name, started_at));
    }

    pub(crate) fn signal_completed(&self, name: &str, status: SignalStatus, duration: Duration) {
        self.each(|observer| observer.signal_completed(name, status, duration));
    }

    pub(crate) fn global_timeout_fired(&self, at: Duration) {
        self.each(|observer| observer.global_timeout_fired(at));
    }

    pub(crate) fn coordinator_completed(&self, state: CoordinatorState, total: Duration) {
        self.each(|observer| observer.coordinator_completed(state, total));
    }

    fn each(&self, emit: impl Fn(&dyn StartupObserver)) {
        for observer in self.observers.iter() {
            // One misbehaving handler must not take down the run or
            // starve the other observers.
            let _ = catch_unwind(AssertUnwindSafe(|| emit(observer.as_ref())));
        }
    }
}

/// Observer that forwards lifecycle events to `tracing`.
///
/// Successes log at `debug`, non-successes at `warn`, the run summary at
/// `info`, all under the `liftoff` target.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl StartupObserver for LoggingObserver {
    fn signal_started(&self, name: &str, started_at: Duration) {
        debug!(target: "liftoff", signal = name, offset_ms = started_at.as_millis() as u64, "signal started");
    }

    fn signal_completed(&self, name: &str, status: SignalStatus, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        match status {
            SignalStatus::Succeeded => {
                debug!(target: "liftoff", signal = name, duration_ms, "signal succeeded");
            }
            status => {
                warn!(target: "liftoff", signal = name, status = status.as_str(), duration_ms, "signal did not succeed");
            }
        }
    }

    fn global_timeout_fired(&self, at: Duration) {
        warn!(target: "liftoff", offset_ms = at.as_millis() as u64, "global startup deadline expired");
    }

    fn coordinator_completed(&self, state: CoordinatorState, total_duration: Duration) {
        info!(
            target: "liftoff",
            state = state.as_str(),
            total_ms = total_duration.as_millis() as u64,
            "startup coordination finished"
        );
    }
}
