//! Metrics sinks for startup instrumentation.
//!
//! The coordinator invokes the sink from the worker that classifies a
//! signal; sinks must be non-blocking or arrange their own buffering.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::outcome::SignalStatus;

/// Receiver of per-signal and aggregate startup measurements.
pub trait MetricsSink: Send + Sync {
    /// Records a signal's wall-clock duration.
    fn record_signal_duration(&self, name: &str, duration: Duration);

    /// Records a signal's terminal status.
    fn record_signal_status(&self, name: &str, status: SignalStatus);

    /// Records the run's total duration.
    fn record_total_duration(&self, duration: Duration);
}

/// The default sink: discards every measurement.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_signal_duration(&self, _name: &str, _duration: Duration) {}

    fn record_signal_status(&self, _name: &str, _status: SignalStatus) {}

    fn record_total_duration(&self, _duration: Duration) {}
}

/// Snapshot of everything a [`CollectingMetrics`] sink has recorded.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Wall-clock duration per signal.
    pub signal_durations: HashMap<String, Duration>,
    /// Terminal status per signal.
    pub signal_statuses: HashMap<String, SignalStatus>,
    /// Total run duration, once recorded.
    pub total_duration: Option<Duration>,
}

/// In-memory sink for tests and embedders without a metrics backend.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use liftoff::{CollectingMetrics, MetricsSink, SignalStatus};
///
/// let metrics = CollectingMetrics::new();
/// metrics.record_signal_duration("db", Duration::from_millis(42));
/// metrics.record_signal_status("db", SignalStatus::Succeeded);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(
///     snapshot.signal_durations.get("db"),
///     Some(&Duration::from_millis(42))
/// );
/// ```
#[derive(Debug, Default)]
pub struct CollectingMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl CollectingMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current measurements.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().expect("metrics lock poisoned").clone()
    }
}

impl MetricsSink for CollectingMetrics {
    fn record_signal_duration(&self, name: &str, duration: Duration) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .signal_durations
            .insert(name.to_string(), duration);
    }

    fn record_signal_status(&self, name: &str, status: SignalStatus) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .signal_statuses
            .insert(name.to_string(), status);
    }

    fn record_total_duration(&self, duration: Duration) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .total_duration = Some(duration);
    }
}
