//! # liftoff
//!
//! Async startup readiness coordination for Rust services.
//!
//! An application usually has a handful of things that must finish before
//! it starts serving traffic: database pools, cache warm-ups, migrations,
//! broker connections. `liftoff` coordinates those as named **signals**
//! behind one idempotent `wait_all` call that produces a structured,
//! cached report — the thing your readiness probe, health endpoint, and
//! deployment gate all want to look at.
//!
//! ## Features
//!
//! - **Four execution modes**: parallel, sequential, staged, and
//!   dependency-aware (prerequisite DAG with topological waves)
//! - **Two-layer timeouts**: a global deadline (soft or hard) plus
//!   per-signal deadlines with a pluggable strategy
//! - **Failure policies**: fail-fast, best-effort, continue-on-timeout,
//!   and per-stage variants including early promotion
//! - **Structured cancellation**: a scope tree with annotated
//!   `(reason, trigger)` causes, propagating parent to child only
//! - **Observability**: lifecycle events, a metrics sink, `tracing`
//!   integration, and an optional versioned JSON timeline export
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use liftoff::{
//!     CoordinatorOptions, ExecutionMode, HealthStatus, SignalCollection, SignalDescriptor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut signals = SignalCollection::new();
//! signals
//!     .add(
//!         SignalDescriptor::new("database", |token| async move {
//!             token.throw_if_cancelled()?;
//!             // open the pool, run a ping
//!             Ok(())
//!         })
//!         .with_timeout(Duration::from_secs(5)),
//!     )
//!     .add(SignalDescriptor::new("cache", |_| async { Ok(()) }).after(["database"]))
//!     .with_options(
//!         CoordinatorOptions::default()
//!             .with_execution_mode(ExecutionMode::DependencyAware)
//!             .with_global_timeout(Duration::from_secs(15)),
//!     );
//!
//! let coordinator = signals.build()?;
//! let report = coordinator.wait_all().await?;
//!
//! if report.health() == HealthStatus::Healthy {
//!     // start serving traffic
//! } else {
//!     for failure in report.failures() {
//!         eprintln!("{}: {}", failure.name, failure.status());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution model
//!
//! Registrations become a plan of **waves**; the scheduler dispatches one
//! wave at a time, waiting for every member to reach a terminal status
//! before moving on. Each signal gets exactly one terminal status —
//! succeeded, failed, timed-out, skipped, or cancelled — and `wait_all`
//! caches a single immutable [`StartupReport`] that every caller shares.
//! The coordinator runs once per process lifetime.

// Module declarations
pub mod cancellation;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod options;
pub mod outcome;
pub mod signal;
pub mod timeout;

#[cfg(feature = "timeline-export")]
pub mod export;

// Internal modules
mod plan;
mod scheduler;

// Re-export core types
pub use cancellation::{
    CancellationCause, CancellationError, CancellationReason, CancellationScope,
    CancellationToken,
};
pub use coordinator::{Coordinator, CoordinatorState, SignalCollection};
pub use error::{BuildError, StartupFailed};
pub use events::{LoggingObserver, StartupObserver};
pub use health::HealthStatus;
pub use metrics::{CollectingMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use options::{CoordinatorOptions, ExecutionMode, FailurePolicy, StagePolicy};
pub use outcome::{
    SignalFailure, SignalOutcome, SignalReport, SignalStatus, StageReport, StartupReport,
    StatusCounts,
};
pub use signal::{Signal, SignalDescriptor, SignalError, SignalKind};
pub use timeout::{
    DefaultTimeoutStrategy, ScaledTimeoutStrategy, SignalView, TimeoutDecision, TimeoutStrategy,
};

#[cfg(feature = "timeline-export")]
pub use export::{Timeline, TimelineSignal, TimelineStage, TIMELINE_SCHEMA_VERSION};
