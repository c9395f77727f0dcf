//! The scheduler: drives the plan's waves and classifies every signal.
//!
//! Each signal runs inside a uniform execution envelope (permit, effective
//! token, timers, classification, cascade); the mode-specific drivers only
//! decide which signals to dispatch together and how failures propagate
//! between waves.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancellation::{
    CancellationCause, CancellationReason, CancellationScope, CancellationToken,
};
use crate::coordinator::CoordinatorShared;
use crate::options::{ExecutionMode, FailurePolicy, StagePolicy};
use crate::outcome::{SignalOutcome, SignalReport, StageReport, StatusCounts};
use crate::signal::{SignalDescriptor, SignalError};
use crate::timeout::{SignalView, TimeoutDecision};

pub(crate) struct RunOutput {
    pub(crate) reports: Vec<SignalReport>,
    pub(crate) stages: Option<Vec<StageReport>>,
    pub(crate) total_duration: Duration,
    pub(crate) global_timeout_observed: bool,
}

struct RunContext {
    shared: Arc<CoordinatorShared>,
    root: CancellationScope,
    semaphore: Option<Arc<Semaphore>>,
    run_start: Instant,
    global_timeout_fired: AtomicBool,
    in_flight: AtomicUsize,
}

/// Executes the whole plan once and returns every signal's report.
pub(crate) async fn run(
    shared: Arc<CoordinatorShared>,
    ambient: Option<CancellationToken>,
) -> RunOutput {
    let ctx = Arc::new(RunContext {
        semaphore: shared
            .options
            .max_degree_of_parallelism
            .map(|limit| Arc::new(Semaphore::new(limit))),
        root: CancellationScope::root("startup"),
        run_start: Instant::now(),
        global_timeout_fired: AtomicBool::new(false),
        in_flight: AtomicUsize::new(0),
        shared,
    });

    let ambient_watcher = ambient.map(|token| {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            ctx.root.cancel(CancellationReason::Manual, None);
        })
    });
    let deadline_watcher = tokio::spawn(global_deadline(ctx.clone()));

    let signal_count = ctx.shared.signals.len();
    let mut slots: Vec<Option<SignalReport>> = (0..signal_count).map(|_| None).collect();
    let mut stages = None;

    match ctx.shared.plan.mode {
        ExecutionMode::Parallel => run_parallel(&ctx, &mut slots).await,
        ExecutionMode::Sequential => run_sequential(&ctx, &mut slots).await,
        ExecutionMode::Staged => stages = Some(run_staged(&ctx, &mut slots).await),
        ExecutionMode::DependencyAware => run_dependency_aware(&ctx, &mut slots).await,
    }

    deadline_watcher.abort();
    if let Some(watcher) = ambient_watcher {
        watcher.abort();
    }

    let reports = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| undispatched(&ctx.shared.signals[index], Vec::new()))
        })
        .collect();

    RunOutput {
        reports,
        stages,
        total_duration: ctx.run_start.elapsed(),
        global_timeout_observed: ctx.global_timeout_fired.load(Ordering::SeqCst),
    }
}

async fn global_deadline(ctx: Arc<RunContext>) {
    tokio::time::sleep(ctx.shared.options.global_timeout).await;
    ctx.global_timeout_fired.store(true, Ordering::SeqCst);
    let at = ctx.run_start.elapsed();
    match ctx.shared.options.policy {
        FailurePolicy::ContinueOnTimeout => info!(
            target: "liftoff",
            offset_ms = at.as_millis() as u64,
            "global deadline expired; continuing until in-flight signals settle"
        ),
        _ => warn!(
            target: "liftoff",
            offset_ms = at.as_millis() as u64,
            hard = ctx.shared.options.cancel_on_global_timeout,
            "global startup deadline expired"
        ),
    }
    ctx.shared.observers.global_timeout_fired(at);
    if ctx.shared.options.cancel_on_global_timeout {
        ctx.root.cancel(CancellationReason::GlobalTimeout, None);
    }
}

// ── Mode drivers ────────────────────────────────────────────────────

async fn run_parallel(ctx: &Arc<RunContext>, slots: &mut [Option<SignalReport>]) {
    for wave in &ctx.shared.plan.waves {
        dispatch_wave(ctx, &wave.signals, slots).await;
    }
}

async fn run_sequential(ctx: &Arc<RunContext>, slots: &mut [Option<SignalReport>]) {
    let mut halted = false;
    for wave in &ctx.shared.plan.waves {
        for &index in &wave.signals {
            if halted {
                slots[index] = Some(undispatched(&ctx.shared.signals[index], Vec::new()));
                continue;
            }
            let report = run_signal(ctx.clone(), index, None).await;
            let success = report.is_success();
            slots[index] = Some(report);
            if !success && ctx.shared.options.policy == FailurePolicy::FailFast {
                halted = true;
            }
        }
    }
}

async fn run_dependency_aware(ctx: &Arc<RunContext>, slots: &mut [Option<SignalReport>]) {
    let mut halted = false;
    for wave in &ctx.shared.plan.waves {
        let mut dispatch = Vec::with_capacity(wave.signals.len());
        for &index in &wave.signals {
            let failed = failed_prerequisites(ctx, slots, index);
            if halted || !failed.is_empty() {
                slots[index] = Some(undispatched(&ctx.shared.signals[index], failed));
            } else {
                dispatch.push(index);
            }
        }
        if dispatch.is_empty() {
            continue;
        }
        dispatch_wave(ctx, &dispatch, slots).await;
        if ctx.shared.options.policy == FailurePolicy::FailFast
            && dispatch
                .iter()
                .any(|&index| !slot_succeeded(slots, index))
        {
            halted = true;
        }
    }
}

async fn run_staged(
    ctx: &Arc<RunContext>,
    slots: &mut [Option<SignalReport>],
) -> Vec<StageReport> {
    let policy = ctx.shared.options.stage_policy;
    let mut reports: Vec<StageReport> = Vec::new();
    let mut remainders: Vec<(usize, JoinSet<(usize, SignalReport)>, Vec<usize>)> = Vec::new();
    let mut terminal_stage: Option<usize> = None;
    let mut skip_rest = false;

    for wave in &ctx.shared.plan.waves {
        let stage = wave.stage.unwrap_or(0);
        let started_at = ctx.run_start.elapsed();

        if skip_rest {
            for &index in &wave.signals {
                slots[index] = Some(undispatched(&ctx.shared.signals[index], Vec::new()));
            }
            reports.push(StageReport {
                stage,
                started_at,
                ended_at: started_at,
                counts: tally(slots, &wave.signals),
                terminal: false,
            });
            continue;
        }

        debug!(target: "liftoff", stage, signals = wave.signals.len(), "dispatching stage");
        let abort = Arc::new(AtomicBool::new(false));
        let watches_abort =
            matches!(policy, StagePolicy::FailFast | StagePolicy::EarlyPromotion);
        let mut join = JoinSet::new();
        for &index in &wave.signals {
            let ctx = ctx.clone();
            let abort = watches_abort.then(|| abort.clone());
            join.spawn(async move { (index, run_signal(ctx, index, abort).await) });
        }

        let total = wave.signals.len();
        let needed = promotion_quota(ctx.shared.options.early_promotion_threshold, total);
        let mut successes = 0usize;
        let mut stage_failed = false;
        let mut promoted = false;

        while let Some(joined) = join.join_next().await {
            let Ok((index, report)) = joined else { continue };
            let success = report.is_success();
            slots[index] = Some(report);
            if success {
                successes += 1;
            } else {
                stage_failed = true;
                if watches_abort {
                    abort.store(true, Ordering::SeqCst);
                }
            }
            if matches!(policy, StagePolicy::EarlyPromotion)
                && !stage_failed
                && successes >= needed
            {
                promoted = true;
                break;
            }
        }

        if promoted && !join.is_empty() {
            // The remainder settles alongside later stages; counts and end
            // time are patched once it drains.
            reports.push(StageReport {
                stage,
                started_at,
                ended_at: ctx.run_start.elapsed(),
                counts: StatusCounts::default(),
                terminal: false,
            });
            remainders.push((reports.len() - 1, join, wave.signals.clone()));
        } else {
            reports.push(StageReport {
                stage,
                started_at,
                ended_at: ctx.run_start.elapsed(),
                counts: tally(slots, &wave.signals),
                terminal: false,
            });
        }

        let gate_failed = match policy {
            StagePolicy::AllMustSucceed | StagePolicy::FailFast => stage_failed,
            StagePolicy::BestEffort => false,
            StagePolicy::EarlyPromotion => stage_failed && !promoted,
        };
        if gate_failed
            || (stage_failed && ctx.shared.options.policy == FailurePolicy::FailFast)
        {
            skip_rest = true;
            terminal_stage = Some(reports.len() - 1);
        }
    }

    for (report_index, mut join, members) in remainders {
        while let Some(joined) = join.join_next().await {
            if let Ok((index, report)) = joined {
                slots[index] = Some(report);
            }
        }
        let entry = &mut reports[report_index];
        entry.ended_at = ctx.run_start.elapsed();
        entry.counts = tally(slots, &members);
    }

    if let Some(index) = terminal_stage {
        reports[index].terminal = true;
    }
    reports
}

async fn dispatch_wave(
    ctx: &Arc<RunContext>,
    indices: &[usize],
    slots: &mut [Option<SignalReport>],
) {
    let mut join = JoinSet::new();
    for &index in indices {
        let ctx = ctx.clone();
        join.spawn(async move { (index, run_signal(ctx, index, None).await) });
    }
    while let Some(joined) = join.join_next().await {
        if let Ok((index, report)) = joined {
            slots[index] = Some(report);
        }
    }
}

// ── Per-signal execution envelope ───────────────────────────────────

async fn run_signal(
    ctx: Arc<RunContext>,
    index: usize,
    abort: Option<Arc<AtomicBool>>,
) -> SignalReport {
    let signal = &ctx.shared.signals[index];

    let _permit = match &ctx.semaphore {
        // The semaphore is never closed, so acquisition only fails if the
        // runtime is tearing down; running unpermitted is the safe fallback.
        Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
        None => None,
    };

    // A stage abort that happened while this signal was queued on the
    // semaphore means its dispatch was withdrawn.
    if abort.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
        return undispatched(signal, Vec::new());
    }

    // A scope cancelled before the envelope began: the signal never ran.
    if let Some(cause) = owning_cause(&ctx, signal) {
        return match cause.reason {
            CancellationReason::GlobalTimeout => undispatched(signal, Vec::new()),
            reason => SignalReport {
                name: signal.name().to_string(),
                outcome: SignalOutcome::Cancelled {
                    reason,
                    trigger: cause.trigger,
                },
                started_at: None,
                duration: Duration::ZERO,
                effective_timeout: None,
            },
        };
    }

    let decision = ctx.shared.strategy.effective_timeout(
        SignalView {
            name: signal.name(),
            timeout: signal.timeout(),
            stage: signal.stage(),
        },
        &ctx.shared.options,
    );

    let started_offset = ctx.run_start.elapsed();
    let in_flight = ctx.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(target: "liftoff", signal = signal.name(), in_flight, "signal dispatched");
    ctx.shared.observers.signal_started(signal.name(), started_offset);
    let started = Instant::now();

    let effective = effective_token(&ctx, signal);
    let wait = std::panic::AssertUnwindSafe(signal.invoke(effective.clone())).catch_unwind();
    tokio::pin!(wait);

    let mut timer_expired = false;
    let natural = match decision.timeout {
        None => Some(wait.await),
        Some(limit) => {
            tokio::select! {
                result = &mut wait => Some(result),
                () = tokio::time::sleep(limit) => {
                    timer_expired = true;
                    if decision.cancel_on_exceed {
                        // Cancel and stop polling: the deadline is the
                        // signal's budget, cooperative or not.
                        effective.cancel();
                        None
                    } else {
                        // Classification is pinned to timed-out, but the
                        // callable may run to natural completion.
                        Some(wait.await)
                    }
                }
            }
        }
    };

    let duration = started.elapsed();
    ctx.in_flight.fetch_sub(1, Ordering::SeqCst);

    let result = natural.map(|joined| match joined {
        Ok(inner) => inner,
        Err(payload) => Err(panic_failure(payload)),
    });

    let outcome = classify(&ctx, signal, result, timer_expired, decision);
    cascade(&ctx, signal, &outcome);

    let status = outcome.status();
    ctx.shared.observers.signal_completed(signal.name(), status, duration);
    ctx.shared.metrics.record_signal_duration(signal.name(), duration);
    ctx.shared.metrics.record_signal_status(signal.name(), status);

    SignalReport {
        name: signal.name().to_string(),
        outcome,
        started_at: Some(started_offset),
        duration,
        effective_timeout: decision.timeout,
    }
}

/// Ordered terminal classification: failure > timeout > cancelled.
fn classify(
    ctx: &RunContext,
    signal: &SignalDescriptor,
    result: Option<Result<(), SignalError>>,
    timer_expired: bool,
    decision: TimeoutDecision,
) -> SignalOutcome {
    enum Natural {
        NotPolled,
        Completed,
        CancelledErr(SignalError),
    }

    let natural = match result {
        None => Natural::NotPolled,
        Some(Ok(())) => Natural::Completed,
        Some(Err(error)) => {
            if error
                .downcast_ref::<crate::cancellation::CancellationError>()
                .is_some()
            {
                Natural::CancelledErr(error)
            } else {
                // A concrete domain failure is reported over any
                // supervisory condition.
                return SignalOutcome::Failed(Arc::from(error));
            }
        }
    };

    if timer_expired {
        return SignalOutcome::TimedOut {
            timeout: decision.timeout,
        };
    }

    if let Some(cause) = owning_cause(ctx, signal) {
        if cause.reason == CancellationReason::GlobalTimeout {
            return SignalOutcome::TimedOut { timeout: None };
        }
        if matches!(natural, Natural::CancelledErr(_)) {
            return SignalOutcome::Cancelled {
                reason: cause.reason,
                trigger: cause.trigger,
            };
        }
    }

    match natural {
        Natural::Completed => SignalOutcome::Succeeded,
        // A cancellation error with no cancelled scope is an ordinary
        // failure of the callable.
        Natural::CancelledErr(error) => SignalOutcome::Failed(Arc::from(error)),
        Natural::NotPolled => SignalOutcome::TimedOut {
            timeout: decision.timeout,
        },
    }
}

fn cascade(ctx: &RunContext, signal: &SignalDescriptor, outcome: &SignalOutcome) {
    if outcome.is_success() {
        return;
    }
    if let Some(scope) = signal.scope() {
        if signal.cancels_scope_on_failure() {
            let reason = match outcome {
                SignalOutcome::TimedOut { .. } => CancellationReason::SignalTimeout,
                _ => CancellationReason::SignalFailure,
            };
            scope.cancel(reason, Some(signal.name()));
        }
        if ctx.shared.options.cancel_dependents_on_failure
            && ctx.shared.plan.mode == ExecutionMode::DependencyAware
        {
            scope.cancel(CancellationReason::DependencyFailure, Some(signal.name()));
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn effective_token(ctx: &RunContext, signal: &SignalDescriptor) -> CancellationToken {
    let mut parents = vec![ctx.root.token()];
    if let Some(scope) = signal.scope() {
        parents.push(scope.token());
    }
    CancellationToken::derived(parents)
}

/// The cancellation cause governing `signal`: its own scope's, or the
/// coordinator root's for plain signals (the root also reaches scoped
/// signals through their effective token).
fn owning_cause(ctx: &RunContext, signal: &SignalDescriptor) -> Option<CancellationCause> {
    signal
        .scope()
        .and_then(CancellationScope::cause)
        .or_else(|| ctx.root.cause())
}

fn failed_prerequisites(
    ctx: &RunContext,
    slots: &[Option<SignalReport>],
    index: usize,
) -> Vec<String> {
    ctx.shared.plan.prerequisites[index]
        .iter()
        .filter(|&&prerequisite| !slot_succeeded(slots, prerequisite))
        .map(|&prerequisite| ctx.shared.signals[prerequisite].name().to_string())
        .collect()
}

fn slot_succeeded(slots: &[Option<SignalReport>], index: usize) -> bool {
    slots[index]
        .as_ref()
        .is_some_and(SignalReport::is_success)
}

fn tally(slots: &[Option<SignalReport>], members: &[usize]) -> StatusCounts {
    StatusCounts::tally(
        members
            .iter()
            .filter_map(|&index| slots[index].as_ref()),
    )
}

fn undispatched(signal: &SignalDescriptor, failed_prerequisites: Vec<String>) -> SignalReport {
    SignalReport {
        name: signal.name().to_string(),
        outcome: SignalOutcome::Skipped {
            failed_prerequisites,
        },
        started_at: None,
        duration: Duration::ZERO,
        effective_timeout: None,
    }
}

fn promotion_quota(threshold: f64, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    ((threshold * total as f64).ceil() as usize).clamp(1, total)
}

fn panic_failure(payload: Box<dyn Any + Send>) -> SignalError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string());
    SignalError::from(format!("signal panicked: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_quota_rounds_up() {
        assert_eq!(promotion_quota(0.5, 4), 2);
        assert_eq!(promotion_quota(0.5, 3), 2);
        assert_eq!(promotion_quota(1.0, 3), 3);
        assert_eq!(promotion_quota(0.1, 1), 1);
        assert_eq!(promotion_quota(0.9, 0), 0);
    }

    #[test]
    fn panic_failure_extracts_str_payloads() {
        let failure = panic_failure(Box::new("boom"));
        assert!(failure.to_string().contains("boom"));
        let failure = panic_failure(Box::new(String::from("again")));
        assert!(failure.to_string().contains("again"));
    }
}
