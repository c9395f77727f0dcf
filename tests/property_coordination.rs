use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use liftoff::{
    CoordinatorOptions, ExecutionMode, HealthStatus, SignalCollection, SignalDescriptor,
    SignalStatus,
};

fn mode_from(seed: usize) -> ExecutionMode {
    match seed % 4 {
        0 => ExecutionMode::Parallel,
        1 => ExecutionMode::Sequential,
        2 => ExecutionMode::Staged,
        _ => ExecutionMode::DependencyAware,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every registered signal produces exactly one terminal entry, its
    /// callable runs at most once, and DAG skips only name non-successful
    /// prerequisites — across all modes and outcome mixes.
    #[test]
    fn one_terminal_entry_per_signal(
        outcomes in proptest::collection::vec(any::<bool>(), 1..8),
        mode_seed in 0..4usize,
    ) {
        let mode = mode_from(mode_seed);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        runtime.block_on(async {
            let invocations = Arc::new(AtomicUsize::new(0));
            let mut signals = SignalCollection::new();

            for (index, succeeds) in outcomes.iter().copied().enumerate() {
                let invocations = invocations.clone();
                let mut descriptor =
                    SignalDescriptor::new(format!("signal-{index}"), move |_| {
                        let invocations = invocations.clone();
                        async move {
                            invocations.fetch_add(1, Ordering::SeqCst);
                            if succeeds {
                                Ok(())
                            } else {
                                Err("induced failure".into())
                            }
                        }
                    });
                if mode == ExecutionMode::Staged {
                    descriptor = descriptor.in_stage(index / 2);
                }
                if mode == ExecutionMode::DependencyAware && index > 0 {
                    descriptor = descriptor.after([format!("signal-{}", index - 1)]);
                }
                signals.add(descriptor);
            }
            signals.with_options(CoordinatorOptions::default().with_execution_mode(mode));

            let coordinator = signals.build().unwrap();
            let report = coordinator.wait_all().await.unwrap();

            assert_eq!(report.signals.len(), outcomes.len());
            for (index, signal) in report.signals.iter().enumerate() {
                assert_eq!(signal.name, format!("signal-{index}"));
            }
            assert!(invocations.load(Ordering::SeqCst) <= outcomes.len());

            if mode == ExecutionMode::DependencyAware {
                for signal in &report.signals {
                    if signal.status() == SignalStatus::Skipped {
                        for prerequisite in signal.failed_prerequisites() {
                            let prerequisite = report.find(prerequisite).unwrap();
                            assert!(!prerequisite.is_success());
                        }
                    }
                    if signal.is_success() {
                        assert!(signal
                            .failed_prerequisites()
                            .is_empty());
                    }
                }
            }

            if report.all_succeeded() && !report.global_timeout_observed {
                assert_eq!(report.health(), HealthStatus::Healthy);
            } else if !report.all_succeeded() {
                assert_eq!(report.health(), HealthStatus::Unhealthy);
            }

            // Idempotence: a second call returns the very same aggregate
            // without re-invoking any callable.
            let invoked_before = invocations.load(Ordering::SeqCst);
            let again = coordinator.wait_all().await.unwrap();
            assert!(Arc::ptr_eq(&report, &again));
            assert_eq!(invocations.load(Ordering::SeqCst), invoked_before);
        });
    }
}
