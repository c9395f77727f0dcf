use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use liftoff::{
    CoordinatorOptions, CoordinatorState, HealthStatus, SignalCollection, SignalDescriptor,
    SignalStatus,
};

#[tokio::test]
async fn independent_signals_run_in_parallel() {
    let mut signals = SignalCollection::new();
    for name in ["a", "b", "c"] {
        signals.add(SignalDescriptor::new(name, |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }));
    }
    signals.with_options(CoordinatorOptions::default().with_global_timeout(Duration::from_secs(1)));

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    assert_eq!(report.signals.len(), 3);
    assert!(report.all_succeeded());
    // Three 100 ms sleeps overlapping: well under the sequential 300 ms.
    assert!(
        report.total_duration < Duration::from_millis(250),
        "total: {:?}",
        report.total_duration
    );
    assert!(!report.timed_out());
    assert!(!report.global_timeout_observed);
    assert_eq!(report.health(), HealthStatus::Healthy);
    assert_eq!(coordinator.state(), CoordinatorState::Completed);
    assert_eq!(coordinator.health(), HealthStatus::Healthy);
}

#[tokio::test]
async fn report_preserves_registration_order() {
    let mut signals = SignalCollection::new();
    for name in ["zeta", "alpha", "mid"] {
        signals.add(SignalDescriptor::new(name, |_| async { Ok(()) }));
    }
    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    let names: Vec<&str> = report.signals.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn result_is_a_sentinel_before_the_first_run() {
    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("a", |_| async { Ok(()) }));
    let coordinator = signals.build().unwrap();

    assert!(coordinator.result().is_none());
    assert_eq!(coordinator.state(), CoordinatorState::NotStarted);
    assert_eq!(coordinator.health(), HealthStatus::Unhealthy);

    coordinator.wait_all().await.unwrap();
    assert!(coordinator.result().is_some());
}

#[tokio::test]
async fn concurrent_callers_share_one_run() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("once", move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    }));

    let coordinator = signals.build().unwrap();
    let (first, second) = tokio::join!(coordinator.wait_all(), coordinator.wait_all());
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // A third call after termination returns the same aggregate.
    let third = coordinator.wait_all().await.unwrap();
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrency_bound_limits_in_flight_signals() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut signals = SignalCollection::new();
    for index in 0..6 {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        signals.add(SignalDescriptor::new(
            format!("signal-{index}"),
            move |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));
    }
    signals.with_options(CoordinatorOptions::default().with_max_degree_of_parallelism(2));

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    assert!(report.all_succeeded());
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "peak concurrency: {}",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn every_signal_gets_exactly_one_terminal_entry() {
    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("good", |_| async { Ok(()) }));
    signals.add(SignalDescriptor::new("bad", |_| async {
        Err("connection refused".into())
    }));

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    assert_eq!(report.signals.len(), 2);
    assert_eq!(report.find("good").unwrap().status(), SignalStatus::Succeeded);
    let bad = report.find("bad").unwrap();
    assert_eq!(bad.status(), SignalStatus::Failed);
    assert_eq!(
        bad.failure().unwrap().to_string(),
        "connection refused"
    );
    assert_eq!(coordinator.state(), CoordinatorState::Failed);
    assert_eq!(report.health(), HealthStatus::Unhealthy);
}

#[tokio::test]
async fn panicking_signals_are_captured_as_failures() {
    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("boomer", |_| async {
        panic!("startup bug")
    }));
    signals.add(SignalDescriptor::new("steady", |_| async { Ok(()) }));

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    let boomer = report.find("boomer").unwrap();
    assert_eq!(boomer.status(), SignalStatus::Failed);
    assert!(boomer.failure().unwrap().to_string().contains("startup bug"));
    assert_eq!(report.find("steady").unwrap().status(), SignalStatus::Succeeded);
}
