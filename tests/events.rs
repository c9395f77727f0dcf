use std::sync::{Arc, Mutex};
use std::time::Duration;

use liftoff::{
    CancellationReason, CancellationScope, CollectingMetrics, CoordinatorOptions,
    CoordinatorState, ExecutionMode, FailurePolicy, SignalCollection, SignalDescriptor,
    SignalStatus, StartupObserver,
};

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
}

impl Recording {
    fn take(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl StartupObserver for Recording {
    fn signal_started(&self, name: &str, _started_at: Duration) {
        self.events.lock().unwrap().push(format!("started:{name}"));
    }

    fn signal_completed(&self, name: &str, status: SignalStatus, _duration: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("completed:{name}:{status}"));
    }

    fn global_timeout_fired(&self, _at: Duration) {
        self.events.lock().unwrap().push("global-timeout".into());
    }

    fn coordinator_completed(&self, state: CoordinatorState, _total: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("coordinator:{state}"));
    }
}

#[tokio::test]
async fn started_precedes_completed_and_coordinator_fires_last() {
    let recording = Arc::new(Recording::default());

    let mut signals = SignalCollection::new();
    for name in ["a", "b", "c"] {
        signals.add(SignalDescriptor::new(name, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        }));
    }
    signals.observe_shared(recording.clone());

    let coordinator = signals.build().unwrap();
    coordinator.wait_all().await.unwrap();

    let events = recording.take();

    // One started/completed pair per signal, ordered within each signal.
    for name in ["a", "b", "c"] {
        let started = events
            .iter()
            .position(|e| e == &format!("started:{name}"))
            .expect("started event");
        let completed = events
            .iter()
            .position(|e| e == &format!("completed:{name}:succeeded"))
            .expect("completed event");
        assert!(started < completed, "events: {events:?}");
    }

    // The coordinator event is last and fires exactly once.
    assert_eq!(events.last().unwrap(), "coordinator:completed");
    assert_eq!(
        events.iter().filter(|e| e.starts_with("coordinator:")).count(),
        1
    );
}

#[tokio::test]
async fn skipped_signals_emit_no_events() {
    let recording = Arc::new(Recording::default());

    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("bad", |_| async { Err("x".into()) }));
    signals.add(SignalDescriptor::new("never", |_| async { Ok(()) }));
    signals
        .with_options(
            CoordinatorOptions::default()
                .with_execution_mode(ExecutionMode::Sequential)
                .with_policy(FailurePolicy::FailFast),
        )
        .observe_shared(recording.clone());

    let coordinator = signals.build().unwrap();
    let _ = coordinator.wait_all().await;

    let events = recording.take();
    assert!(
        !events.iter().any(|e| e.contains("never")),
        "skipped signal leaked events: {events:?}"
    );
    assert!(events.contains(&"completed:bad:failed".to_string()));
}

#[tokio::test]
async fn global_timeout_event_fires_between_signal_events() {
    let recording = Arc::new(Recording::default());

    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("slow", |_| async {
        tokio::time::sleep(Duration::from_millis(120)).await;
        Ok(())
    }));
    signals
        .with_options(CoordinatorOptions::default().with_global_timeout(Duration::from_millis(40)))
        .observe_shared(recording.clone());

    let coordinator = signals.build().unwrap();
    coordinator.wait_all().await.unwrap();

    let events = recording.take();
    let timeout_at = events.iter().position(|e| e == "global-timeout").unwrap();
    let completed_at = events
        .iter()
        .position(|e| e == "completed:slow:succeeded")
        .unwrap();
    assert!(timeout_at < completed_at, "events: {events:?}");
}

#[tokio::test]
async fn a_panicking_observer_does_not_break_the_run() {
    struct Faulty;

    impl StartupObserver for Faulty {
        fn signal_started(&self, _name: &str, _started_at: Duration) {
            panic!("observer bug")
        }
    }

    let recording = Arc::new(Recording::default());

    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("a", |_| async { Ok(()) }));
    signals.observe(Faulty).observe_shared(recording.clone());

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    assert!(report.all_succeeded());
    assert!(recording.take().contains(&"completed:a:succeeded".to_string()));
}

#[tokio::test]
async fn metrics_sink_receives_durations_statuses_and_total() {
    let metrics = Arc::new(CollectingMetrics::new());

    let mut signals = SignalCollection::new();
    signals.add(SignalDescriptor::new("good", |_| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }));
    signals.add(SignalDescriptor::new("bad", |_| async { Err("x".into()) }));
    signals.with_shared_metrics(metrics.clone());

    let coordinator = signals.build().unwrap();
    coordinator.wait_all().await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(
        snapshot.signal_statuses.get("good"),
        Some(&SignalStatus::Succeeded)
    );
    assert_eq!(
        snapshot.signal_statuses.get("bad"),
        Some(&SignalStatus::Failed)
    );
    assert!(snapshot.signal_durations.get("good").unwrap() >= &Duration::from_millis(15));
    assert!(snapshot.total_duration.is_some());
}

#[tokio::test]
async fn signals_started_after_scope_cancellation_are_observed_cancelled() {
    let scope = CancellationScope::root("backends");

    let mut signals = SignalCollection::new();
    signals.add(
        SignalDescriptor::new("trigger", |_| async { Err("dead upstream".into()) })
            .in_scope(&scope)
            .cancel_scope_on_failure(),
    );
    signals.add(SignalDescriptor::new("follower", |_| async { Ok(()) }).in_scope(&scope));
    signals
        .with_options(CoordinatorOptions::default().with_execution_mode(ExecutionMode::Sequential));

    let coordinator = signals.build().unwrap();
    let report = coordinator.wait_all().await.unwrap();

    assert_eq!(report.find("trigger").unwrap().status(), SignalStatus::Failed);

    let follower = report.find("follower").unwrap();
    assert_eq!(follower.status(), SignalStatus::Cancelled);
    let (reason, trigger) = follower.cancellation().unwrap();
    assert_eq!(reason, CancellationReason::SignalFailure);
    assert_eq!(trigger, Some("trigger"));
    // Its wait operation never ran.
    assert!(follower.started_at.is_none());
}
