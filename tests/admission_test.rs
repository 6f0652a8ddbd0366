//! Integration tests for the admission-controlled queues.
//!
//! These validate the gate's externally observable guarantees:
//! - concurrency never exceeds the configured limit
//! - FIFO dispatch by arrival order
//! - deterministic saturation: reject past the wait room, thunk uninvoked
//! - failure isolation between tasks
//! - independent limits per resource class
//! - no cancellation on handle drop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fileforge_gate::core::{AdmissionQueue, GateError, JobGate, QueueLimits, MEDIA_CLASS};
use fileforge_gate::config::GateConfig;
use fileforge_gate::runtime::TokioSpawner;
use tokio::sync::Semaphore;

fn queue(concurrency: usize, max_waiting: usize) -> AdmissionQueue<TokioSpawner> {
    AdmissionQueue::new(
        "test",
        QueueLimits {
            concurrency,
            max_waiting,
        },
        TokioSpawner::current(),
    )
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let q = queue(3, 32);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let handle = q
            .submit(move || async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .expect("all 12 fit within concurrency + wait room");
        handles.push(handle);
    }

    let results = futures::future::join_all(handles).await;
    assert!(results.iter().all(Result::is_ok));
    assert!(peak.load(Ordering::SeqCst) <= 3, "peak concurrency exceeded");
    assert_eq!(current.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tasks_dispatch_in_fifo_order() {
    let q = queue(1, 8);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let order = Arc::clone(&order);
        handles.push(
            q.submit(move || async move {
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, anyhow::Error>(())
            })
            .expect("admitted"),
        );
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn saturation_rejects_fourth_submission() {
    // The production scenario: concurrency 2, wait room 1, four
    // back-to-back submissions. First two run, third queues, fourth is
    // rejected without its thunk ever being invoked.
    let q = queue(2, 1);
    let gate = Arc::new(Semaphore::new(0));
    let invoked = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        let invoked = Arc::clone(&invoked);
        handles.push(
            q.submit(move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire_owned().await?;
                Ok::<_, anyhow::Error>(())
            })
            .expect("first three submissions are admitted"),
        );
    }

    let depth = q.depth();
    assert_eq!(depth.running, 2);
    assert_eq!(depth.waiting, 1);

    let invoked_by_rejected = Arc::clone(&invoked);
    let rejected = q.submit(move || async move {
        invoked_by_rejected.fetch_add(1, Ordering::SeqCst);
        Ok::<_, anyhow::Error>(())
    });
    match rejected {
        Err(GateError::QueueSaturated { class, waiting }) => {
            assert_eq!(class, "test");
            assert_eq!(waiting, 1);
        }
        other => panic!("expected QueueSaturated, got {other:?}"),
    }
    assert_eq!(
        q.depth().waiting,
        1,
        "a rejected call must not change the wait queue"
    );

    gate.add_permits(3);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(
        invoked.load(Ordering::SeqCst),
        3,
        "the rejected thunk must never run"
    );

    let stats = q.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.completed, 3);
}

#[tokio::test]
async fn failing_thunk_settles_only_its_own_handle() {
    let q = queue(2, 4);

    let ok = q
        .submit(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, anyhow::Error>("fine")
        })
        .unwrap();
    let bad = q
        .submit(|| async { Err::<&str, _>(anyhow::anyhow!("boom")) })
        .unwrap();

    let err = bad.await.expect_err("failure propagates to its own handle");
    assert!(matches!(err, GateError::Task(_)));
    assert_eq!(err.to_string(), "boom");

    assert_eq!(ok.await.unwrap(), "fine");

    let stats = q.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn queues_for_different_classes_are_independent() {
    let media = queue(1, 1);
    let render = queue(1, 1);
    let gate = Arc::new(Semaphore::new(0));

    // Fill media completely: one running, one waiting.
    let mut media_handles = Vec::new();
    for _ in 0..2 {
        let gate = Arc::clone(&gate);
        media_handles.push(
            media
                .submit(move || async move {
                    let _permit = gate.acquire_owned().await?;
                    Ok::<_, anyhow::Error>(())
                })
                .unwrap(),
        );
    }
    assert!(media
        .submit(|| async { Ok::<_, anyhow::Error>(()) })
        .is_err());

    // The render queue is unaffected by media saturation.
    let render_handle = render
        .submit(|| async { Ok::<_, anyhow::Error>("rendered") })
        .expect("render queue has its own budget");
    assert_eq!(render_handle.await.unwrap(), "rendered");

    gate.add_permits(2);
    for handle in media_handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn dropping_the_handle_does_not_cancel_the_thunk() {
    let q = queue(1, 4);
    let ran = Arc::new(AtomicUsize::new(0));

    let ran_in_thunk = Arc::clone(&ran);
    let handle = q
        .submit(move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ran_in_thunk.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    drop(handle);

    // Follow up with a second task on the same single-slot queue; it can
    // only run after the first fully settled.
    let follower = q
        .submit(|| async { Ok::<_, anyhow::Error>(()) })
        .unwrap();
    follower.await.unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn job_gate_routes_by_class_and_reports_depths() {
    let gate = JobGate::from_config(&GateConfig::default()).unwrap();

    let handle = gate
        .submit(MEDIA_CLASS, || async { Ok::<_, anyhow::Error>(7) })
        .unwrap();
    assert_eq!(handle.await.unwrap(), 7);

    let err = gate
        .submit("no-such-class", || async { Ok::<_, anyhow::Error>(()) })
        .expect_err("unknown class");
    assert_eq!(err.http_status(), 404);

    let depths = gate.depths();
    assert!(depths.contains_key(MEDIA_CLASS));

    let monitor = gate.spawn_monitor(Duration::from_secs(3600));
    monitor.abort();
}

#[tokio::test]
async fn saturation_error_carries_retry_signal() {
    let q = queue(1, 1);
    let gate = Arc::new(Semaphore::new(0));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let gate = Arc::clone(&gate);
        handles.push(
            q.submit(move || async move {
                let _permit = gate.acquire_owned().await?;
                Ok::<_, anyhow::Error>(())
            })
            .unwrap(),
        );
    }

    let err = q
        .submit(|| async { Ok::<_, anyhow::Error>(()) })
        .expect_err("saturated");
    assert_eq!(err.http_status(), 503);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("server busy"));

    gate.add_permits(2);
    for handle in handles {
        handle.await.unwrap();
    }
}
