//! End-to-end shutdown scenarios, mirroring the literal-value scenarios in the design notes:
//! cooperative stop, rude stop, and fatal-error propagation through `stop()`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loopworker::collaborators::test_support::{EmptyConnectionRegistry, RecordingApplicationLifetime};
use loopworker::{Collaborators, Error, SimpleReactor, Worker, WorkerConfig};

fn start_worker(config: WorkerConfig) -> Arc<Worker> {
    let collaborators = Collaborators::new(
        Arc::new(EmptyConnectionRegistry),
        Arc::new(RecordingApplicationLifetime::default()),
    );
    let (worker, start_rx) = Worker::start(config, Arc::new(SimpleReactor::new()), collaborators);
    start_rx.recv().expect("sender dropped").expect("init failed");
    worker
}

#[test]
fn stop_on_uninitialized_handle_is_prompt() {
    let worker = start_worker(WorkerConfig::default());
    let started = std::time::Instant::now();
    worker.stop(Duration::from_millis(0)).expect("stop failed");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn cooperative_stop_succeeds_quickly_with_short_work() {
    let worker = start_worker(WorkerConfig {
        max_loops: 2,
        ..WorkerConfig::default()
    });

    worker.post(|_worker| std::thread::sleep(Duration::from_millis(5)));

    let started = std::time::Instant::now();
    let result = worker.stop(Duration::from_millis(300));
    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(worker.fatal_error().is_none());
}

#[test]
fn rude_stop_escalates_through_all_stages_without_panicking_the_caller() {
    static LOOP_SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
    LOOP_SHOULD_EXIT.store(false, Ordering::SeqCst);

    let worker = start_worker(WorkerConfig::default());

    worker.post(|_worker| {
        while !LOOP_SHOULD_EXIT.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }
    });

    let result = worker.stop(Duration::from_millis(150));
    assert!(result.is_ok(), "rude stop must return without throwing");

    LOOP_SHOULD_EXIT.store(true, Ordering::SeqCst);
}

#[test]
fn fatal_error_from_a_bare_post_panic_is_reraised_by_stop() {
    // Makes the critical-level log this scenario triggers visible under `cargo test -- --nocapture`.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let worker = start_worker(WorkerConfig::default());

    worker.post(|_worker| panic!("unsignaled failure"));
    std::thread::sleep(Duration::from_millis(50));

    let result = worker.stop(Duration::from_secs(1));
    match result {
        Err(Error::Fatal(message)) => assert!(message.contains("unsignaled failure")),
        other => panic!("expected Err(Error::Fatal), got {other:?}"),
    }
}

#[test]
fn happy_path_drain_runs_every_posted_item_exactly_once() {
    let worker = start_worker(WorkerConfig::default());

    let counter = Arc::new(AtomicUsize::new(0));
    let mut last_rx = None;
    for _ in 0..1000 {
        let counter = Arc::clone(&counter);
        last_rx = Some(worker.post_async(move |_worker| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    last_rx
        .expect("at least one item posted")
        .recv()
        .expect("sender dropped")
        .expect("work item failed");

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert!(worker.fatal_error().is_none());
    worker.stop(Duration::from_secs(3)).expect("stop failed");
}

#[test]
fn cross_thread_posts_all_run_with_no_deadlock() {
    const THREADS: usize = 32;
    const POSTS_PER_THREAD: usize = 10_000;

    let worker = start_worker(WorkerConfig::default());
    let counter = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let worker = Arc::clone(&worker);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                for _ in 0..POSTS_PER_THREAD {
                    let counter = Arc::clone(&counter);
                    worker.post(move |_worker| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("poster thread panicked");
    }

    // Drain a final marker item and wait for it, to know every prior post has had a chance to run
    // (FIFO within each poster's own posts, drained in full passes by the worker).
    let marker = worker.post_async(|_worker| {});
    marker.recv().expect("sender dropped").expect("marker failed");

    assert_eq!(counter.load(Ordering::SeqCst), THREADS * POSTS_PER_THREAD);
    assert!(worker.fatal_error().is_none());
    worker.stop(Duration::from_secs(5)).expect("stop failed");
}
