//! Posting laws: FIFO ordering per poster thread, and `schedule`'s equivalence to a no-state
//! `post`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loopworker::collaborators::test_support::{EmptyConnectionRegistry, RecordingApplicationLifetime};
use loopworker::{Collaborators, SimpleReactor, Worker, WorkerConfig};

fn start_worker() -> Arc<Worker> {
    let collaborators = Collaborators::new(
        Arc::new(EmptyConnectionRegistry),
        Arc::new(RecordingApplicationLifetime::default()),
    );
    let (worker, start_rx) =
        Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), collaborators);
    start_rx.recv().expect("sender dropped").expect("init failed");
    worker
}

#[test]
fn posts_from_one_thread_run_in_fifo_order() {
    let worker = start_worker();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut last_rx = None;
    for i in 0..200 {
        let order = Arc::clone(&order);
        last_rx = Some(worker.post_async(move |_worker| {
            order.lock().expect("poisoned").push(i);
        }));
    }
    last_rx
        .expect("at least one item posted")
        .recv()
        .expect("sender dropped")
        .expect("work item failed");

    let recorded = order.lock().expect("poisoned").clone();
    let expected: Vec<usize> = (0..200).collect();
    assert_eq!(recorded, expected);

    worker.stop(Duration::from_secs(3)).expect("stop failed");
}

#[test]
fn schedule_is_equivalent_to_post_ignoring_the_worker_argument() {
    let worker = start_worker();
    let counter = Arc::new(AtomicUsize::new(0));

    let counter2 = Arc::clone(&counter);
    worker.schedule(move || {
        counter2.fetch_add(1, Ordering::SeqCst);
    });

    let rx = worker.post_async(|_worker| {});
    rx.recv().expect("sender dropped").expect("marker failed");

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    worker.stop(Duration::from_secs(3)).expect("stop failed");
}
