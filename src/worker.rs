//! The loop worker thread (§4.A): owns the reactor, runs it to completion, and performs the
//! init/teardown phases around it. This is the central type the rest of the crate is built
//! around -- queues, notifier, and heartbeat are all private collaborators wired together here.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::collaborators::{ApplicationLifetime, ConnectionRegistry, Disposable, Logger, TracingLogger};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::heartbeat::Heartbeat;
use crate::non_blocking_thread;
use crate::notifier::AsyncNotifier;
use crate::queue::{CloseQueue, PostQueue};
use crate::reactor::EventLoop;

static_assertions::assert_impl_all!(Worker: Send, Sync);

/// External collaborators a [`Worker`] is built against (§6's "consumed from collaborators"
/// list, minus the native I/O library itself which is supplied as the `reactor` argument to
/// [`Worker::start`]).
pub struct Collaborators {
    /// Sink for the diagnostic events in §7. Defaults to [`TracingLogger`] via
    /// [`Collaborators::new`].
    pub logger: Arc<dyn Logger>,
    /// Owns connection lifecycle; ticked by the heartbeat and drained during shutdown. Retrieved
    /// back out via [`Worker::connection_manager`].
    pub connection_registry: Arc<dyn ConnectionRegistry>,
    /// The buffer-pool factory (§3/§6's `pipeFactory`), disposed once during teardown. Retrieved
    /// back out via [`Worker::pipe_factory`].
    pub pipe_factory: Option<Arc<dyn Disposable>>,
    /// The write-request pool (§3/§6's `writeReqPool`), disposed once during teardown. Retrieved
    /// back out via [`Worker::write_req_pool`].
    pub write_req_pool: Option<Arc<dyn Disposable>>,
    /// Notified if the worker captures a fatal error, so a single misbehaving loop does not fail
    /// silently.
    pub application_lifetime: Arc<dyn ApplicationLifetime>,
}

impl Collaborators {
    /// Builds a `Collaborators` with the default [`TracingLogger`] and no pool collaborators --
    /// the two collaborators every deployment must supply either way. Set
    /// [`Collaborators::pipe_factory`]/[`Collaborators::write_req_pool`] afterwards if the
    /// deployment has pools to dispose on shutdown.
    pub fn new(
        connection_registry: Arc<dyn ConnectionRegistry>,
        application_lifetime: Arc<dyn ApplicationLifetime>,
    ) -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            connection_registry,
            pipe_factory: None,
            write_req_pool: None,
            application_lifetime,
        }
    }
}

/// The top-level entity (§3's "Worker"). Construct one via [`Worker::start`]; it is always handed
/// back wrapped in an `Arc` since the worker thread, the notifier, and the heartbeat timer all
/// hold their own reference back into it.
pub struct Worker {
    reactor: Arc<dyn EventLoop>,
    post_queue: PostQueue,
    close_queue: CloseQueue,
    notifier: Mutex<Option<AsyncNotifier>>,
    heartbeat: Mutex<Option<Heartbeat>>,
    config: WorkerConfig,
    collaborators: Collaborators,
    /// The start-barrier mutex (§3): guards `initCompleted`, observed by both the init phase and
    /// the first shutdown attempt.
    init_completed: Mutex<bool>,
    stop_immediate: AtomicBool,
    fatal_error: Mutex<Option<Error>>,
    /// The join token. `Some` until the worker thread's unconditional final send; after that,
    /// `recv`/`try_recv` on it report the worker has exited. Never replaced, so a stale read
    /// simply means "already joined".
    join_rx: Mutex<mpsc::Receiver<()>>,
}

impl Worker {
    /// Spawns the worker thread and returns the `Worker` handle alongside a receiver that
    /// completes once the init phase finishes -- successfully, or with [`Error::Init`] if it
    /// panicked. Callers should await/receive this before calling [`Worker::post`] or
    /// [`Worker::post_async`]; posting before init completes risks the item sitting unsignaled
    /// until the next unrelated wake (see `DESIGN.md`).
    ///
    /// The spawned thread is a plain joinable `std::thread`; Rust does not block process exit on
    /// outstanding threads the way some runtimes do, so no extra "non-blocking for process exit"
    /// marking is needed here.
    pub fn start(
        config: WorkerConfig,
        reactor: Arc<dyn EventLoop>,
        collaborators: Collaborators,
    ) -> (Arc<Worker>, oneshot::Receiver<Result<()>>) {
        let (join_tx, join_rx) = mpsc::channel();

        let worker = Arc::new(Worker {
            reactor,
            post_queue: PostQueue::default(),
            close_queue: CloseQueue::default(),
            notifier: Mutex::new(None),
            heartbeat: Mutex::new(None),
            config,
            collaborators,
            init_completed: Mutex::new(false),
            stop_immediate: AtomicBool::new(false),
            fatal_error: Mutex::new(None),
            join_rx: Mutex::new(join_rx),
        });

        let (start_tx, start_rx) = oneshot::channel();
        let thread_worker = Arc::clone(&worker);
        thread::Builder::new()
            .name("loop-worker".to_string())
            .spawn(move || Self::run_on_worker_thread(thread_worker, start_tx, join_tx))
            .expect("failed to spawn loop worker thread");

        (worker, start_rx)
    }

    fn run_on_worker_thread(
        worker: Arc<Worker>,
        start_tx: oneshot::Sender<Result<()>>,
        join_tx: mpsc::Sender<()>,
    ) {
        non_blocking_thread::flag_current_thread();

        // Guarantees the join token fires on every exit path from this function, including the
        // early return below, without duplicating the send at each return site.
        let _join_signal = scopeguard::guard(join_tx, |join_tx| {
            let _ = join_tx.send(());
        });

        match panic::catch_unwind(AssertUnwindSafe(|| Self::init_phase(&worker))) {
            Ok(()) => {
                let _ = start_tx.send(Ok(()));
            }
            Err(payload) => {
                let _ = start_tx.send(Err(Error::Init(panic_message(payload))));
                return;
            }
        }

        worker.reactor.run();

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| Self::teardown_phase(&worker))) {
            if worker.capture_fatal(Error::Fatal(panic_message(payload))) {
                worker.collaborators.application_lifetime.stop_application();
            }
        }
    }

    fn init_phase(worker: &Arc<Worker>) {
        let mut init_completed = worker
            .init_completed
            .lock()
            .expect("start-barrier mutex poisoned");

        let wake_weak = Arc::downgrade(worker);
        let notifier = AsyncNotifier::new(
            Arc::clone(&worker.reactor),
            Box::new(move || {
                if let Some(worker) = wake_weak.upgrade() {
                    worker.on_notifier_wake();
                }
            }),
        );
        *worker.notifier.lock().expect("notifier mutex poisoned") = Some(notifier);

        let registry = Arc::clone(&worker.collaborators.connection_registry);
        let heartbeat = Heartbeat::start(&worker.reactor, registry, worker.config.heartbeat_interval);
        *worker.heartbeat.lock().expect("heartbeat mutex poisoned") = Some(heartbeat);

        *init_completed = true;
    }

    fn teardown_phase(worker: &Arc<Worker>) {
        if worker.stop_immediate.load(Ordering::SeqCst) {
            // §4.A: handles leak here, deliberately -- the immediate stage already told the
            // reactor to stop without waiting for anything to close cleanly.
            return;
        }

        let notifier = worker
            .notifier
            .lock()
            .expect("notifier mutex poisoned")
            .take();
        let heartbeat = worker
            .heartbeat
            .lock()
            .expect("heartbeat mutex poisoned")
            .take();

        if let Some(notifier) = notifier {
            let handle_id = notifier.handle_id();
            worker
                .close_queue
                .push(handle_id, move || notifier.close());
        }
        if let Some(heartbeat) = heartbeat {
            let handle_id = heartbeat.handle_id();
            let reactor = Arc::clone(&worker.reactor);
            worker
                .close_queue
                .push(handle_id, move || heartbeat.close(&reactor));
        }

        let outcome = worker.close_queue.drain_once();
        if let Some(err) = outcome.fatal {
            if worker.capture_fatal(err) {
                worker.collaborators.application_lifetime.stop_application();
            }
        }

        // One more turn so the reactor's own close bookkeeping settles before we dispose pools.
        worker.reactor.run();

        if let Some(pipe_factory) = &worker.collaborators.pipe_factory {
            pipe_factory.dispose();
        }
        if let Some(write_req_pool) = &worker.collaborators.write_req_pool {
            write_req_pool.dispose();
        }
    }

    /// The notifier's bound callback (§4.D): drains the post queue then the close queue, up to
    /// `config.max_loops` alternations (§4.B's drain algorithm), stopping early once a full
    /// alternation does no work.
    fn on_notifier_wake(&self) {
        let mut remaining = self.config.max_loops;
        loop {
            let post_outcome = self.post_queue.drain_once(self);
            if let Some(err) = post_outcome.fatal {
                if self.capture_fatal(err) {
                    self.collaborators.application_lifetime.stop_application();
                }
            }

            let close_outcome = self.close_queue.drain_once();
            if let Some(err) = close_outcome.fatal {
                if self.capture_fatal(err) {
                    self.collaborators.application_lifetime.stop_application();
                }
            }

            remaining -= 1;
            if !(post_outcome.did_work || close_outcome.did_work) || remaining == 0 {
                break;
            }
        }
    }

    /// Sets the one-shot fatal error latch if it is not already set, logging it as critical.
    /// Returns whether this call was the one that set it (callers use this to decide whether to
    /// notify the application lifetime exactly once).
    fn capture_fatal(&self, err: Error) -> bool {
        let mut slot = self.fatal_error.lock().expect("fatal error mutex poisoned");
        if slot.is_some() {
            return false;
        }
        self.collaborators.logger.log_critical(&err.to_string());
        *slot = Some(err);
        true
    }

    /// Queues `action` to run on the worker thread with a reference to this `Worker`, waking the
    /// loop afterwards. Callable from any thread.
    pub fn post(&self, action: impl FnOnce(&Worker) + Send + 'static) {
        self.post_queue.post(action);
        self.signal();
    }

    /// Like [`Worker::post`] but returns a receiver that completes once `action` has run (or
    /// with its panic converted to [`Error::Fatal`]).
    pub fn post_async(
        &self,
        action: impl FnOnce(&Worker) + Send + 'static,
    ) -> oneshot::Receiver<Result<()>> {
        let rx = self.post_queue.post_async(action);
        self.signal();
        rx
    }

    /// §4.B's `schedule`: a convenience adapter for generic-scheduler-interface callers,
    /// observationally equivalent to `post(|_| action())`.
    pub fn schedule(&self, action: impl FnOnce() + Send + 'static) {
        self.post(move |_worker| action());
    }

    fn signal(&self) {
        if let Some(notifier) = self.notifier.lock().expect("notifier mutex poisoned").as_ref() {
            notifier.signal();
        }
    }

    /// Thread-safe variant (§6 `queueCloseHandle`): enqueues a close request and wakes the loop.
    pub fn queue_close_handle(
        &self,
        handle_id: crate::reactor::HandleId,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.close_queue.push(handle_id, action);
        self.signal();
    }

    /// Worker-thread-only variant (§6 `queueCloseAsyncHandle`): enqueues without signaling, for
    /// use from inside a callback already running on the worker thread.
    pub fn queue_close_async_handle(
        &self,
        handle_id: crate::reactor::HandleId,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.close_queue.push(handle_id, action);
    }

    /// The captured fatal error, if any (§6 `fatalError` accessor).
    pub fn fatal_error(&self) -> Option<Error> {
        self.fatal_error
            .lock()
            .expect("fatal error mutex poisoned")
            .clone()
    }

    /// The `loop` accessor (§6): the native I/O library handle backing this worker. The
    /// collaborator promises to use it only from the worker thread, matching every other
    /// loop-owned handle's thread-confinement.
    pub fn reactor(&self) -> &Arc<dyn EventLoop> {
        &self.reactor
    }

    /// The `connectionManager` accessor (§6): the connection registry collaborator this worker
    /// was built with.
    pub fn connection_manager(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.collaborators.connection_registry
    }

    /// The `pipeFactory` accessor (§6): the buffer-pool factory collaborator, if one was
    /// supplied.
    pub fn pipe_factory(&self) -> Option<&Arc<dyn Disposable>> {
        self.collaborators.pipe_factory.as_ref()
    }

    /// The `writeReqPool` accessor (§6): the write-request pool collaborator, if one was
    /// supplied.
    pub fn write_req_pool(&self) -> Option<&Arc<dyn Disposable>> {
        self.collaborators.write_req_pool.as_ref()
    }

    pub(crate) fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub(crate) fn post_queue(&self) -> &PostQueue {
        &self.post_queue
    }

    pub(crate) fn init_completed(&self) -> bool {
        *self.init_completed.lock().expect("start-barrier mutex poisoned")
    }

    pub(crate) fn set_stop_immediate(&self) {
        self.stop_immediate.store(true, Ordering::SeqCst);
    }

    pub(crate) fn join_rx(&self) -> &Mutex<mpsc::Receiver<()>> {
        &self.join_rx
    }

    /// Takes the heartbeat out, if still present. Used by the shutdown controller's first stage
    /// to stop and close it exactly once.
    pub(crate) fn take_heartbeat(&self) -> Option<Heartbeat> {
        self.heartbeat.lock().expect("heartbeat mutex poisoned").take()
    }

    /// A clone of the current notifier handle, if any. Cloning is cheap (an `Arc` clone sharing
    /// the same underlying lifecycle state), so closing the clone closes it for every handle.
    pub(crate) fn notifier(&self) -> Option<AsyncNotifier> {
        self.notifier.lock().expect("notifier mutex poisoned").clone()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "loop worker phase panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::time::Duration;

    use super::*;
    use crate::collaborators::test_support::{
        EmptyConnectionRegistry, RecordingApplicationLifetime, RecordingDisposable,
    };
    use crate::reactor::SimpleReactor;

    fn test_collaborators() -> Collaborators {
        Collaborators::new(
            Arc::new(EmptyConnectionRegistry),
            Arc::new(RecordingApplicationLifetime::default()),
        )
    }

    #[test]
    fn start_resolves_init_future_and_post_runs_on_worker_thread() {
        let (worker, start_rx) =
            Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), test_collaborators());
        start_rx.recv().expect("sender dropped").expect("init failed");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        let rx = worker.post_async(move |_worker| {
            counter2.fetch_add(1, StdOrdering::SeqCst);
        });
        rx.recv().expect("sender dropped").expect("work item failed");

        assert_eq!(counter.load(StdOrdering::SeqCst), 1);
        assert!(worker.fatal_error().is_none());

        worker.stop(Duration::from_secs(3)).expect("stop failed");
    }

    #[test]
    fn bare_post_panic_becomes_fatal_and_notifies_application_lifetime() {
        let app_lifetime = Arc::new(RecordingApplicationLifetime::default());
        let collaborators = Collaborators::new(Arc::new(EmptyConnectionRegistry), Arc::clone(&app_lifetime) as Arc<dyn ApplicationLifetime>);
        let (worker, start_rx) =
            Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), collaborators);
        start_rx.recv().expect("sender dropped").expect("init failed");

        worker.post(|_worker| panic!("boom"));

        // Give the drain a moment to run on the worker thread.
        std::thread::sleep(Duration::from_millis(50));

        assert!(matches!(worker.fatal_error(), Some(Error::Fatal(_))));
        assert!(app_lifetime.was_stopped());

        let result = worker.stop(Duration::from_secs(3));
        assert!(matches!(result, Err(Error::Fatal(_))));
    }

    #[test]
    fn pool_collaborators_are_disposed_on_clean_teardown() {
        let pipe_factory = Arc::new(RecordingDisposable::default());
        let write_req_pool = Arc::new(RecordingDisposable::default());
        let mut collaborators = test_collaborators();
        collaborators.pipe_factory = Some(Arc::clone(&pipe_factory) as Arc<dyn Disposable>);
        collaborators.write_req_pool = Some(Arc::clone(&write_req_pool) as Arc<dyn Disposable>);

        let (worker, start_rx) =
            Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), collaborators);
        start_rx.recv().expect("sender dropped").expect("init failed");

        assert!(worker.pipe_factory().is_some());
        assert!(worker.write_req_pool().is_some());

        worker.stop(Duration::from_secs(3)).expect("stop failed");
        assert!(pipe_factory.was_disposed());
        assert!(write_req_pool.was_disposed());
    }
}
