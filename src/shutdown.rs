//! The shutdown controller (§4.F): orchestrates the three-stage escalating termination
//! protocol. Implemented as an extension `impl` on [`Worker`] rather than a separate type, since
//! every stage needs direct access to the worker's queues, notifier, and heartbeat -- splitting
//! it out would just mean re-exposing all of that through another seam.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::worker::Worker;

impl Worker {
    /// Requests an orderly shutdown, escalating through AllowStop, OnStopRude, and OnStopImmediate
    /// if the worker does not join within `timeout / 3` at each stage. Returns the worker's
    /// captured fatal error, if any, once it has joined or every stage has timed out.
    pub fn stop(self: &Arc<Worker>, timeout: Duration) -> Result<()> {
        // Step 1: the thread never ran -- nothing to do.
        if !self.init_completed() {
            return Ok(());
        }

        // Serializes concurrent `stop()` callers on the one join token, matching the
        // start-barrier's role of serializing init with the first shutdown attempt.
        let join_rx = self.join_rx().lock().expect("join mutex poisoned");

        let mut joined = match join_rx.try_recv() {
            Ok(()) => true,
            Err(mpsc::TryRecvError::Disconnected) => true,
            Err(mpsc::TryRecvError::Empty) => false,
        };

        if !joined {
            self.drain_connections();

            let stage_timeout = timeout / 3;

            self.stage_allow_stop();
            joined = Self::wait_for_join(&join_rx, stage_timeout);

            if !joined {
                self.stage_on_stop_rude();
                joined = Self::wait_for_join(&join_rx, stage_timeout);
            }

            if !joined {
                self.stage_on_stop_immediate();
                joined = Self::wait_for_join(&join_rx, stage_timeout);
                if !joined {
                    self.collaborators().logger.log_critical(
                        "loop worker did not join within the immediate-stop stage timeout",
                    );
                }
            }
        }

        drop(join_rx);

        match self.fatal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Step 3: ask the connection registry to close everything gracefully, falling back to a
    /// forced abort, logging either shortfall.
    fn drain_connections(&self) {
        let registry = &self.collaborators().connection_registry;
        if !registry.close_all(self.config().shutdown_timeout) {
            self.collaborators()
                .logger
                .not_all_connections_closed_gracefully(registry.len());
            if !registry.abort_all(self.config().connection_abort_timeout) {
                self.collaborators()
                    .logger
                    .not_all_connections_aborted(registry.len());
            }
        }
    }

    /// Stage 1: stop and close the heartbeat timer, then close the notifier -- the two handles
    /// that would otherwise keep `run()` alive forever. Posted cooperatively: it only runs once
    /// the worker thread returns to drain the post queue, which is exactly the graceful case.
    ///
    /// `SimpleReactor` has no separate ref/unref distinction the way a production libuv binding
    /// would; closing these two handles outright is this reactor's equivalent of "unreference" --
    /// see `DESIGN.md`.
    fn stage_allow_stop(&self) {
        self.post(|worker| {
            if let Some(heartbeat) = worker.take_heartbeat() {
                heartbeat.close(worker.reactor());
            }
            if let Some(notifier) = worker.notifier() {
                notifier.close();
            }
        });
    }

    /// Stage 2: give up on any `postAsync` futures still waiting (§5/§9's resolved open
    /// question) and post a best-effort instruction to close every remaining reactor handle.
    /// Abandoning the queue happens directly from this (the shutdown caller's) thread rather
    /// than through a post, since a worker stuck running an uncooperative work item would never
    /// get around to running a posted closure either.
    fn stage_on_stop_rude(&self) {
        self.post_queue().abandon_pending();
        self.post(|worker| {
            let mut ids = Vec::new();
            worker.reactor().walk(&mut |id, _kind| ids.push(id));
            for id in ids {
                worker.reactor().close(id);
            }
        });
    }

    /// Stage 3: the only stage not posted -- `stop_immediate` and `EventLoop::stop` are both
    /// reachable directly from any thread, which is what makes this stage able to interrupt a
    /// worker stuck in an uncooperative work item.
    fn stage_on_stop_immediate(&self) {
        self.post_queue().abandon_pending();
        self.set_stop_immediate();
        self.reactor().stop();
    }

    fn wait_for_join(join_rx: &mpsc::Receiver<()>, timeout: Duration) -> bool {
        match join_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
            Err(mpsc::RecvTimeoutError::Disconnected) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering as StdOrdering};
    use std::time::Duration;

    use super::*;
    use crate::collaborators::test_support::{EmptyConnectionRegistry, RecordingApplicationLifetime};
    use crate::config::WorkerConfig;
    use crate::reactor::SimpleReactor;

    fn test_collaborators() -> crate::worker::Collaborators {
        crate::worker::Collaborators::new(
            Arc::new(EmptyConnectionRegistry),
            Arc::new(RecordingApplicationLifetime::default()),
        )
    }

    #[test]
    fn stop_on_uninitialized_worker_is_a_prompt_no_op() {
        // `start` always completes init almost instantly against `SimpleReactor`, so to exercise
        // "never ran" we call `stop` before the init future has necessarily been observed -- the
        // start-barrier mutex still makes this race-free: either init has not run yet (we return
        // immediately) or it has (we fall through to the ordinary path), never a torn state.
        let (worker, _start_rx) =
            Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), test_collaborators());
        let result = worker.stop(Duration::from_millis(0));
        assert!(result.is_ok());
    }

    #[test]
    fn cooperative_stop_joins_within_stage_one() {
        let (worker, start_rx) = Worker::start(
            WorkerConfig {
                max_loops: 2,
                ..WorkerConfig::default()
            },
            Arc::new(SimpleReactor::new()),
            test_collaborators(),
        );
        start_rx.recv().expect("sender dropped").expect("init failed");

        worker.post(|_worker| std::thread::sleep(Duration::from_millis(5)));

        let result = worker.stop(Duration::from_millis(300));
        assert!(result.is_ok());
        assert!(worker.fatal_error().is_none());
    }

    #[test]
    fn rude_stop_abandons_pending_async_posts() {
        let (worker, start_rx) =
            Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), test_collaborators());
        start_rx.recv().expect("sender dropped").expect("init failed");

        // Busy-loop work item that never yields back to the drain loop, forcing escalation.
        worker.post(|_worker| loop {
            std::hint::spin_loop();
            if STOP_FLAG.load(StdOrdering::SeqCst) {
                break;
            }
        });

        let rx = worker.post_async(|_worker| {});
        let result = worker.stop(Duration::from_millis(150));
        STOP_FLAG.store(true, StdOrdering::SeqCst);

        assert!(result.is_ok());
        match rx.recv().expect("sender dropped") {
            Err(Error::StoppedBeforeExecution) => {}
            other => panic!("expected Err(Error::StoppedBeforeExecution), got {other:?}"),
        }
    }

    static STOP_FLAG: AtomicBool = AtomicBool::new(false);
}
