//! The post queue (§4.B): the one cross-thread entry point into the worker. `post` fires and
//! forgets; `post_async` hands back a completion signal via the `oneshot` crate so a caller can
//! either `.await` it or block on it with `recv`/`recv_timeout`, without this crate needing to
//! depend on any particular async runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::Error;
use crate::queue::DoubleBuffer;
use crate::worker::Worker;

/// A unit of work queued by `post`/`post_async`. Not constructible outside this module --
/// producers go through [`PostQueue::post`]/[`PostQueue::post_async`].
///
/// §9 settles on boxed closures taking a `&Worker` reference rather than the polymorphic
/// callback/state/adapter-thunk triple the distilled design describes -- that split is an
/// artifact of a value/reference calling convention this crate does not have.
pub struct WorkItem {
    action: Box<dyn FnOnce(&Worker) + Send>,
    completion: Option<oneshot::Sender<crate::error::Result<()>>>,
}

/// Outcome of one drain pass, fed back into the worker's drain-loop accounting (§4.B's
/// `max_loops` alternation) and fatal-error latch.
pub(crate) struct DrainOutcome {
    pub(crate) did_work: bool,
    pub(crate) fatal: Option<Error>,
}

/// The cross-thread work queue. Producers call `post`/`post_async` from any thread; the worker
/// thread alone calls `drain_once`.
#[derive(Debug, Default)]
pub struct PostQueue {
    buffer: DoubleBuffer<WorkItem>,
}

impl PostQueue {
    /// Queues `action` to run on the worker thread with a reference to the [`Worker`]. No
    /// completion signal: if `action` panics, the panic becomes the worker's fatal error (§4.B's
    /// "log and propagate as fatal" policy for items with no one else to tell).
    pub fn post(&self, action: impl FnOnce(&Worker) + Send + 'static) {
        self.buffer.push(WorkItem {
            action: Box::new(action),
            completion: None,
        });
    }

    /// Queues `action` to run on the worker thread and returns a receiver that completes once it
    /// has. A panic inside `action` is delivered to the receiver as
    /// [`Error::Fatal`][enum@Error] rather than taking down the worker -- the caller asked to be
    /// told, so they are.
    pub fn post_async(
        &self,
        action: impl FnOnce(&Worker) + Send + 'static,
    ) -> oneshot::Receiver<crate::error::Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.buffer.push(WorkItem {
            action: Box::new(action),
            completion: Some(tx),
        });
        rx
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Runs everything currently queued, returning whether any item ran and the first fatal error
    /// encountered among items with no completion to report it to.
    pub(crate) fn drain_once(&self, worker: &Worker) -> DrainOutcome {
        let items = self.buffer.swap();
        let mut did_work = false;
        let mut fatal = None;

        for item in items {
            did_work = true;
            let action = item.action;
            match panic::catch_unwind(AssertUnwindSafe(|| action(worker))) {
                Ok(()) => {
                    if let Some(tx) = item.completion {
                        let _ = tx.send(Ok(()));
                    }
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    if let Some(tx) = item.completion {
                        let _ = tx.send(Err(Error::Fatal(message)));
                    } else if fatal.is_none() {
                        fatal = Some(Error::Fatal(message));
                    }
                }
            }
        }

        DrainOutcome { did_work, fatal }
    }

    /// Completes every item still pending with [`Error::StoppedBeforeExecution`] without running
    /// it. Used by the rude and immediate shutdown stages (§4.F, §9's resolution of the
    /// postAsync-on-shutdown open question): a caller waiting on a future gets told it will never
    /// run, instead of waiting forever.
    pub(crate) fn abandon_pending(&self) {
        let items = self.buffer.swap();
        for item in items {
            if let Some(tx) = item.completion {
                let _ = tx.send(Err(Error::StoppedBeforeExecution));
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "work item panicked with a non-string payload".to_string()
    }
}
