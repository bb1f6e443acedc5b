//! The close-handle queue (§4.C): a second double-buffered queue, separate from the post queue so
//! that closing reactor handles (the one operation §3 says must happen on the worker thread, for
//! every handle, without exception) never competes with ordinary posted work for drain slots.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::Error;
use crate::queue::DoubleBuffer;
use crate::reactor::HandleId;

/// A queued close: the handle being closed (kept for diagnostics) and the action that performs
/// the close, typically `move || reactor.close(handle)` plus any user-supplied close callback.
pub struct CloseItem {
    pub handle_id: HandleId,
    action: Box<dyn FnOnce() + Send>,
}

pub(crate) struct DrainOutcome {
    pub(crate) did_work: bool,
    pub(crate) fatal: Option<Error>,
}

/// The close-handle queue. Unlike [`crate::queue::PostQueue`], close items never carry a
/// completion signal -- closing a handle is not something any caller awaits -- so every panic
/// here is unconditionally fatal (§4.C's "always log and re-raise" policy).
#[derive(Debug, Default)]
pub struct CloseQueue {
    buffer: DoubleBuffer<CloseItem>,
}

impl CloseQueue {
    /// Queues `action` to close `handle_id` on the worker thread.
    pub fn push(&self, handle_id: HandleId, action: impl FnOnce() + Send + 'static) {
        self.buffer.push(CloseItem {
            handle_id,
            action: Box::new(action),
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Runs every queued close, returning whether any ran and the first panic encountered,
    /// converted to a fatal error.
    pub(crate) fn drain_once(&self) -> DrainOutcome {
        let items = self.buffer.swap();
        let mut did_work = false;
        let mut fatal = None;

        for item in items {
            did_work = true;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(item.action)) {
                if fatal.is_none() {
                    fatal = Some(Error::Fatal(panic_message(item.handle_id, payload)));
                }
            }
        }

        DrainOutcome { did_work, fatal }
    }
}

fn panic_message(handle_id: HandleId, payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "close item panicked with a non-string payload".to_string()
    };
    format!("closing handle {handle_id}: {detail}")
}
