//! The async notifier (§4.D): the one thread-safe wake path into the loop. Any thread that posts
//! or closes a handle calls [`AsyncNotifier::signal`] afterwards so the worker thread's `run`
//! wakes up and drains the queues it just touched.
//!
//! Detecting "the notifier's handle is already gone" by race or by catching whatever the native
//! binding throws is fragile, so this uses an explicit state machine instead: an `AtomicU8` moves
//! `Live -> Closing -> Closed` and `signal` simply no-ops once it reads anything past `Live`, the
//! same shape [`crate::non_blocking_thread`]'s flag uses for a simpler two-state version of the
//! same idea.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::reactor::{EventLoop, HandleId};

const LIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Thread-safe handle to the loop's async-wake primitive.
///
/// Cloning is cheap (an `Arc` clone); every clone shares the same underlying reactor handle and
/// lifecycle state.
#[derive(Debug, Clone)]
pub struct AsyncNotifier {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    reactor: Arc<dyn EventLoop>,
    handle_id: HandleId,
    state: AtomicU8,
}

impl AsyncNotifier {
    /// Registers a new async handle on `reactor` bound to `on_wake`, which the worker thread runs
    /// every time [`AsyncNotifier::signal`] is called from elsewhere.
    pub(crate) fn new(reactor: Arc<dyn EventLoop>, on_wake: Box<dyn Fn() + Send + Sync>) -> Self {
        let handle_id = reactor.init_async(on_wake);
        Self {
            inner: Arc::new(Inner {
                reactor,
                handle_id,
                state: AtomicU8::new(LIVE),
            }),
        }
    }

    /// Wakes the loop. A no-op once [`AsyncNotifier::begin_close`] has been called -- there is no
    /// error to report, since a caller racing a shutdown in progress has nothing useful to do
    /// with one.
    pub fn signal(&self) {
        if self.inner.state.load(Ordering::Acquire) == LIVE {
            self.inner.reactor.signal(self.inner.handle_id);
        }
    }

    /// Worker-thread-only: marks the notifier as closing so further `signal` calls from other
    /// threads become no-ops, then closes the underlying reactor handle. Idempotent.
    pub(crate) fn close(&self) {
        if self
            .inner
            .state
            .compare_exchange(LIVE, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.inner.reactor.close(self.inner.handle_id);
        self.inner.state.store(CLOSED, Ordering::Release);
    }

    /// The reactor handle id backing this notifier, for `walk`-based bookkeeping.
    pub(crate) fn handle_id(&self) -> HandleId {
        self.inner.handle_id
    }
}
