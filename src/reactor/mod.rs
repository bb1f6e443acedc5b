//! The native I/O library abstraction (§4.G).
//!
//! The real thing (libuv, or a platform reactor such as epoll/kqueue/IOCP) is out of scope for
//! this crate -- §1 treats it as an opaque primitive providing `run`, `stop`, `walk`, async-notify,
//! and timer facilities. This module defines that primitive as a trait, [`EventLoop`], so the
//! worker core can be built and tested against it without depending on any particular native
//! binding. [`simple::SimpleReactor`] is the one concrete implementation this crate ships: a
//! condvar-driven single-threaded reactor with no actual socket I/O, sufficient to drive the six
//! core components end to end.

mod simple;

pub use simple::SimpleReactor;

use std::fmt;
use std::time::{Duration, Instant};

/// Identifies a handle (async notifier or timer) owned by an [`EventLoop`]. Opaque and only
/// meaningful to the `EventLoop` that issued it.
pub type HandleId = u64;

/// The kind of handle a [`EventLoop::walk`] callback is being shown. Mirrors the two handle types
/// the loop worker core itself creates; a production reactor binding may have more (streams,
/// signal handles, ...) but those never flow through this trait since the core never walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// An async notifier, created via [`EventLoop::init_async`].
    Async,
    /// A timer, created via [`EventLoop::init_timer`].
    Timer,
}

/// The opaque native I/O primitive the loop worker drives.
///
/// # Thread safety
///
/// `now`, `walk`, `close`, `timer_start`, `timer_stop`, `init_async`, and `init_timer` are only
/// ever called from the worker thread, matching §3's invariant that loop-owned resources are
/// worker-thread-only. `signal` is the one operation that must be thread-safe, since it is how
/// the async notifier (§4.D) wakes the loop from any thread. `run` blocks the calling thread
/// (the worker thread) until no active handles remain or `stop` is called from another thread.
pub trait EventLoop: Send + Sync + fmt::Debug {
    /// The loop's cached notion of "now". Calling this is the only syscall the heartbeat needs
    /// per tick (§1, point 4) -- it does not read the wall clock itself on every connection.
    fn now(&self) -> Instant;

    /// Creates a new async notifier handle bound to `on_signal`, which fires on the worker
    /// thread (inside `run`) the next time `signal` is called for this handle. Returns the new
    /// handle's id.
    fn init_async(&self, on_signal: Box<dyn Fn() + Send + Sync>) -> HandleId;

    /// Creates a new, initially-inactive timer handle. Call `timer_start` to arm it.
    fn init_timer(&self, on_fire: Box<dyn Fn() + Send + Sync>) -> HandleId;

    /// Arms `handle` (which must have come from `init_timer`) to fire repeatedly every
    /// `interval`, starting after the first `interval` elapses.
    fn timer_start(&self, handle: HandleId, interval: Duration);

    /// Disarms a timer without closing its handle. A stopped timer no longer fires, but
    /// `walk` still sees it and `close` is still required to release it.
    fn timer_stop(&self, handle: HandleId);

    /// Thread-safe wake. Schedules `handle`'s bound callback to run on the worker thread the
    /// next time the loop polls. At most one wake is coalesced per loop turn: calling this
    /// repeatedly before the loop has had a chance to react still results in exactly one
    /// invocation of the callback before the loop goes back to waiting.
    fn signal(&self, handle: HandleId);

    /// Enumerates every live handle, invoking `visit` once per handle with its id and kind.
    /// Never invoked while holding any lock the loop needs to make progress -- `visit` is free to
    /// call back into this `EventLoop` (e.g. to `close` the handle it was just shown).
    fn walk(&self, visit: &mut dyn FnMut(HandleId, HandleKind));

    /// Releases `handle`. Idempotent: closing an already-closed or unknown handle is a no-op.
    /// After this call, `handle` no longer keeps `run` alive and is no longer visited by `walk`.
    fn close(&self, handle: HandleId);

    /// Blocks the calling thread, invoking bound callbacks as async handles are signalled and
    /// timers fire, until no active handles remain or `stop` is called from another thread.
    fn run(&self);

    /// Thread-safe. Causes an in-progress or future `run` call to return as soon as possible,
    /// without waiting for handles to close naturally. This is the "immediate" escape hatch used
    /// by the shutdown controller's final stage.
    fn stop(&self);
}
