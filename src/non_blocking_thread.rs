//! The loop worker thread is the execution home for every loop-owned resource. Some APIs on
//! [`crate::worker::Worker`] are only safe to call from *other* threads -- calling them from
//! the worker thread itself would deadlock it waiting on itself. This thread-local flag lets such
//! an API detect that case and assert instead of hanging.

use std::cell::Cell;

/// Flags the current thread as the loop worker thread. Attempting to call an API documented as
/// "any thread but the worker" from this thread will panic via [`assert_not_worker_thread`].
pub fn flag_current_thread() {
    IS_WORKER_THREAD.with(|x| x.set(true));
}

/// Panics if called from the loop worker thread.
pub fn assert_not_worker_thread() {
    IS_WORKER_THREAD.with(|x| {
        assert!(
            !x.get(),
            "this operation must not be called from the loop worker thread -- it would deadlock \
             waiting for the worker thread to do something only it can do"
        );
    });
}

/// True if the current thread is the loop worker thread.
pub fn is_worker_thread() -> bool {
    IS_WORKER_THREAD.with(Cell::get)
}

thread_local! {
    static IS_WORKER_THREAD: Cell<bool> = const { Cell::new(false) };
}
