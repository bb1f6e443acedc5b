// Error model for the loop worker: one `#[non_exhaustive]` type covering every fallible public
// entry point, with `thiserror` deriving `Display`/`std::error::Error`.

use thiserror::Error;

/// A specialized `Result` type for loop worker operations that return an
/// [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error originating in the loop worker.
///
/// This is an umbrella type for everything that can go wrong: failures during the worker's
/// init phase, fatal errors captured on the worker thread and re-raised to a `stop()` caller,
/// and defensive misuse errors.
///
/// Future versions may add additional enum variants.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The worker thread failed during its init phase (loop, notifier, or heartbeat timer
    /// initialization). The worker thread has already exited; nothing was started.
    #[error("loop worker failed to initialize: {0}")]
    Init(String),

    /// A work item posted without a completion signal threw, or the loop/teardown phase itself
    /// failed. This is the one-shot fatal error latch described by the shutdown protocol: it is
    /// set at most once, on the worker thread, and re-raised to the next `stop()` caller.
    #[error("loop worker encountered a fatal error: {0}")]
    Fatal(String),

    /// A `postAsync` item was still outstanding in a queue when the worker exited via a
    /// rude or immediate shutdown stage. Completing such futures with this error, rather than
    /// leaving them pending forever, is how the rude/immediate stages avoid hanging a waiting
    /// caller.
    #[error("loop worker stopped before this item was executed")]
    StoppedBeforeExecution,

    /// Defensive variant for API misuse once the worker has fully exited and dropped its queues.
    #[error("loop worker has already stopped")]
    AlreadyStopped,
}
