//! External collaborator seams (§6 of the design). The loop worker owns none of these types --
//! it is handed implementations by the transport that constructs it, and talks to them only
//! through these traits.

use std::time::Duration;

/// Sink for the handful of diagnostic events the shutdown and drain paths need to report.
///
/// The default implementation, [`TracingLogger`], forwards to `tracing` macros so that a host
/// application gets structured, filterable output for free. Callers who are not using `tracing`,
/// or who want to assert on exact call counts in tests, can supply their own implementation --
/// this is why the trait stays part of the public surface instead of being replaced outright by
/// bare `tracing::error!` calls at each site.
#[cfg_attr(test, mockall::automock)]
pub trait Logger: Send + Sync {
    /// A recoverable error worth surfacing, but not fatal to the worker.
    fn log_error(&self, message: &str);

    /// An unrecoverable condition: the worker is about to give up on something (e.g. a shutdown
    /// stage timed out for the last time).
    fn log_critical(&self, message: &str);

    /// The connection-drain step of `stop()` timed out with connections still open.
    fn not_all_connections_closed_gracefully(&self, still_open: usize);

    /// The forced-abort follow-up still left connections stuck.
    fn not_all_connections_aborted(&self, still_stuck: usize);
}

/// [`Logger`] implementation that forwards to `tracing`, scoped under a `loop_worker` span so a
/// subscriber can filter or aggregate worker diagnostics independently of everything else in the
/// process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_error(&self, message: &str) {
        let _span = tracing::info_span!("loop_worker").entered();
        tracing::error!(message, "loop worker error");
    }

    fn log_critical(&self, message: &str) {
        let _span = tracing::info_span!("loop_worker").entered();
        tracing::error!(message, critical = true, "loop worker critical error");
    }

    fn not_all_connections_closed_gracefully(&self, still_open: usize) {
        let _span = tracing::info_span!("loop_worker").entered();
        tracing::warn!(still_open, "not all connections closed gracefully");
    }

    fn not_all_connections_aborted(&self, still_stuck: usize) {
        let _span = tracing::info_span!("loop_worker").entered();
        tracing::warn!(still_stuck, "not all connections were aborted");
    }
}

/// Owned by the worker but defined externally (§6): tracks every live connection and can walk
/// them for the heartbeat, or close/abort all of them during shutdown.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionRegistry: Send + Sync {
    /// Invokes `tick(now)` on every connection currently registered. Called once per heartbeat
    /// fire, on the worker thread.
    fn tick_all(&self, now: std::time::Instant);

    /// Asks every connection to close within `timeout`. Returns whether all of them did.
    fn close_all(&self, timeout: Duration) -> bool;

    /// Forcibly aborts every connection still open, within `timeout`. Returns whether all of
    /// them ended up closed.
    fn abort_all(&self, timeout: Duration) -> bool;

    /// Number of connections still registered. Used for the diagnostic log calls after a
    /// `close_all`/`abort_all` that did not fully succeed.
    fn len(&self) -> usize;

    /// True if no connections are registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A pool-like collaborator that must be torn down when the worker exits. Covers the buffer-pool
/// factory and the write-request pool from §3/§6; both are "just disposable" from the worker's
/// point of view.
pub trait Disposable: Send + Sync {
    /// Releases any resources held by this collaborator. Called once, from the worker thread's
    /// teardown phase. Must not panic -- teardown has no one left to propagate a panic to other
    /// than the thread itself.
    fn dispose(&self);
}

/// The application's overall lifetime signal (§6: "an application lifetime with
/// `stopApplication()`"). The worker calls this when it captures a fatal error, so that a single
/// misbehaving loop takes down the whole host rather than spinning silently.
pub trait ApplicationLifetime: Send + Sync {
    /// Requests that the hosting application begin shutting down.
    fn stop_application(&self);
}

/// Trivial test doubles for the collaborator traits above. Gated behind the `test-support`
/// feature (rather than plain `#[cfg(test)]`) so that integration tests under `tests/`, which
/// compile this crate as an ordinary dependency, can use them too -- a self-dependency on this
/// crate with the feature enabled, declared in `[dev-dependencies]`, is what makes that visible.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// A [`Disposable`] that records whether it was disposed, for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingDisposable {
        disposed: Mutex<bool>,
    }

    impl RecordingDisposable {
        pub fn was_disposed(&self) -> bool {
            *self.disposed.lock().expect("poisoned")
        }
    }

    impl Disposable for RecordingDisposable {
        fn dispose(&self) {
            *self.disposed.lock().expect("poisoned") = true;
        }
    }

    /// An [`ApplicationLifetime`] that records whether a stop was requested.
    #[derive(Debug, Default)]
    pub struct RecordingApplicationLifetime {
        stopped: Mutex<bool>,
    }

    impl RecordingApplicationLifetime {
        pub fn was_stopped(&self) -> bool {
            *self.stopped.lock().expect("poisoned")
        }
    }

    impl ApplicationLifetime for RecordingApplicationLifetime {
        fn stop_application(&self) {
            *self.stopped.lock().expect("poisoned") = true;
        }
    }

    /// A [`ConnectionRegistry`] with no connections and trivially-successful close/abort, for
    /// tests that don't care about connection lifecycle.
    #[derive(Debug, Default)]
    pub struct EmptyConnectionRegistry;

    impl ConnectionRegistry for EmptyConnectionRegistry {
        fn tick_all(&self, _now: std::time::Instant) {}

        fn close_all(&self, _timeout: Duration) -> bool {
            true
        }

        fn abort_all(&self, _timeout: Duration) -> bool {
            true
        }

        fn len(&self) -> usize {
            0
        }
    }
}
