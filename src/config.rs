use std::time::Duration;

/// Drain-pass cap for [`crate::queue`] alternation between the post queue and the close-handle
/// queue. See the module docs on [`crate::worker`] for the full drain algorithm.
pub const DEFAULT_MAX_LOOPS: usize = 8;

/// Heartbeat period: how often every live connection receives a `tick(now)` call.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default budget handed to the connection registry to close connections gracefully during
/// shutdown, before falling back to an abort.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed budget for the forced-abort follow-up when graceful connection close does not finish
/// within `shutdown_timeout`. Not configurable: a one-second literal constant.
pub const CONNECTION_ABORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for a [`crate::worker::Worker`].
///
/// There is no builder here -- the surface is small enough that a struct literal with
/// `..Default::default()` is idiomatic and avoids a proc-macro dependency we'd otherwise have no
/// other use for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Cap on how many times the drain loop alternates between the post queue and the
    /// close-handle queue in a single notifier wake before returning control to the reactor.
    pub max_loops: usize,

    /// How often the heartbeat timer fires.
    pub heartbeat_interval: Duration,

    /// Budget given to the connection registry to close connections gracefully during the
    /// `stop()` drain-connections step, before escalating to a forced abort.
    pub shutdown_timeout: Duration,

    /// Budget given to the connection registry's forced abort, after `shutdown_timeout` elapses
    /// without every connection closing gracefully.
    pub connection_abort_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_loops: DEFAULT_MAX_LOOPS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connection_abort_timeout: CONNECTION_ABORT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_literals() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_loops, 8);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1000));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.connection_abort_timeout, Duration::from_secs(1));
    }
}
