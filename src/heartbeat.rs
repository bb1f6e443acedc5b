//! The heartbeat (§4.E): a reactor timer that fires on `config.heartbeat_interval` and fans out a
//! single cached `now()` reading to every live connection via the [`ConnectionRegistry`]
//! collaborator, rather than through [`EventLoop::walk`] -- `walk` stays reserved for the
//! reactor's own handle bookkeeping (§6: the connection registry is "owned by the worker but
//! defined externally", with its own enumeration).

use std::sync::Arc;

use crate::collaborators::ConnectionRegistry;
use crate::reactor::{EventLoop, HandleId};

/// Owns the reactor timer handle backing the heartbeat. Worker-thread-only: created during init,
/// closed during teardown.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    handle_id: HandleId,
}

impl Heartbeat {
    /// Arms a repeating timer on `reactor` that calls `registry.tick_all(reactor.now())` every
    /// `interval`. The timer is not started until this returns; call sites start it immediately
    /// after since the worker has no "armed but inactive" heartbeat state.
    pub(crate) fn start(
        reactor: &Arc<dyn EventLoop>,
        registry: Arc<dyn ConnectionRegistry>,
        interval: std::time::Duration,
    ) -> Self {
        let reactor_for_tick = Arc::clone(reactor);
        let handle_id = reactor.init_timer(Box::new(move || {
            registry.tick_all(reactor_for_tick.now());
        }));
        reactor.timer_start(handle_id, interval);
        Self { handle_id }
    }

    pub(crate) fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// Stops and releases the heartbeat timer. Worker-thread-only, called during teardown.
    pub(crate) fn close(&self, reactor: &Arc<dyn EventLoop>) {
        reactor.timer_stop(self.handle_id);
        reactor.close(self.handle_id);
    }
}
