use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{EventLoop, HandleId, HandleKind};

/// A condvar-driven, single-threaded reference implementation of [`EventLoop`].
///
/// `Mutex`-guarded shared state that `run` blocks on and other threads wake: there is no real
/// socket polling here, only async-wake and timer bookkeeping, which is exactly what the loop
/// worker core needs to be exercised and tested end to end without a native libuv/mio/IOCP
/// dependency.
#[derive(Debug, Default)]
pub struct SimpleReactor {
    state: Mutex<State>,
    wake: Condvar,
}

#[derive(Default)]
struct State {
    next_id: HandleId,
    asyncs: HashMap<HandleId, AsyncHandle>,
    timers: HashMap<HandleId, TimerHandle>,
    stop_requested: bool,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("asyncs", &self.asyncs.len())
            .field("timers", &self.timers.len())
            .field("stop_requested", &self.stop_requested)
            .finish()
    }
}

// Stored as `Arc` rather than `Box` so `run()` can clone the callback out from under the reactor
// mutex and invoke it without holding the lock -- callbacks are free to call back into the
// reactor (e.g. `close` the handle they were just invoked for).
struct AsyncHandle {
    on_signal: Arc<dyn Fn() + Send + Sync>,
    signalled: bool,
}

struct TimerHandle {
    on_fire: Arc<dyn Fn() + Send + Sync>,
    interval: Duration,
    next_fire: Instant,
    active: bool,
}

impl SimpleReactor {
    /// Creates a new, empty reactor with no active handles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(state: &mut State) -> HandleId {
        state.next_id += 1;
        state.next_id
    }

    fn has_active_handles(state: &State) -> bool {
        !state.asyncs.is_empty() || !state.timers.is_empty()
    }
}

impl EventLoop for SimpleReactor {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn init_async(&self, on_signal: Box<dyn Fn() + Send + Sync>) -> HandleId {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        let id = Self::allocate_id(&mut state);
        state.asyncs.insert(
            id,
            AsyncHandle {
                on_signal: Arc::from(on_signal),
                signalled: false,
            },
        );
        id
    }

    fn init_timer(&self, on_fire: Box<dyn Fn() + Send + Sync>) -> HandleId {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        let id = Self::allocate_id(&mut state);
        state.timers.insert(
            id,
            TimerHandle {
                on_fire: Arc::from(on_fire),
                interval: Duration::ZERO,
                next_fire: Instant::now(),
                active: false,
            },
        );
        id
    }

    fn timer_start(&self, handle: HandleId, interval: Duration) {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        if let Some(timer) = state.timers.get_mut(&handle) {
            timer.interval = interval;
            timer.next_fire = Instant::now() + interval;
            timer.active = true;
        }
        self.wake.notify_all();
    }

    fn timer_stop(&self, handle: HandleId) {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        if let Some(timer) = state.timers.get_mut(&handle) {
            timer.active = false;
        }
    }

    fn signal(&self, handle: HandleId) {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        if let Some(async_handle) = state.asyncs.get_mut(&handle) {
            async_handle.signalled = true;
        }
        self.wake.notify_all();
    }

    fn walk(&self, visit: &mut dyn FnMut(HandleId, HandleKind)) {
        let state = self.state.lock().expect("reactor mutex poisoned");
        let ids: Vec<(HandleId, HandleKind)> = state
            .asyncs
            .keys()
            .map(|id| (*id, HandleKind::Async))
            .chain(state.timers.keys().map(|id| (*id, HandleKind::Timer)))
            .collect();
        drop(state);

        for (id, kind) in ids {
            visit(id, kind);
        }
    }

    fn close(&self, handle: HandleId) {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        state.asyncs.remove(&handle);
        state.timers.remove(&handle);
        self.wake.notify_all();
    }

    fn run(&self) {
        loop {
            let mut state = self.state.lock().expect("reactor mutex poisoned");

            loop {
                if state.stop_requested || !Self::has_active_handles(&state) {
                    return;
                }

                let deadline = state
                    .timers
                    .values()
                    .filter(|t| t.active)
                    .map(|t| t.next_fire)
                    .min();

                let now = Instant::now();
                let wait_for = deadline.map(|d| d.saturating_duration_since(now));

                match wait_for {
                    Some(wait_for) if wait_for > Duration::ZERO => {
                        let (guard, _timeout_result) = self
                            .wake
                            .wait_timeout(state, wait_for)
                            .expect("reactor mutex poisoned");
                        state = guard;
                    }
                    Some(_) => {
                        // A timer is already due -- fall through without waiting.
                    }
                    None => {
                        state = self.wake.wait(state).expect("reactor mutex poisoned");
                    }
                }

                if state.stop_requested {
                    return;
                }

                // Collect everything due before releasing the lock -- callbacks must never run
                // while the reactor mutex is held, since they are free to call back into us.
                let due_timers: Vec<HandleId> = state
                    .timers
                    .iter()
                    .filter(|(_, t)| t.active && t.next_fire <= Instant::now())
                    .map(|(id, _)| *id)
                    .collect();

                for id in &due_timers {
                    if let Some(timer) = state.timers.get_mut(id) {
                        timer.next_fire += timer.interval.max(Duration::from_millis(1));
                    }
                }

                let signalled: Vec<HandleId> = state
                    .asyncs
                    .iter_mut()
                    .filter_map(|(id, a)| {
                        if a.signalled {
                            a.signalled = false;
                            Some(*id)
                        } else {
                            None
                        }
                    })
                    .collect();

                if due_timers.is_empty() && signalled.is_empty() {
                    // Spurious wake (e.g. a `close`/`timer_start` on an unrelated handle).
                    continue;
                }

                drop(state);

                for id in due_timers {
                    let callback = {
                        let state = self.state.lock().expect("reactor mutex poisoned");
                        state.timers.get(&id).map(|t| Arc::clone(&t.on_fire))
                    };
                    if let Some(callback) = callback {
                        callback();
                    }
                }

                for id in signalled {
                    let callback = {
                        let state = self.state.lock().expect("reactor mutex poisoned");
                        state.asyncs.get(&id).map(|a| Arc::clone(&a.on_signal))
                    };
                    if let Some(callback) = callback {
                        callback();
                    }
                }

                // Re-acquire for the outer loop condition check.
                state = self.state.lock().expect("reactor mutex poisoned");
                break;
            }
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock().expect("reactor mutex poisoned");
        state.stop_requested = true;
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn run_returns_immediately_with_no_handles() {
        let reactor = SimpleReactor::new();
        reactor.run();
    }

    #[test]
    fn async_signal_invokes_callback_and_then_run_can_be_stopped() {
        let reactor = Arc::new(SimpleReactor::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        let handle = reactor.init_async(Box::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reactor_clone = Arc::clone(&reactor);
        let runner = thread::spawn(move || reactor_clone.run());

        // Give the runner a moment to reach the wait point, then signal and stop.
        thread::sleep(Duration::from_millis(20));
        reactor.signal(handle);
        thread::sleep(Duration::from_millis(20));
        reactor.stop();

        runner.join().expect("runner thread panicked");
        assert!(fired.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn timer_fires_repeatedly_until_closed() {
        let reactor = Arc::new(SimpleReactor::new());
        let fires = Arc::new(AtomicUsize::new(0));

        let fires_clone = Arc::clone(&fires);
        let handle = reactor.init_timer(Box::new(move || {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        }));
        reactor.timer_start(handle, Duration::from_millis(10));

        let reactor_clone = Arc::clone(&reactor);
        let runner = thread::spawn(move || reactor_clone.run());

        thread::sleep(Duration::from_millis(55));
        reactor.close(handle);

        runner.join().expect("runner thread panicked");
        assert!(fires.load(Ordering::SeqCst) >= 3, "expected several fires");
    }

    #[test]
    fn close_is_idempotent() {
        let reactor = SimpleReactor::new();
        let handle = reactor.init_async(Box::new(|| {}));
        reactor.close(handle);
        reactor.close(handle);
        reactor.close(999);
    }

    #[test]
    fn walk_sees_every_live_handle() {
        let reactor = SimpleReactor::new();
        let a = reactor.init_async(Box::new(|| {}));
        let t = reactor.init_timer(Box::new(|| {}));

        let mut seen = Vec::new();
        reactor.walk(&mut |id, kind| seen.push((id, kind)));

        assert!(seen.contains(&(a, HandleKind::Async)));
        assert!(seen.contains(&(t, HandleKind::Timer)));
    }
}
