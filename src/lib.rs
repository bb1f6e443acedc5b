//! A single-threaded event-loop worker: the execution home for loop-owned resources in an
//! asynchronous I/O runtime.
//!
//! [`Worker`] owns a reactor (an [`EventLoop`][reactor::EventLoop] implementation -- this crate
//! ships [`SimpleReactor`][reactor::SimpleReactor], a condvar-driven stand-in for a production
//! libuv/mio/IOCP binding), runs it on a dedicated thread, and exposes a thread-safe [`Worker::post`]
//! for scheduling callbacks onto that thread from anywhere. A periodic heartbeat ticks every
//! registered connection with a cached timestamp, and [`Worker::stop`] drives a three-stage
//! escalating shutdown (cooperative, rude, immediate) under a caller-supplied time budget.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use loopworker::{ApplicationLifetime, Collaborators, ConnectionRegistry, SimpleReactor, Worker, WorkerConfig};
//!
//! #[derive(Debug, Default)]
//! struct NoConnections;
//!
//! impl ConnectionRegistry for NoConnections {
//!     fn tick_all(&self, _now: Instant) {}
//!     fn close_all(&self, _timeout: Duration) -> bool { true }
//!     fn abort_all(&self, _timeout: Duration) -> bool { true }
//!     fn len(&self) -> usize { 0 }
//! }
//!
//! #[derive(Debug, Default)]
//! struct NoopLifetime;
//!
//! impl ApplicationLifetime for NoopLifetime {
//!     fn stop_application(&self) {}
//! }
//!
//! let collaborators = Collaborators::new(Arc::new(NoConnections), Arc::new(NoopLifetime));
//! let (worker, start_rx) =
//!     Worker::start(WorkerConfig::default(), Arc::new(SimpleReactor::new()), collaborators);
//! start_rx.recv().unwrap().unwrap();
//!
//! worker.post(|_worker| println!("running on the loop worker thread"));
//!
//! worker.stop(Duration::from_secs(5)).unwrap();
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod non_blocking_thread;
pub mod notifier;
pub mod queue;
pub mod reactor;
mod shutdown;
pub mod worker;

pub use collaborators::{ApplicationLifetime, ConnectionRegistry, Disposable, Logger, TracingLogger};
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use notifier::AsyncNotifier;
pub use queue::{CloseQueue, PostQueue, WorkItem};
pub use reactor::{EventLoop, HandleId, HandleKind, SimpleReactor};
pub use worker::{Collaborators, Worker};
