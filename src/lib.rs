//! # EsoxSolutions.ResourcePool
//!
//! Asynchronous pool of expensive, stateful resources (connections,
//! workers, subprocesses) built on tokio.
//!
//! ## Features
//!
//! - Resources created on demand, at most `max_count` busy at a time
//! - Idle resources reused before anything new is created
//! - FIFO service of allocation requests
//! - Busy, idle and request timeouts, each an independent deadline
//! - Resources report readiness and failure through signals; failed
//!   resources are closed and evicted
//! - Close errors and panics are logged, never propagated
//! - Logging through `tracing` plus an optional log sink
//! - Metrics, Prometheus export and health status
//!
//! ## Lifecycle
//!
//! Every resource moves through `Created -> Busy <-> Idle -> Closed`.
//! A busy resource goes idle when it emits its ready signal; an idle one
//! goes busy when it is handed to a request. A failure signal or an expired
//! deadline closes it from either state, after which it is never handed out
//! again.
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{Listener, Pool, PoolConfiguration, Resource, ResourceSignals, Subscription};
//! use std::time::Duration;
//!
//! struct Connection {
//!     signals: ResourceSignals,
//! }
//!
//! #[async_trait::async_trait]
//! impl Resource for Connection {
//!     type Error = std::io::Error;
//!
//!     fn on_ready(&self, listener: Listener) -> Subscription {
//!         self.signals.on_ready(listener)
//!     }
//!
//!     fn on_failed(&self, listener: Listener) -> Subscription {
//!         self.signals.on_failed(listener)
//!     }
//!
//!     async fn close(&self) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Pool::new(
//!     || {
//!         let connection = Connection { signals: ResourceSignals::new() };
//!         connection.signals.emit_ready();
//!         connection
//!     },
//!     PoolConfiguration::new()
//!         .with_max_count(4)
//!         .with_request_timeout(Duration::from_secs(5)),
//! );
//!
//! let connection = pool.allocate().await.unwrap();
//! // Done with it: the ready signal puts it back in the idle set.
//! connection.signals.emit_ready();
//! # }
//! ```

mod config;
mod driver;
mod errors;
mod health;
mod log;
mod metrics;
mod pool;
mod resource;
mod scheduler;
mod signal;
mod timer;

pub use config::{
    DEFAULT_BUSY_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, PoolConfiguration,
    QueueStrategy,
};
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
pub use log::{LogLevel, LogSink};
pub use metrics::{MetricsExporter, PoolMetrics, State};
pub use pool::Pool;
pub use resource::{
    FactoryWithArgs, ManageResource, Resource, ResourceHandle, ResourceId, factory_with_args,
};
pub use signal::{Listener, ResourceSignals, Signal, Subscription};
