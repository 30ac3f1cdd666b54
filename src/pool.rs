//! The public pool handle

use crate::config::PoolConfiguration;
use crate::driver::{Event, PoolCore};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics, State};
use crate::resource::{ManageResource, Resource, ResourceHandle};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Asynchronous pool of stateful resources.
///
/// The pool creates resources on demand up to `max_count` busy at a time,
/// hands idle ones to waiting callers in FIFO request order, and evicts
/// resources that fail or time out. Cloning a `Pool` is cheap; the pool
/// shuts down when the last clone is dropped.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Listener, Pool, PoolConfiguration, Resource, ResourceSignals, Subscription};
///
/// struct Worker(ResourceSignals);
///
/// #[async_trait::async_trait]
/// impl Resource for Worker {
///     type Error = std::convert::Infallible;
///     fn on_ready(&self, l: Listener) -> Subscription { self.0.on_ready(l) }
///     fn on_failed(&self, l: Listener) -> Subscription { self.0.on_failed(l) }
///     async fn close(&self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(
///     || {
///         let signals = ResourceSignals::new();
///         signals.emit_ready(); // ready as soon as it exists
///         Worker(signals)
///     },
///     PoolConfiguration::new().with_max_count(2),
/// );
///
/// let worker = pool.allocate().await.unwrap();
/// // ... use it, then hand it back by signalling readiness
/// worker.0.emit_ready();
/// # }
/// ```
pub struct Pool<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

struct PoolInner<R: Resource> {
    events: mpsc::UnboundedSender<Event<R>>,
    metrics: Arc<MetricsTracker>,
    config: PoolConfiguration,
}

impl<R: Resource> Drop for PoolInner<R> {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Pool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl<R: Resource> Pool<R> {
    /// Create a pool and start its driver task on the current runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<M>(manager: M, config: PoolConfiguration) -> Self
    where
        M: ManageResource<Resource = R>,
    {
        Self::with_runtime(manager, config, Handle::current())
    }

    /// Create a pool whose driver task and timers run on `runtime`
    pub fn with_runtime<M>(manager: M, config: PoolConfiguration, runtime: Handle) -> Self
    where
        M: ManageResource<Resource = R>,
    {
        let (events, receiver) = mpsc::unbounded_channel();
        let metrics = Arc::new(MetricsTracker::new());

        let core = PoolCore::new(
            manager,
            config.clone(),
            runtime.clone(),
            events.clone(),
            Arc::clone(&metrics),
        );
        runtime.spawn(core.run(receiver));

        Self {
            inner: Arc::new(PoolInner {
                events,
                metrics,
                config,
            }),
        }
    }

    /// Wait for a resource.
    ///
    /// Resolves with a busy resource, or fails with
    /// [`PoolError::RequestTimeout`] when none became available within the
    /// configured request timeout.
    pub async fn allocate(&self) -> PoolResult<ResourceHandle<R>> {
        let (reply, response) = oneshot::channel();
        self.inner
            .events
            .send(Event::Allocate(reply))
            .map_err(|_| PoolError::Closed)?;

        response.await.map_err(|_| PoolError::Closed)?
    }

    /// Shut the pool down.
    ///
    /// Waiting and future requests fail with [`PoolError::Closed`]. Idle
    /// resources are closed; busy ones are left to their borrowers.
    pub fn close(&self) {
        let _ = self.inner.events.send(Event::Shutdown);
    }

    /// Wait for a resource, discarding the error
    pub async fn try_allocate(&self) -> Option<ResourceHandle<R>> {
        self.allocate().await.ok()
    }

    /// Current container sizes, as of the last processed event
    pub fn state(&self) -> State {
        self.inner.metrics.state()
    }

    /// The configuration this pool was built with
    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(self.inner.config.max_count)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::from_metrics(&self.get_metrics())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }
}
