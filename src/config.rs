//! Pool configuration options

use crate::log::LogSink;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time a borrowed resource may stay busy before it is evicted
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time an idle resource is kept before it is closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

/// Default time an allocation request waits before failing
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Order in which idle resources are handed to waiting requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueStrategy {
    /// Oldest idle resource first
    #[default]
    Fifo,
    /// Most recently idled resource first
    Lifo,
}

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, QueueStrategy};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_count(4)
///     .with_busy_timeout(Duration::from_secs(5))
///     .with_request_timeout(Duration::from_secs(2))
///     .with_queue_strategy(QueueStrategy::Lifo);
///
/// assert_eq!(config.max_count, 4);
/// assert_eq!(config.request_timeout, Duration::from_secs(2));
/// ```
#[derive(Clone)]
pub struct PoolConfiguration {
    /// Maximum number of resources that can be busy at the same time
    pub max_count: usize,

    /// How long a resource may stay busy without signalling readiness
    pub busy_timeout: Duration,

    /// How long a resource may stay idle before it is closed
    pub idle_timeout: Duration,

    /// How long an allocation request waits for a resource
    pub request_timeout: Duration,

    /// Idle selection policy
    pub queue_strategy: QueueStrategy,

    /// Optional receiver for log records
    pub log_sink: Option<Arc<dyn LogSink>>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_count: 10,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_strategy: QueueStrategy::default(),
            log_sink: None,
        }
    }
}

impl fmt::Debug for PoolConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("max_count", &self.max_count)
            .field("busy_timeout", &self.busy_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("queue_strategy", &self.queue_strategy)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrently busy resources
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn with_max_count(mut self, count: usize) -> Self {
        assert!(count > 0, "max_count must be greater than zero");
        self.max_count = count;
        self
    }

    /// Set the busy timeout
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "busy_timeout must be non-zero");
        self.busy_timeout = timeout;
        self
    }

    /// Set the idle timeout
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "idle_timeout must be non-zero");
        self.idle_timeout = timeout;
        self
    }

    /// Set the request timeout
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "request_timeout must be non-zero");
        self.request_timeout = timeout;
        self
    }

    /// Set the idle selection policy
    pub fn with_queue_strategy(mut self, strategy: QueueStrategy) -> Self {
        self.queue_strategy = strategy;
        self
    }

    /// Set the log sink
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }
}
