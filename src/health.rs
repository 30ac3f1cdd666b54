//! Health monitoring for resource pools

use crate::metrics::PoolMetrics;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{HealthStatus, PoolMetrics};
///
/// let health = HealthStatus::from_metrics(&PoolMetrics { max_count: 4, ..Default::default() });
/// assert!(health.is_healthy());
/// assert_eq!(health.warning_count, 0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Busy resources over `max_count` (0.0 to 1.0)
    pub utilization: f64,

    /// Idle resources count
    pub idle_resources: usize,

    /// Busy resources count
    pub busy_resources: usize,

    /// Requests waiting for a resource
    pub pending_requests: usize,

    /// Configured capacity
    pub max_count: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive a health status from a metrics snapshot
    pub fn from_metrics(metrics: &PoolMetrics) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        // Check for high utilization
        if metrics.utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", metrics.utilization * 100.0));
            is_healthy = false;
        }

        if metrics.state.pending_requests > 0 {
            warnings.push(format!("{} requests waiting", metrics.state.pending_requests));
        }

        if metrics.request_timeouts > 0 {
            warnings.push(format!("{} requests timed out", metrics.request_timeouts));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization: metrics.utilization,
            idle_resources: metrics.state.idle,
            busy_resources: metrics.state.busy,
            pending_requests: metrics.state.pending_requests,
            max_count: metrics.max_count,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
