//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time counts of the three pool containers
///
/// `busy` includes resources that were created but have not signalled
/// readiness yet; `creating` counts just those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct State {
    pub busy: usize,
    pub idle: usize,
    pub creating: usize,
    pub pending_requests: usize,
}

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolMetrics;
///
/// let metrics = PoolMetrics::default();
/// let exported = metrics.export();
/// assert_eq!(exported["total_created"], "0");
/// assert_eq!(exported["utilization"], "0.00");
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Resources created by the factory
    pub total_created: usize,

    /// Close commands issued
    pub total_closed: usize,

    /// Requests satisfied with an idle resource
    pub total_allocated: usize,

    /// Requests that failed with a timeout
    pub request_timeouts: usize,

    /// Resources evicted for staying busy too long
    pub busy_timeouts: usize,

    /// Resources closed after staying idle too long
    pub idle_timeouts: usize,

    /// Close commands that returned an error or panicked
    pub close_failures: usize,

    /// Triggers coalesced into matching passes
    pub match_triggers: usize,

    /// Matching passes run
    pub match_passes: usize,

    /// Current container sizes
    pub state: State,

    /// Busy resources over `max_count` (0.0 to 1.0)
    pub utilization: f64,

    /// Configured `max_count`
    pub max_count: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("total_allocated".to_string(), self.total_allocated.to_string());
        metrics.insert("request_timeouts".to_string(), self.request_timeouts.to_string());
        metrics.insert("busy_timeouts".to_string(), self.busy_timeouts.to_string());
        metrics.insert("idle_timeouts".to_string(), self.idle_timeouts.to_string());
        metrics.insert("close_failures".to_string(), self.close_failures.to_string());
        metrics.insert("match_triggers".to_string(), self.match_triggers.to_string());
        metrics.insert("match_passes".to_string(), self.match_passes.to_string());
        metrics.insert("busy_resources".to_string(), self.state.busy.to_string());
        metrics.insert("idle_resources".to_string(), self.state.idle.to_string());
        metrics.insert("creating_resources".to_string(), self.state.creating.to_string());
        metrics.insert("pending_requests".to_string(), self.state.pending_requests.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_count".to_string(), self.max_count.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[derive(Debug)]
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "workers".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&PoolMetrics::default(), "my_pool", Some(&tags));
    /// assert!(output.contains("resourcepool_resources_busy"));
    /// assert!(output.contains("service=\"workers\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauge metrics
        Self::write_metric(&mut output, "resourcepool_resources_busy", "gauge", "Resources on loan or starting up", &labels, metrics.state.busy);
        Self::write_metric(&mut output, "resourcepool_resources_idle", "gauge", "Resources ready for reuse", &labels, metrics.state.idle);
        Self::write_metric(&mut output, "resourcepool_resources_creating", "gauge", "Busy resources not yet ready since creation", &labels, metrics.state.creating);
        Self::write_metric(&mut output, "resourcepool_requests_pending", "gauge", "Allocation requests waiting", &labels, metrics.state.pending_requests);

        output.push_str("# HELP resourcepool_utilization Busy resources over max_count\n");
        output.push_str("# TYPE resourcepool_utilization gauge\n");
        output.push_str(&format!("resourcepool_utilization{{{}}} {:.2}\n", labels, metrics.utilization));

        // Counter metrics
        Self::write_metric(&mut output, "resourcepool_resources_created_total", "counter", "Resources created", &labels, metrics.total_created);
        Self::write_metric(&mut output, "resourcepool_resources_closed_total", "counter", "Close commands issued", &labels, metrics.total_closed);
        Self::write_metric(&mut output, "resourcepool_allocations_total", "counter", "Requests satisfied", &labels, metrics.total_allocated);
        Self::write_metric(&mut output, "resourcepool_request_timeouts_total", "counter", "Requests that timed out", &labels, metrics.request_timeouts);
        Self::write_metric(&mut output, "resourcepool_busy_timeouts_total", "counter", "Busy resources evicted by timeout", &labels, metrics.busy_timeouts);
        Self::write_metric(&mut output, "resourcepool_idle_timeouts_total", "counter", "Idle resources closed by timeout", &labels, metrics.idle_timeouts);
        Self::write_metric(&mut output, "resourcepool_close_failures_total", "counter", "Close commands that failed", &labels, metrics.close_failures);
        Self::write_metric(&mut output, "resourcepool_match_triggers_total", "counter", "Matching pass triggers", &labels, metrics.match_triggers);
        Self::write_metric(&mut output, "resourcepool_match_passes_total", "counter", "Matching passes run", &labels, metrics.match_passes);

        output
    }

    fn write_metric(output: &mut String, name: &str, kind: &str, help: &str, labels: &str, value: usize) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker, written by the pool core and read by `Pool`
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_created: AtomicUsize,
    pub total_closed: AtomicUsize,
    pub total_allocated: AtomicUsize,
    pub request_timeouts: AtomicUsize,
    pub busy_timeouts: AtomicUsize,
    pub idle_timeouts: AtomicUsize,
    pub close_failures: AtomicUsize,
    pub match_triggers: AtomicUsize,
    pub match_passes: AtomicUsize,
    pub busy: AtomicUsize,
    pub idle: AtomicUsize,
    pub creating: AtomicUsize,
    pub pending_requests: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        State {
            busy: self.busy.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            creating: self.creating.load(Ordering::Relaxed),
            pending_requests: self.pending_requests.load(Ordering::Relaxed),
        }
    }

    pub fn get_metrics(&self, max_count: usize) -> PoolMetrics {
        let state = self.state();
        let utilization = if max_count > 0 {
            state.busy as f64 / max_count as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            request_timeouts: self.request_timeouts.load(Ordering::Relaxed),
            busy_timeouts: self.busy_timeouts.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            match_triggers: self.match_triggers.load(Ordering::Relaxed),
            match_passes: self.match_passes.load(Ordering::Relaxed),
            state,
            utilization,
            max_count,
        }
    }
}
