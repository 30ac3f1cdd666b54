use esox_resourcepool::*;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    /// Signal readiness from inside the constructor
    Immediate,
    /// Signal readiness on the next scheduler turn
    Ready,
    /// Signal readiness after the given delay
    ReadyAfter(Duration),
    /// Signal failure after the given delay
    FailAfter(Duration),
    /// Never signal anything
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseBehavior {
    Ok,
    Error,
    Panic,
}

struct TestResource {
    ordinal: usize,
    signals: ResourceSignals,
    closes: AtomicUsize,
    close_behavior: CloseBehavior,
    closed_total: Arc<AtomicUsize>,
}

impl TestResource {
    /// Hand the resource back to the pool
    fn finish(&self) {
        self.signals.emit_ready();
    }

    fn break_down(&self) {
        self.signals.emit_failed();
    }

    fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resource for TestResource {
    type Error = String;

    fn on_ready(&self, listener: Listener) -> Subscription {
        self.signals.on_ready(listener)
    }

    fn on_failed(&self, listener: Listener) -> Subscription {
        self.signals.on_failed(listener)
    }

    async fn close(&self) -> Result<(), String> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed_total.fetch_add(1, Ordering::SeqCst);
        match self.close_behavior {
            CloseBehavior::Ok => Ok(()),
            CloseBehavior::Error => Err(format!("resource {} refused to close", self.ordinal)),
            CloseBehavior::Panic => panic!("resource {} blew up on close", self.ordinal),
        }
    }

    fn kind(&self) -> &'static str {
        "TestResource"
    }
}

#[derive(Clone)]
struct Harness {
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    startup: Arc<Mutex<Startup>>,
    close_behavior: CloseBehavior,
}

impl Harness {
    fn new(startup: Startup) -> Self {
        Self {
            created: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            startup: Arc::new(Mutex::new(startup)),
            close_behavior: CloseBehavior::Ok,
        }
    }

    fn with_close_behavior(mut self, behavior: CloseBehavior) -> Self {
        self.close_behavior = behavior;
        self
    }

    fn set_startup(&self, startup: Startup) {
        *self.startup.lock() = startup;
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn manager(&self) -> impl Fn() -> TestResource + Send + Sync + 'static {
        let harness = self.clone();
        move || {
            let ordinal = harness.created.fetch_add(1, Ordering::SeqCst);
            let signals = ResourceSignals::new();

            match *harness.startup.lock() {
                Startup::Immediate => {
                    signals.emit_ready();
                }
                Startup::Ready => {
                    let signals = signals.clone();
                    tokio::spawn(async move {
                        tokio::task::yield_now().await;
                        signals.emit_ready();
                    });
                }
                Startup::ReadyAfter(delay) => {
                    let signals = signals.clone();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        signals.emit_ready();
                    });
                }
                Startup::FailAfter(delay) => {
                    let signals = signals.clone();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        signals.emit_failed();
                    });
                }
                Startup::Silent => {}
            }

            TestResource {
                ordinal,
                signals,
                closes: AtomicUsize::new(0),
                close_behavior: harness.close_behavior,
                closed_total: Arc::clone(&harness.closed),
            }
        }
    }

    fn pool(&self, config: PoolConfiguration) -> Pool<TestResource> {
        Pool::new(self.manager(), config)
    }
}

/// Let the pool driver and spawned signal tasks catch up
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_creates_resources_up_to_max_count() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(2));

    let first = pool.allocate().await.unwrap();
    assert_eq!(harness.created(), 1);
    let second = pool.allocate().await.unwrap();
    assert_eq!(harness.created(), 2);

    assert!(!first.same_resource(&second));
    assert_ne!(first.id(), second.id());
    assert_eq!(first.id().get(), 0);
    assert_eq!(second.id().get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waits_at_capacity_then_reuses_released_resource() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(2));

    let first = pool.allocate().await.unwrap();
    let _second = pool.allocate().await.unwrap();

    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.allocate().await }
    });
    settle().await;

    assert_eq!(harness.created(), 2);
    assert_eq!(pool.state().pending_requests, 1);
    assert!(!waiting.is_finished());

    first.finish();
    let third = waiting.await.unwrap().unwrap();

    assert!(third.same_resource(&first));
    assert_eq!(harness.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_resource_is_reused_without_creation() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(4));

    let first = pool.allocate().await.unwrap();
    first.finish();
    settle().await;
    assert_eq!(pool.state().idle, 1);

    let again = pool.allocate().await.unwrap();
    assert!(again.same_resource(&first));
    assert_eq!(harness.created(), 1);
    assert_eq!(pool.get_metrics().total_allocated, 2);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_emitted_before_subscription_is_not_lost() {
    let harness = Harness::new(Startup::Immediate);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let resource = pool.allocate().await.unwrap();
    assert_eq!(resource.ordinal, 0);
}

#[tokio::test(start_paused = true)]
async fn test_busy_failure_closes_once_and_never_reallocates() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(2));

    let broken = pool.allocate().await.unwrap();
    broken.break_down();
    settle().await;

    assert_eq!(broken.close_count(), 1);
    assert_eq!(pool.state().busy, 0);
    assert_eq!(broken.signals.emit_ready(), 0, "listeners must be gone after eviction");

    let replacement = pool.allocate().await.unwrap();
    assert!(!replacement.same_resource(&broken));
    assert_eq!(harness.created(), 2);

    // Late signals from the evicted resource change nothing.
    broken.break_down();
    broken.finish();
    settle().await;
    assert_eq!(broken.close_count(), 1);

    let another = pool.allocate().await.unwrap();
    assert!(!another.same_resource(&broken));
    assert!(!another.same_resource(&replacement));
}

#[tokio::test(start_paused = true)]
async fn test_idle_failure_removes_resource_from_idle_set() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(2));

    let resource = pool.allocate().await.unwrap();
    resource.finish();
    settle().await;
    assert_eq!(pool.state().idle, 1);

    resource.break_down();
    settle().await;
    assert_eq!(resource.close_count(), 1);
    assert_eq!(pool.state().idle, 0);

    let fresh = pool.allocate().await.unwrap();
    assert!(!fresh.same_resource(&resource));
}

#[tokio::test(start_paused = true)]
async fn test_creation_failure_retries_until_request_timeout() {
    let harness = Harness::new(Startup::FailAfter(Duration::from_millis(100)));
    let pool = harness.pool(
        PoolConfiguration::new()
            .with_max_count(1)
            .with_request_timeout(Duration::from_millis(1000)),
    );
    let start = Instant::now();

    let result = pool.allocate().await;
    assert_eq!(result.unwrap_err(), PoolError::RequestTimeout(Duration::from_millis(1000)));
    assert!(start.elapsed() >= Duration::from_millis(1000));

    // One creation every 100ms while the request was waiting.
    let created = harness.created();
    assert!((9..=11).contains(&created), "created {created}");

    sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.created(), created, "no creation once the request is gone");
    assert_eq!(harness.closed(), created);
}

#[tokio::test(start_paused = true)]
async fn test_failed_creation_is_replaced_for_pending_request() {
    let harness = Harness::new(Startup::FailAfter(Duration::from_millis(10)));
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.allocate().await }
    });
    sleep(Duration::from_millis(5)).await;
    harness.set_startup(Startup::Ready);

    let resource = waiting.await.unwrap().unwrap();
    settle().await;
    assert_eq!(resource.ordinal, 1);
    assert_eq!(harness.created(), 2);
    assert_eq!(harness.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_request_is_not_matched_later() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(
        PoolConfiguration::new()
            .with_max_count(1)
            .with_request_timeout(Duration::from_millis(1000)),
    );

    let held = pool.allocate().await.unwrap();
    let start = Instant::now();
    let result = pool.allocate().await;
    assert_eq!(result.unwrap_err(), PoolError::RequestTimeout(Duration::from_millis(1000)));
    assert!(start.elapsed() >= Duration::from_millis(1000));

    held.finish();
    settle().await;

    let state = pool.state();
    assert_eq!(state.idle, 1);
    assert_eq!(state.pending_requests, 0);
    assert_eq!(pool.get_metrics().request_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_timeout_closes_at_deadline_and_replaces() {
    let harness = Harness::new(Startup::Silent);
    let pool = harness.pool(
        PoolConfiguration::new()
            .with_max_count(1)
            .with_busy_timeout(Duration::from_millis(100))
            .with_request_timeout(Duration::from_millis(150)),
    );
    let start = Instant::now();

    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.allocate().await }
    });

    sleep_until(start + Duration::from_millis(99)).await;
    assert_eq!(harness.created(), 1);
    assert_eq!(harness.closed(), 0);

    sleep_until(start + Duration::from_millis(101)).await;
    assert_eq!(harness.closed(), 1);
    assert_eq!(harness.created(), 2, "replacement for the still waiting request");

    let result = waiting.await.unwrap();
    assert_eq!(result.unwrap_err(), PoolError::RequestTimeout(Duration::from_millis(150)));

    sleep_until(start + Duration::from_millis(201)).await;
    assert_eq!(harness.closed(), 2);

    sleep_until(start + Duration::from_millis(1000)).await;
    assert_eq!(harness.created(), 2);
    assert_eq!(pool.get_metrics().busy_timeouts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_closes_untouched_resource() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(
        PoolConfiguration::new().with_idle_timeout(Duration::from_millis(10_000)),
    );
    let start = Instant::now();

    let resource = pool.allocate().await.unwrap();
    resource.finish();

    sleep_until(start + Duration::from_millis(9_999)).await;
    assert_eq!(resource.close_count(), 0);
    assert_eq!(pool.state().idle, 1);

    sleep_until(start + Duration::from_millis(10_001)).await;
    assert_eq!(resource.close_count(), 1);
    assert_eq!(pool.state().idle, 0);
    assert_eq!(pool.get_metrics().idle_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reallocation_cancels_idle_deadline() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(
        PoolConfiguration::new().with_idle_timeout(Duration::from_millis(10_000)),
    );
    let start = Instant::now();

    let resource = pool.allocate().await.unwrap();
    resource.finish();

    sleep_until(start + Duration::from_millis(5_000)).await;
    let again = pool.allocate().await.unwrap();
    assert!(again.same_resource(&resource));

    sleep_until(start + Duration::from_millis(10_001)).await;
    assert_eq!(resource.close_count(), 0);

    // Back to idle at ~10s, so the next deadline is ~20s.
    again.finish();
    sleep_until(start + Duration::from_millis(19_999)).await;
    assert_eq!(resource.close_count(), 0);
    sleep_until(start + Duration::from_millis(20_002)).await;
    assert_eq!(resource.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_error_is_logged_and_swallowed() {
    let records = Arc::new(Mutex::new(Vec::<(LogLevel, String)>::new()));
    let captured = Arc::clone(&records);
    let harness = Harness::new(Startup::Ready).with_close_behavior(CloseBehavior::Error);
    let pool = harness.pool(
        PoolConfiguration::new()
            .with_max_count(1)
            .with_log_sink(Arc::new(move |level: LogLevel, message: &str| {
                captured.lock().push((level, message.to_string()));
            })),
    );

    let resource = pool.allocate().await.unwrap();
    resource.break_down();
    settle().await;

    assert_eq!(resource.close_count(), 1);
    assert_eq!(pool.get_metrics().close_failures, 1);
    assert!(records.lock().iter().any(|(level, message)| {
        *level == LogLevel::Error && message.contains("refused to close")
    }));

    let replacement = pool.allocate().await.unwrap();
    assert!(!replacement.same_resource(&resource));
}

#[tokio::test(start_paused = true)]
async fn test_close_panic_does_not_take_the_pool_down() {
    let harness = Harness::new(Startup::Ready).with_close_behavior(CloseBehavior::Panic);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let resource = pool.allocate().await.unwrap();
    resource.break_down();
    settle().await;

    assert_eq!(pool.get_metrics().close_failures, 1);
    let replacement = pool.allocate().await.unwrap();
    assert!(!replacement.same_resource(&resource));
}

#[tokio::test(start_paused = true)]
async fn test_busy_count_never_exceeds_max_count() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(3));
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..12u64 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let resource = pool.allocate().await.unwrap();
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(10 + i)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            resource.finish();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(harness.created() <= 3);
    assert_eq!(pool.get_metrics().total_allocated, 12);
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_served_in_fifo_order() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = pool.allocate().await.unwrap();
    let mut tasks = Vec::new();
    for caller in 0..3 {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let resource = pool.allocate().await.unwrap();
            order.lock().push(caller);
            resource.finish();
        }));
        settle().await;
    }

    held.finish();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_strategy_selects_idle_resource() {
    for (strategy, expected) in [(QueueStrategy::Fifo, 0), (QueueStrategy::Lifo, 1)] {
        let harness = Harness::new(Startup::Ready);
        let pool = harness.pool(
            PoolConfiguration::new()
                .with_max_count(2)
                .with_queue_strategy(strategy),
        );

        let first = pool.allocate().await.unwrap();
        let second = pool.allocate().await.unwrap();
        first.finish();
        settle().await;
        second.finish();
        settle().await;

        let picked = pool.allocate().await.unwrap();
        assert_eq!(picked.ordinal, expected, "{strategy:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_does_not_swallow_resource() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let held = pool.allocate().await.unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(50), pool.allocate()).await;
    assert!(gave_up.is_err());

    held.finish();
    settle().await;
    assert_eq!(pool.state().idle, 1);

    let again = pool.allocate().await.unwrap();
    assert!(again.same_resource(&held));
}

#[tokio::test(start_paused = true)]
async fn test_close_fails_waiting_and_later_requests() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let held = pool.allocate().await.unwrap();
    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.allocate().await }
    });
    settle().await;
    assert_eq!(pool.state().pending_requests, 1);
    assert_eq!(held.signals.listener_count(), 2);

    pool.close();
    assert_eq!(waiting.await.unwrap().unwrap_err(), PoolError::Closed);
    assert_eq!(pool.allocate().await.unwrap_err(), PoolError::Closed);
    settle().await;

    // Busy resources are detached, not closed.
    assert_eq!(held.close_count(), 0);
    assert_eq!(held.signals.listener_count(), 0);
    assert_eq!(held.signals.emit_ready(), 0);
    assert_eq!(Arc::strong_count(held.resource()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_idle_resources() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(2));

    let resource = pool.allocate().await.unwrap();
    resource.finish();
    settle().await;

    drop(pool);
    settle().await;
    assert_eq!(resource.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_factory_with_args_passes_arguments() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let harness = Harness::new(Startup::Ready);
    let build = harness.manager();
    let manager = factory_with_args((Arc::clone(&seen), "worker-7"), move |(seen, name)| {
        seen.lock().push(name.to_string());
        build()
    });

    let pool = Pool::new(manager, PoolConfiguration::new().with_max_count(1));
    let _resource = pool.allocate().await.unwrap();

    assert_eq!(*seen.lock(), vec!["worker-7".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_in_one_tick_share_a_matching_pass() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(8));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move { pool.allocate().await.unwrap() }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let metrics = pool.get_metrics();
    assert_eq!(harness.created(), 8);
    assert!(metrics.match_passes < metrics.match_triggers);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_and_health_reflect_state() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(1));

    let _resource = pool.allocate().await.unwrap();
    settle().await;

    let health = pool.get_health_status();
    assert_eq!(health.busy_resources, 1);
    assert!(!health.is_healthy());

    let exported = pool.export_metrics();
    assert_eq!(exported["total_created"], "1");
    assert_eq!(exported["busy_resources"], "1");

    let text = pool.export_metrics_prometheus("workers", None);
    assert!(text.contains("resourcepool_resources_busy{pool=\"workers\"} 1"));
}

#[tokio::test(start_paused = true)]
async fn test_resources_still_starting_count_against_demand() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(PoolConfiguration::new().with_max_count(4));

    let bystander = pool.allocate().await.unwrap();
    harness.set_startup(Startup::ReadyAfter(Duration::from_millis(100)));

    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.allocate().await }
    });
    settle().await;
    assert_eq!(harness.created(), 2);
    assert_eq!(pool.state().creating, 1);

    // Another pass runs while the new resource is still starting up.
    bystander.break_down();
    settle().await;
    assert_eq!(bystander.close_count(), 1);
    assert_eq!(harness.created(), 2);
    assert_eq!(pool.state().pending_requests, 1);

    let resource = waiting.await.unwrap().unwrap();
    assert_eq!(resource.ordinal, 1);
    assert_eq!(harness.created(), 2);
    assert_eq!(pool.state().creating, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_expires_without_counting_a_timeout() {
    let harness = Harness::new(Startup::Ready);
    let pool = harness.pool(
        PoolConfiguration::new()
            .with_max_count(1)
            .with_request_timeout(Duration::from_millis(1000)),
    );

    let _held = pool.allocate().await.unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(50), pool.allocate()).await;
    assert!(gave_up.is_err());
    settle().await;
    assert_eq!(pool.state().pending_requests, 1);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(pool.state().pending_requests, 0);
    assert_eq!(pool.get_metrics().request_timeouts, 0);
    assert_eq!(pool.get_health_status().warning_count, 1, "only the utilization warning");
}

#[tokio::test(start_paused = true)]
async fn test_pool_on_explicit_runtime_with_try_allocate() {
    let harness = Harness::new(Startup::Ready);
    let pool = Pool::with_runtime(
        harness.manager(),
        PoolConfiguration::new()
            .with_max_count(1)
            .with_request_timeout(Duration::from_millis(100)),
        tokio::runtime::Handle::current(),
    );

    let first = pool.try_allocate().await.expect("capacity for one resource");
    assert!(pool.try_allocate().await.is_none());
    assert_eq!(pool.get_metrics().request_timeouts, 1);

    first.finish();
    settle().await;
    let again = pool.try_allocate().await.expect("released resource");
    assert!(again.same_resource(&first));
    assert!(Arc::ptr_eq(again.resource(), first.resource()));
}
