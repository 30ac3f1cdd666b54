//! The pool driver
//!
//! [`PoolCore`] runs as a single task that exclusively owns the idle set,
//! the busy map and the request queue. Callers, resource signals and
//! timers talk to it only through [`Event`]s, so every state change happens
//! on one logical thread of control and no locking is needed.

use crate::config::{PoolConfiguration, QueueStrategy};
use crate::errors::{PoolError, PoolResult};
use crate::log::{self, LogLevel};
use crate::metrics::MetricsTracker;
use crate::resource::{ManageResource, Resource, ResourceHandle, ResourceId};
use crate::scheduler::MatchScheduler;
use crate::signal::Subscription;
use crate::timer::{Timer, TimerKeys};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

pub(crate) type Reply<R> = oneshot::Sender<PoolResult<ResourceHandle<R>>>;

/// Everything that can change pool state.
pub(crate) enum Event<R> {
    Allocate(Reply<R>),
    Ready(ResourceId),
    Failed(ResourceId),
    BusyExpired(ResourceId, u64),
    IdleExpired(ResourceId, u64),
    RequestExpired(u64),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Busy,
    Idle,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Busy => f.write_str("busy"),
            Lifecycle::Idle => f.write_str("idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eviction {
    Failed,
    BusyTimeout,
    IdleTimeout,
    Shutdown,
}

impl Eviction {
    fn level(self) -> LogLevel {
        match self {
            Eviction::Failed | Eviction::BusyTimeout => LogLevel::Error,
            Eviction::IdleTimeout | Eviction::Shutdown => LogLevel::Info,
        }
    }
}

impl fmt::Display for Eviction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eviction::Failed => f.write_str("failure signal"),
            Eviction::BusyTimeout => f.write_str("busy timeout"),
            Eviction::IdleTimeout => f.write_str("idle timeout"),
            Eviction::Shutdown => f.write_str("pool shutdown"),
        }
    }
}

/// A resource under pool management
struct Entry<R> {
    id: ResourceId,
    resource: Arc<R>,
    state: Lifecycle,
    timer: Timer,
    subscriptions: [Subscription; 2],
}

/// A caller waiting for a resource
struct Request<R> {
    id: u64,
    reply: Reply<R>,
    timer: Timer,
}

pub(crate) struct PoolCore<M: ManageResource> {
    manager: M,
    config: PoolConfiguration,
    runtime: Handle,
    events: UnboundedSender<Event<M::Resource>>,
    idle: VecDeque<Entry<M::Resource>>,
    busy: HashMap<ResourceId, Entry<M::Resource>>,
    /// Busy resources that have not reported readiness since creation
    creating: HashSet<ResourceId>,
    requests: VecDeque<Request<M::Resource>>,
    next_resource: u64,
    next_request: u64,
    timer_keys: TimerKeys,
    scheduler: MatchScheduler,
    metrics: Arc<MetricsTracker>,
}

impl<M: ManageResource> PoolCore<M> {
    pub(crate) fn new(
        manager: M,
        config: PoolConfiguration,
        runtime: Handle,
        events: UnboundedSender<Event<M::Resource>>,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            manager,
            config,
            runtime,
            events,
            idle: VecDeque::new(),
            busy: HashMap::new(),
            creating: HashSet::new(),
            requests: VecDeque::new(),
            next_resource: 0,
            next_request: 0,
            timer_keys: TimerKeys::default(),
            scheduler: MatchScheduler::default(),
            metrics,
        }
    }

    /// Process events until the pool is shut down
    pub(crate) async fn run(mut self, mut events: UnboundedReceiver<Event<M::Resource>>) {
        'outer: while let Some(event) = events.recv().await {
            if self.apply(event).is_break() {
                break;
            }

            if self.scheduler.is_dirty() {
                // Let other tasks queue their triggers for this tick.
                tokio::task::yield_now().await;
            }

            while let Ok(event) = events.try_recv() {
                if self.apply(event).is_break() {
                    break 'outer;
                }
            }

            if self.scheduler.take() {
                self.match_requests();
            }
            self.publish_gauges();
        }

        self.shutdown();
    }

    fn apply(&mut self, event: Event<M::Resource>) -> ControlFlow<()> {
        match event {
            Event::Allocate(reply) => self.enqueue(reply),
            Event::Ready(id) => self.on_ready(id),
            Event::Failed(id) => {
                if self.evict(id, Eviction::Failed) {
                    self.scheduler.request();
                }
            }
            Event::BusyExpired(id, key) => {
                let current = self.busy.get(&id).map(|entry| entry.timer.key());
                if current == Some(key) {
                    self.metrics.busy_timeouts.fetch_add(1, Ordering::Relaxed);
                    self.evict(id, Eviction::BusyTimeout);
                    self.scheduler.request();
                }
            }
            Event::IdleExpired(id, key) => {
                let current = self
                    .idle
                    .iter()
                    .find(|entry| entry.id == id)
                    .map(|entry| entry.timer.key());
                if current == Some(key) {
                    self.metrics.idle_timeouts.fetch_add(1, Ordering::Relaxed);
                    self.evict(id, Eviction::IdleTimeout);
                }
            }
            Event::RequestExpired(request_id) => self.expire_request(request_id),
            Event::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn enqueue(&mut self, reply: Reply<M::Resource>) {
        let id = self.next_request;
        self.next_request += 1;
        self.log(LogLevel::Debug, format_args!("allocating new resource request {id}"));

        let events = self.events.clone();
        let timer = Timer::arm(&self.runtime, id, self.config.request_timeout, move || {
            let _ = events.send(Event::RequestExpired(id));
        });

        self.requests.push_back(Request { id, reply, timer });
        self.scheduler.request();
    }

    fn expire_request(&mut self, request_id: u64) {
        let Some(position) = self.requests.iter().position(|r| r.id == request_id) else {
            return;
        };
        if let Some(request) = self.requests.remove(position) {
            if request.reply.is_closed() {
                self.log(
                    LogLevel::Debug,
                    format_args!("dropped abandoned request {request_id} at its deadline"),
                );
                return;
            }
            self.metrics.request_timeouts.fetch_add(1, Ordering::Relaxed);
            self.log(
                LogLevel::Info,
                format_args!("request {request_id} timed out after {:?}", self.config.request_timeout),
            );
            let _ = request
                .reply
                .send(Err(PoolError::RequestTimeout(self.config.request_timeout)));
        }
    }

    fn on_ready(&mut self, id: ResourceId) {
        let Some(mut entry) = self.busy.remove(&id) else {
            self.log(LogLevel::Debug, format_args!("ignoring readiness of resource {id}, not busy"));
            return;
        };

        self.creating.remove(&id);
        self.log(
            LogLevel::Info,
            format_args!("ready callback for resource {} : {id}", entry.resource.kind()),
        );
        entry.timer = self.arm_idle_timer(id);
        entry.state = Lifecycle::Idle;
        self.idle.push_back(entry);
        self.scheduler.request();
    }

    /// One matching pass: hand idle resources to waiting requests, then
    /// create resources for the demand that is left, within capacity.
    fn match_requests(&mut self) {
        self.log(LogLevel::Debug, format_args!("started request processing"));

        let before = self.requests.len();
        self.requests.retain(|request| !request.reply.is_closed());
        if self.requests.len() < before {
            self.log(
                LogLevel::Debug,
                format_args!("dropped {} abandoned requests", before - self.requests.len()),
            );
        }

        while !self.requests.is_empty() && !self.idle.is_empty() {
            let Some(request) = self.requests.pop_front() else {
                break;
            };
            let Some(mut entry) = self.take_idle() else {
                self.requests.push_front(request);
                break;
            };

            let handle = ResourceHandle::new(entry.id, Arc::clone(&entry.resource));
            let Request { id: request_id, reply, timer } = request;
            timer.cancel();

            if reply.send(Ok(handle)).is_err() {
                self.log(
                    LogLevel::Debug,
                    format_args!("request {request_id} went away, keeping resource {} idle", entry.id),
                );
                self.restore_idle(entry);
                continue;
            }

            let id = entry.id;
            entry.timer = self.arm_busy_timer(id);
            entry.state = Lifecycle::Busy;
            self.log(
                LogLevel::Info,
                format_args!("allocated request {request_id} to idle resource {} : {id}", entry.resource.kind()),
            );
            self.busy.insert(id, entry);
            self.metrics.total_allocated.fetch_add(1, Ordering::Relaxed);
        }

        let capacity = self.config.max_count.saturating_sub(self.busy.len());
        let demand = self.requests.len().saturating_sub(self.creating.len());
        for _ in 0..capacity.min(demand) {
            self.create_resource();
        }

        debug_assert!(self.busy.len() <= self.config.max_count);
        debug_assert!(self.idle.iter().all(|entry| !self.busy.contains_key(&entry.id)));
        self.log(LogLevel::Debug, format_args!("ended request processing"));
    }

    fn take_idle(&mut self) -> Option<Entry<M::Resource>> {
        match self.config.queue_strategy {
            QueueStrategy::Fifo => self.idle.pop_front(),
            QueueStrategy::Lifo => self.idle.pop_back(),
        }
    }

    fn restore_idle(&mut self, entry: Entry<M::Resource>) {
        match self.config.queue_strategy {
            QueueStrategy::Fifo => self.idle.push_front(entry),
            QueueStrategy::Lifo => self.idle.push_back(entry),
        }
    }

    fn create_resource(&mut self) {
        let id = ResourceId(self.next_resource);
        self.next_resource += 1;

        let resource = Arc::new(self.manager.create());
        self.log(
            LogLevel::Info,
            format_args!("new resource object {} : {id}", resource.kind()),
        );

        let timer = self.arm_busy_timer(id);
        self.creating.insert(id);
        self.metrics.total_created.fetch_add(1, Ordering::Relaxed);

        let ready_events = self.events.clone();
        let failed_events = self.events.clone();
        let ready = resource.on_ready(Arc::new(move || {
            let _ = ready_events.send(Event::Ready(id));
        }));
        let failed = resource.on_failed(Arc::new(move || {
            let _ = failed_events.send(Event::Failed(id));
        }));

        self.busy.insert(
            id,
            Entry {
                id,
                resource,
                state: Lifecycle::Busy,
                timer,
                subscriptions: [ready, failed],
            },
        );
    }

    /// Close a resource and forget it. Returns false if the pool no longer
    /// manages `id`.
    fn evict(&mut self, id: ResourceId, cause: Eviction) -> bool {
        let entry = match self.busy.remove(&id) {
            Some(entry) => entry,
            None => {
                let position = self.idle.iter().position(|entry| entry.id == id);
                match position.and_then(|p| self.idle.remove(p)) {
                    Some(entry) => entry,
                    None => return false,
                }
            }
        };
        self.creating.remove(&id);

        let Entry {
            resource,
            state,
            timer,
            subscriptions,
            ..
        } = entry;
        self.log(
            cause.level(),
            format_args!("evicting {state} resource {} : {id} ({cause})", resource.kind()),
        );

        self.close(id, resource);
        timer.cancel();
        for subscription in subscriptions {
            subscription.cancel();
        }
        true
    }

    /// Run `close` on its own task. Errors and panics are logged, never
    /// propagated.
    fn close(&self, id: ResourceId, resource: Arc<M::Resource>) {
        self.metrics.total_closed.fetch_add(1, Ordering::Relaxed);
        let sink = self.config.log_sink.clone();
        let metrics = Arc::clone(&self.metrics);
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let closing = runtime.spawn(async move {
                resource.close().await.map_err(|err| err.to_string())
            });

            let failure = match closing.await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(join) => Some(format!("close task failed: {join}")),
            };

            match failure {
                None => log::emit(
                    sink.as_deref(),
                    LogLevel::Debug,
                    format_args!("closed resource {id}"),
                ),
                Some(err) => {
                    metrics.close_failures.fetch_add(1, Ordering::Relaxed);
                    log::emit(
                        sink.as_deref(),
                        LogLevel::Error,
                        format_args!("error calling resource close method for {id}: {err}"),
                    );
                }
            }
        });
    }

    fn arm_busy_timer(&mut self, id: ResourceId) -> Timer {
        let key = self.timer_keys.next();
        let events = self.events.clone();
        Timer::arm(&self.runtime, key, self.config.busy_timeout, move || {
            let _ = events.send(Event::BusyExpired(id, key));
        })
    }

    fn arm_idle_timer(&mut self, id: ResourceId) -> Timer {
        let key = self.timer_keys.next();
        let events = self.events.clone();
        Timer::arm(&self.runtime, key, self.config.idle_timeout, move || {
            let _ = events.send(Event::IdleExpired(id, key));
        })
    }

    fn publish_gauges(&self) {
        self.metrics.busy.store(self.busy.len(), Ordering::Relaxed);
        self.metrics.idle.store(self.idle.len(), Ordering::Relaxed);
        self.metrics.creating.store(self.creating.len(), Ordering::Relaxed);
        self.metrics
            .pending_requests
            .store(self.requests.len(), Ordering::Relaxed);
        let (triggers, passes) = self.scheduler.stats();
        self.metrics.match_triggers.store(triggers as usize, Ordering::Relaxed);
        self.metrics.match_passes.store(passes as usize, Ordering::Relaxed);
    }

    /// Idle resources belong to nobody else, so they are closed. Busy ones
    /// are detached and left to their borrowers. Waiting requests fail with
    /// `PoolError::Closed` once their reply channels drop.
    fn shutdown(&mut self) {
        self.log(
            LogLevel::Info,
            format_args!(
                "pool shutting down: {} idle, {} busy, {} waiting",
                self.idle.len(),
                self.busy.len(),
                self.requests.len()
            ),
        );

        let idle: Vec<ResourceId> = self.idle.iter().map(|entry| entry.id).collect();
        for id in idle {
            self.evict(id, Eviction::Shutdown);
        }
        self.busy.clear();
        self.creating.clear();
        self.requests.clear();
        self.publish_gauges();
    }

    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        log::emit(self.config.log_sink.as_deref(), level, args);
    }
}
