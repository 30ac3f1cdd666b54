//! Readiness and failure signals
//!
//! A [`Signal`] is a small observer list. Resources embed one per event
//! kind (usually through [`ResourceSignals`]) and the pool subscribes to
//! them while it manages the resource.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Callback invoked when a signal fires
pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SignalState {
    listeners: Vec<(u64, Listener)>,
    next_key: u64,
    latched: bool,
}

/// A broadcast event that listeners can subscribe to.
///
/// An emission made while nobody is listening is latched and delivered to
/// the next subscriber, so a resource that becomes ready before the pool
/// subscribes does not lose its signal.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::Signal;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let signal = Signal::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
///
/// let subscription = signal.subscribe(Arc::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// signal.emit();
/// subscription.cancel();
/// signal.emit();
///
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct Signal {
    state: Arc<Mutex<SignalState>>,
}

impl Signal {
    /// Create a signal with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener until the returned subscription is cancelled or dropped
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let (key, deliver_latched) = {
            let mut state = self.state.lock();
            let key = state.next_key;
            state.next_key += 1;
            state.listeners.push((key, Arc::clone(&listener)));
            (key, std::mem::take(&mut state.latched))
        };

        if deliver_latched {
            listener();
        }

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || Self::unsubscribe(&state, key))
    }

    /// Notify every current listener, returning how many were notified
    pub fn emit(&self) -> usize {
        let listeners: Vec<Listener> = {
            let mut state = self.state.lock();
            if state.listeners.is_empty() {
                state.latched = true;
                return 0;
            }
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        // Listeners run outside the lock so they may unsubscribe themselves.
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn unsubscribe(state: &Weak<Mutex<SignalState>>, key: u64) {
        if let Some(state) = state.upgrade() {
            state.lock().listeners.retain(|(k, _)| *k != key);
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Signal")
            .field("listeners", &state.listeners.len())
            .field("latched", &state.latched)
            .finish()
    }
}

/// Cancellable registration of a listener.
///
/// Dropping the subscription cancels it.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an unsubscribe action
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener now
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The ready/failed signal pair a pooled resource exposes
#[derive(Clone, Debug, Default)]
pub struct ResourceSignals {
    ready: Signal,
    failed: Signal,
}

impl ResourceSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that the resource can be handed out again
    pub fn emit_ready(&self) -> usize {
        self.ready.emit()
    }

    /// Report that the resource is broken and must be evicted
    pub fn emit_failed(&self) -> usize {
        self.failed.emit()
    }

    pub fn on_ready(&self, listener: Listener) -> Subscription {
        self.ready.subscribe(listener)
    }

    pub fn on_failed(&self, listener: Listener) -> Subscription {
        self.failed.subscribe(listener)
    }

    /// Listeners registered on both signals together
    pub fn listener_count(&self) -> usize {
        self.ready.listener_count() + self.failed.listener_count()
    }
}
