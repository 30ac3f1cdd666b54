//! Resource capability contract and the handles the pool gives out

use crate::signal::{Listener, Subscription};

use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Identity assigned to each resource when the pool creates it.
///
/// Identities are monotonic per pool, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a type must support to be managed by a [`Pool`](crate::Pool).
///
/// A resource reports readiness whenever it can be handed out again
/// (including once right after construction), reports failure whenever it
/// must be thrown away, and releases whatever it holds on `close`.
/// [`ResourceSignals`](crate::ResourceSignals) implements the two
/// subscription methods for you.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Error produced by `close`. It is logged and never propagated.
    type Error: fmt::Display + Send + 'static;

    /// Subscribe to the readiness signal
    fn on_ready(&self, listener: Listener) -> Subscription;

    /// Subscribe to the failure signal
    fn on_failed(&self, listener: Listener) -> Subscription;

    /// Release the underlying resource
    async fn close(&self) -> Result<(), Self::Error>;

    /// Name used in log records
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Creates resources for a pool.
///
/// Any `Fn() -> R` closure is a manager. Use [`factory_with_args`] to
/// keep constructor arguments next to the constructor.
pub trait ManageResource: Send + Sync + 'static {
    /// The resource type this manager creates
    type Resource: Resource;

    /// Construct a new resource. Construction failures are reported through
    /// the resource's failure signal.
    fn create(&self) -> Self::Resource;
}

impl<R, F> ManageResource for F
where
    R: Resource,
    F: Fn() -> R + Send + Sync + 'static,
{
    type Resource = R;

    fn create(&self) -> R {
        self()
    }
}

/// A manager that calls a constructor with stored arguments
pub struct FactoryWithArgs<A, F> {
    args: A,
    constructor: F,
}

impl<A, F> fmt::Debug for FactoryWithArgs<A, F>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryWithArgs")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl<A, R, F> ManageResource for FactoryWithArgs<A, F>
where
    A: Send + Sync + 'static,
    R: Resource,
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    type Resource = R;

    fn create(&self) -> R {
        (self.constructor)(&self.args)
    }
}

/// Build a manager from a constructor and the arguments passed to every call
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{factory_with_args, ManageResource, Resource, ResourceSignals};
/// use esox_resourcepool::{Listener, Subscription};
///
/// struct Worker { name: String, signals: ResourceSignals }
///
/// #[async_trait::async_trait]
/// impl Resource for Worker {
///     type Error = std::convert::Infallible;
///     fn on_ready(&self, l: Listener) -> Subscription { self.signals.on_ready(l) }
///     fn on_failed(&self, l: Listener) -> Subscription { self.signals.on_failed(l) }
///     async fn close(&self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// let manager = factory_with_args(String::from("worker"), |name: &String| Worker {
///     name: name.clone(),
///     signals: ResourceSignals::new(),
/// });
/// assert_eq!(manager.create().name, "worker");
/// ```
pub fn factory_with_args<A, R, F>(args: A, constructor: F) -> FactoryWithArgs<A, F>
where
    F: Fn(&A) -> R,
{
    FactoryWithArgs { args, constructor }
}

/// A resource on loan from the pool.
///
/// The handle does not return the resource when dropped: the resource goes
/// back to the idle set when it emits its readiness signal.
pub struct ResourceHandle<R> {
    id: ResourceId,
    resource: Arc<R>,
}

impl<R> ResourceHandle<R> {
    pub(crate) fn new(id: ResourceId, resource: Arc<R>) -> Self {
        Self { id, resource }
    }

    /// Identity the pool assigned to this resource
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Shared reference to the underlying resource
    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    /// Whether both handles point at the same resource
    pub fn same_resource(&self, other: &ResourceHandle<R>) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<R> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<R> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
