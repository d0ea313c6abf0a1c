//! The remote execution fabric trait and the typed actor layer on top of it.

use crate::error::{BoxError, RemoteError, RemoteResult};
use crate::handle::{ActorRef, RemoteFuture, WorkerId};
use crate::priority::Priority;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased value living on a worker or crossing back from one.
pub type Payload = Box<dyn Any + Send>;

/// Builds the state of a remote object on its worker.
pub type Constructor = Box<dyn FnOnce() -> Result<Payload, BoxError> + Send>;

/// Method invoked against the state of a remote object.
pub type Method = Box<dyn FnOnce(&mut (dyn Any + Send)) -> Payload + Send>;

/// One-shot unit of work for the task lane.
pub type Task = Box<dyn FnOnce() -> Result<Payload, BoxError> + Send>;

/// Operational state reported by a fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricStatus {
    /// Accepting work
    Running,
    /// Shut down; nothing will run
    Closed,
}

/// Remote execution primitive supporting stateful remote objects.
///
/// Every cross-boundary operation returns a [`RemoteFuture`] that has to be
/// resolved explicitly. Method invocations on an object return a further
/// handle, so dispatch never blocks the caller.
pub trait Fabric: Send + Sync {
    /// Current operational state.
    fn status(&self) -> FabricStatus;

    /// Place a new stateful object on a live worker and queue its
    /// construction at `priority`.
    ///
    /// The returned reference holds one reference count.
    fn spawn_actor(&self, constructor: Constructor, priority: Priority) -> RemoteResult<ActorRef>;

    /// Like [`Fabric::spawn_actor`], but on a chosen worker.
    ///
    /// Fails with [`RemoteError::WorkerLost`] if that worker is not alive.
    fn spawn_actor_on(
        &self,
        worker: WorkerId,
        constructor: Constructor,
        priority: Priority,
    ) -> RemoteResult<ActorRef>;

    /// Wait for the construction outcome of an object.
    fn resolve(&self, actor: &ActorRef) -> RemoteFuture<()>;

    /// Invoke a method on a constructed object.
    fn invoke(&self, actor: &ActorRef, method: Method) -> RemoteFuture<Payload>;

    /// Queue one-shot work at `priority`.
    fn submit(&self, task: Task, priority: Priority) -> RemoteFuture<Payload>;

    /// Take an additional reference count. Returns `false` if the object is
    /// already gone.
    fn retain(&self, actor: &ActorRef) -> bool;

    /// Drop a reference count; the object is discarded at zero.
    fn release(&self, actor: &ActorRef);
}

/// Wrap a typed constructor for [`Fabric::spawn_actor`].
pub fn constructor<T, E, F>(f: F) -> Constructor
where
    T: Send + 'static,
    E: Into<BoxError>,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    Box::new(move || f().map(|value| Box::new(value) as Payload).map_err(Into::into))
}

/// Invoke a typed method on an object without taking a reference count.
pub fn call<T, R, F>(fabric: &dyn Fabric, actor: &ActorRef, f: F) -> RemoteFuture<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut T) -> R + Send + 'static,
{
    let id = actor.id;
    let method: Method = Box::new(move |state: &mut (dyn Any + Send)| -> Payload {
        match state.downcast_mut::<T>() {
            Some(state) => Box::new(Ok::<R, RemoteError>(f(state))),
            None => Box::new(Err::<R, RemoteError>(RemoteError::TypeMismatch(id))),
        }
    });

    fabric.invoke(actor, method).map(move |payload| {
        match payload.downcast::<RemoteResult<R>>() {
            Ok(result) => *result,
            Err(_) => Err(RemoteError::TypeMismatch(id)),
        }
    })
}

/// Owning, typed handle to a remote object.
///
/// Holds one reference count on the object for as long as it lives.
pub struct Actor<T> {
    actor: ActorRef,
    fabric: Arc<dyn Fabric>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Actor<T> {
    /// Take ownership of a reference count the caller already holds.
    pub fn from_owned(actor: ActorRef, fabric: Arc<dyn Fabric>) -> Self {
        Self {
            actor,
            fabric,
            _marker: PhantomData,
        }
    }

    /// Spawn a new object and wrap it.
    pub fn spawn<E, F>(fabric: Arc<dyn Fabric>, f: F, priority: Priority) -> RemoteResult<Self>
    where
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let actor = fabric.spawn_actor(constructor(f), priority)?;
        Ok(Self::from_owned(actor, fabric))
    }

    /// Spawn a new object on `worker` and wrap it.
    pub fn spawn_on<E, F>(
        fabric: Arc<dyn Fabric>,
        worker: WorkerId,
        f: F,
        priority: Priority,
    ) -> RemoteResult<Self>
    where
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let actor = fabric.spawn_actor_on(worker, constructor(f), priority)?;
        Ok(Self::from_owned(actor, fabric))
    }

    /// The untyped reference.
    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    /// Wait for construction to finish.
    pub fn resolve(&self) -> RemoteFuture<()> {
        self.fabric.resolve(&self.actor)
    }

    /// Run `f` against the remote state.
    ///
    /// # Examples
    ///
    /// ```
    /// use singleton_fabric::{Actor, ClusterConfig, LocalCluster, Priority};
    /// use std::convert::Infallible;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let cluster = LocalCluster::new(ClusterConfig::default());
    /// let counter = Actor::spawn(cluster.fabric(), || Ok::<_, Infallible>(1u32), Priority::NORMAL).unwrap();
    ///
    /// let value = counter.call(|n| { *n += 1; *n }).await.unwrap();
    /// assert_eq!(value, 2);
    /// # }
    /// ```
    pub fn call<R, F>(&self, f: F) -> RemoteFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        call::<T, R, F>(self.fabric.as_ref(), &self.actor, f)
    }
}

impl<T> Clone for Actor<T> {
    fn clone(&self) -> Self {
        // A failed retain means the object is gone; the clone then resolves
        // to the same error as the original.
        self.fabric.retain(&self.actor);
        Self {
            actor: self.actor,
            fabric: self.fabric.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Actor<T> {
    fn drop(&mut self) {
        self.fabric.release(&self.actor);
    }
}

impl<T> fmt::Debug for Actor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor").field("actor", &self.actor).finish()
    }
}

impl<T> PartialEq for Actor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.actor == other.actor
    }
}
