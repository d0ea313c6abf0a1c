//! In-process cluster of failure-prone workers.

use crate::error::{RemoteError, RemoteResult};
use crate::fabric::{Constructor, Fabric, FabricStatus, Method, Payload, Task};
use crate::handle::{ActorRef, RemoteFuture, WorkerId};
use crate::priority::Priority;
use crate::worker::Worker;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Cluster configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of workers started with the cluster
    pub workers: usize,

    /// Name used in log output
    pub name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            name: "local".to_string(),
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with `workers` workers.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the cluster name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

struct ClusterInner {
    config: ClusterConfig,
    workers: RwLock<Vec<Arc<Worker>>>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl ClusterInner {
    fn worker(&self, id: WorkerId) -> Option<Arc<Worker>> {
        self.workers.read().get(id.0).cloned()
    }

    /// Round robin over live workers.
    fn place(&self) -> RemoteResult<Arc<Worker>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RemoteError::Closed);
        }

        let workers = self.workers.read();
        let alive: Vec<&Arc<Worker>> = workers.iter().filter(|w| w.is_alive()).collect();
        if alive.is_empty() {
            return Err(RemoteError::NoWorkers);
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % alive.len();
        Ok(alive[idx].clone())
    }

    fn closed_future<T: Send + 'static>(&self) -> Option<RemoteFuture<T>> {
        self.closed
            .load(Ordering::Acquire)
            .then(|| RemoteFuture::ready(Err(RemoteError::Closed)))
    }
}

impl Fabric for ClusterInner {
    fn status(&self) -> FabricStatus {
        if self.closed.load(Ordering::Acquire) {
            FabricStatus::Closed
        } else {
            FabricStatus::Running
        }
    }

    fn spawn_actor(&self, constructor: Constructor, priority: Priority) -> RemoteResult<ActorRef> {
        let worker = self.place()?;
        let actor = ActorRef::new(worker.id());
        worker.host(actor.id, constructor, priority)?;
        debug!(cluster = %self.config.name, actor = %actor, priority = priority.0, "Actor placed");
        Ok(actor)
    }

    fn spawn_actor_on(
        &self,
        worker: WorkerId,
        constructor: Constructor,
        priority: Priority,
    ) -> RemoteResult<ActorRef> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RemoteError::Closed);
        }
        let host = self.worker(worker).ok_or(RemoteError::WorkerLost(worker))?;
        let actor = ActorRef::new(worker);
        host.host(actor.id, constructor, priority)?;
        debug!(cluster = %self.config.name, actor = %actor, priority = priority.0, "Actor placed");
        Ok(actor)
    }

    fn resolve(&self, actor: &ActorRef) -> RemoteFuture<()> {
        if let Some(closed) = self.closed_future() {
            return closed;
        }
        match self.worker(actor.worker) {
            Some(worker) => worker.resolve(actor.id),
            None => RemoteFuture::ready(Err(RemoteError::UnknownActor(actor.id))),
        }
    }

    fn invoke(&self, actor: &ActorRef, method: Method) -> RemoteFuture<Payload> {
        if let Some(closed) = self.closed_future() {
            return closed;
        }
        match self.worker(actor.worker) {
            Some(worker) => worker.invoke(actor.id, method),
            None => RemoteFuture::ready(Err(RemoteError::UnknownActor(actor.id))),
        }
    }

    fn submit(&self, task: Task, priority: Priority) -> RemoteFuture<Payload> {
        match self.place() {
            Ok(worker) => worker.submit(task, priority),
            Err(err) => RemoteFuture::ready(Err(err)),
        }
    }

    fn retain(&self, actor: &ActorRef) -> bool {
        self.worker(actor.worker)
            .is_some_and(|worker| worker.retain(actor.id))
    }

    fn release(&self, actor: &ActorRef) {
        if let Some(worker) = self.worker(actor.worker) {
            worker.release(actor.id);
        }
    }
}

impl Drop for ClusterInner {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().iter() {
            worker.kill();
        }
    }
}

/// In-process cluster of workers implementing [`Fabric`].
///
/// Each worker runs one task-lane job at a time, highest priority first,
/// and hosts stateful objects whose methods run outside the task lane.
/// Workers can be killed to exercise recovery from worker loss.
///
/// # Examples
///
/// ```
/// use singleton_fabric::{ClusterConfig, LocalCluster, Priority};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cluster = LocalCluster::new(ClusterConfig::new(1));
/// let answer = cluster.submit_fn(|| 6 * 7, Priority::NORMAL).await.unwrap();
/// assert_eq!(answer, 42);
/// # }
/// ```
#[derive(Clone)]
pub struct LocalCluster {
    inner: Arc<ClusterInner>,
}

impl LocalCluster {
    /// Start a cluster.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new(config: ClusterConfig) -> Self {
        let workers = (0..config.workers)
            .map(|i| Worker::start(WorkerId(i)))
            .collect();

        info!(cluster = %config.name, workers = config.workers, "Local cluster started");

        Self {
            inner: Arc::new(ClusterInner {
                config,
                workers: RwLock::new(workers),
                next: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The cluster as a shareable fabric.
    pub fn fabric(&self) -> Arc<dyn Fabric> {
        self.inner.clone()
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Start one more worker.
    pub fn add_worker(&self) -> WorkerId {
        let mut workers = self.inner.workers.write();
        let id = WorkerId(workers.len());
        workers.push(Worker::start(id));
        id
    }

    /// Kill a worker. Returns `false` if it was unknown or already dead.
    pub fn kill_worker(&self, id: WorkerId) -> bool {
        self.inner.worker(id).is_some_and(|worker| worker.kill())
    }

    /// Identifiers of all workers ever started.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.inner.workers.read().iter().map(|w| w.id()).collect()
    }

    /// Identifiers of live workers.
    pub fn alive_workers(&self) -> Vec<WorkerId> {
        self.inner
            .workers
            .read()
            .iter()
            .filter(|w| w.is_alive())
            .map(|w| w.id())
            .collect()
    }

    /// Number of objects currently hosted across live workers.
    pub fn actor_count(&self) -> usize {
        self.inner.workers.read().iter().map(|w| w.actor_count()).sum()
    }

    /// Shut the cluster down.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for worker in self.inner.workers.read().iter() {
            worker.kill();
        }
        info!(cluster = %self.inner.config.name, "Local cluster closed");
    }

    /// Get the operational state.
    pub fn status(&self) -> FabricStatus {
        self.inner.status()
    }

    /// Queue a typed one-shot function.
    pub fn submit_fn<R, F>(&self, f: F, priority: Priority) -> RemoteFuture<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        self.inner
            .submit(Box::new(move || Ok(Box::new(f()) as Payload)), priority)
            .map(|payload| {
                payload
                    .downcast::<R>()
                    .map(|value| *value)
                    .map_err(|_| RemoteError::Panicked("unexpected task output".to_string()))
            })
    }
}
