//! A single failure-prone worker: a priority task lane plus hosted objects.

use crate::error::{RemoteError, RemoteResult};
use crate::fabric::{Constructor, Method, Payload, Task};
use crate::handle::{RemoteFuture, WorkerId};
use crate::priority::Priority;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Construction state of a hosted object.
#[derive(Debug, Clone)]
enum ActorState {
    Pending,
    Ready,
    Failed(RemoteError),
}

struct ActorCell {
    state: watch::Sender<ActorState>,
    object: Arc<Mutex<Option<Payload>>>,
    refs: usize,
}

enum Job {
    Construct {
        actor: Uuid,
        constructor: Constructor,
    },
    Run {
        task: Task,
        reply: oneshot::Sender<RemoteResult<Payload>>,
    },
}

struct QueuedJob {
    priority: Priority,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher priority first, then earlier submission.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct Worker {
    id: WorkerId,
    alive: AtomicBool,
    seq: AtomicU64,
    queue: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    actors: Mutex<HashMap<Uuid, ActorCell>>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Start a worker. Must be called from within a Tokio runtime.
    pub(crate) fn start(id: WorkerId) -> Arc<Self> {
        let worker = Arc::new(Self {
            id,
            alive: AtomicBool::new(true),
            seq: AtomicU64::new(0),
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            actors: Mutex::new(HashMap::new()),
            runner: Mutex::new(None),
        });

        let handle = tokio::spawn(worker.clone().run());
        *worker.runner.lock() = Some(handle);
        debug!(worker = %id, "Worker started");
        worker
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn actor_count(&self) -> usize {
        self.actors.lock().len()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Simulate worker loss: queued work and hosted objects are gone.
    pub(crate) fn kill(&self) -> bool {
        if !self.alive.swap(false, AtomicOrdering::AcqRel) {
            return false;
        }

        if let Some(handle) = self.runner.lock().take() {
            handle.abort();
        }

        // Dropping reply senders resolves pending submissions as lost.
        let dropped_jobs = std::mem::take(&mut *self.queue.lock());

        let cells: Vec<ActorCell> = self.actors.lock().drain().map(|(_, cell)| cell).collect();
        for cell in &cells {
            cell.state
                .send_replace(ActorState::Failed(RemoteError::WorkerLost(self.id)));
            cell.object.lock().take();
        }

        warn!(
            worker = %self.id,
            jobs = dropped_jobs.len(),
            actors = cells.len(),
            "Worker lost"
        );
        true
    }

    /// Register an object and queue its construction.
    pub(crate) fn host(
        &self,
        actor: Uuid,
        constructor: Constructor,
        priority: Priority,
    ) -> RemoteResult<()> {
        if !self.is_alive() {
            return Err(RemoteError::WorkerLost(self.id));
        }

        let (state, _) = watch::channel(ActorState::Pending);
        self.actors.lock().insert(
            actor,
            ActorCell {
                state,
                object: Arc::new(Mutex::new(None)),
                refs: 1,
            },
        );
        self.enqueue(priority, Job::Construct { actor, constructor });
        Ok(())
    }

    /// Queue one-shot work on the task lane.
    pub(crate) fn submit(&self, task: Task, priority: Priority) -> RemoteFuture<Payload> {
        if !self.is_alive() {
            return RemoteFuture::ready(Err(RemoteError::WorkerLost(self.id)));
        }

        let (reply, rx) = oneshot::channel();
        self.enqueue(priority, Job::Run { task, reply });
        RemoteFuture::from_reply(rx, RemoteError::WorkerLost(self.id))
    }

    /// Wait for an object's construction outcome.
    pub(crate) fn resolve(self: &Arc<Self>, actor: Uuid) -> RemoteFuture<()> {
        if !self.is_alive() {
            return RemoteFuture::ready(Err(RemoteError::WorkerLost(self.id)));
        }

        let mut rx = match self.actors.lock().get(&actor) {
            Some(cell) => cell.state.subscribe(),
            None => return RemoteFuture::ready(Err(RemoteError::UnknownActor(actor))),
        };

        let worker = self.clone();
        RemoteFuture::new(async move {
            let outcome = match rx.wait_for(|s| !matches!(s, ActorState::Pending)).await {
                Ok(state) => match &*state {
                    ActorState::Ready => Ok(()),
                    ActorState::Failed(err) => Err(err.clone()),
                    ActorState::Pending => Err(RemoteError::UnknownActor(actor)),
                },
                Err(_) => Err(RemoteError::UnknownActor(actor)),
            };

            match outcome {
                Err(RemoteError::UnknownActor(_)) if !worker.is_alive() => {
                    Err(RemoteError::WorkerLost(worker.id))
                }
                other => other,
            }
        })
    }

    /// Run a method against a hosted object once it is constructed.
    ///
    /// Invocations bypass the task lane; calls on one object are serialized
    /// by its lock.
    pub(crate) fn invoke(self: &Arc<Self>, actor: Uuid, method: Method) -> RemoteFuture<Payload> {
        let object = match self.actors.lock().get(&actor) {
            Some(cell) => cell.object.clone(),
            None if !self.is_alive() => {
                return RemoteFuture::ready(Err(RemoteError::WorkerLost(self.id)));
            }
            None => return RemoteFuture::ready(Err(RemoteError::UnknownActor(actor))),
        };

        let constructed = self.resolve(actor);
        let worker = self.clone();
        RemoteFuture::new(async move {
            constructed.await?;

            let result = tokio::task::spawn_blocking(move || {
                let mut guard = object.lock();
                guard.as_mut().map(|state| method(&mut **state))
            })
            .await;

            match result {
                Err(err) => Err(RemoteError::Panicked(panic_message(err))),
                Ok(_) if !worker.is_alive() => Err(RemoteError::WorkerLost(worker.id)),
                Ok(Some(payload)) => Ok(payload),
                Ok(None) => Err(RemoteError::UnknownActor(actor)),
            }
        })
    }

    pub(crate) fn retain(&self, actor: Uuid) -> bool {
        if !self.is_alive() {
            return false;
        }

        match self.actors.lock().get_mut(&actor) {
            Some(cell) => {
                cell.refs += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release(&self, actor: Uuid) {
        let removed = {
            let mut actors = self.actors.lock();
            match actors.get_mut(&actor) {
                Some(cell) if cell.refs > 1 => {
                    cell.refs -= 1;
                    None
                }
                Some(_) => actors.remove(&actor),
                None => None,
            }
        };

        // Object state is dropped outside the table lock.
        if let Some(cell) = removed {
            trace!(worker = %self.id, actor = %actor, "Actor released");
            drop(cell);
        }
    }

    fn enqueue(&self, priority: Priority, job: Job) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.queue.lock().push(QueuedJob { priority, seq, job });
        self.notify.notify_one();
    }

    async fn run(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().pop();
            match next {
                Some(queued) => {
                    trace!(worker = %self.id, priority = queued.priority.0, seq = queued.seq, "Running job");
                    self.execute(queued.job).await;
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn execute(&self, job: Job) {
        match job {
            Job::Construct { actor, constructor } => {
                if !self.actors.lock().contains_key(&actor) {
                    trace!(worker = %self.id, actor = %actor, "Skipping construction of released actor");
                    return;
                }

                let outcome = run_blocking(constructor).await;

                let mut actors = self.actors.lock();
                if let Some(cell) = actors.get_mut(&actor) {
                    match outcome {
                        Ok(object) => {
                            *cell.object.lock() = Some(object);
                            cell.state.send_replace(ActorState::Ready);
                        }
                        Err(err) => {
                            debug!(worker = %self.id, actor = %actor, error = %err, "Actor construction failed");
                            cell.state.send_replace(ActorState::Failed(err));
                        }
                    }
                }
            }
            Job::Run { task, reply } => {
                let _ = reply.send(run_blocking(task).await);
            }
        }
    }
}

async fn run_blocking<F>(f: F) -> RemoteResult<Payload>
where
    F: FnOnce() -> Result<Payload, crate::error::BoxError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(err)) => Err(RemoteError::failed(err)),
        Err(err) => Err(RemoteError::Panicked(panic_message(err))),
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(panic) => {
            if let Some(msg) = panic.downcast_ref::<&str>() {
                (*msg).to_string()
            } else if let Some(msg) = panic.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
