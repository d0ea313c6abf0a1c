//! Remote references and resolvable handles.

use crate::error::{RemoteError, RemoteResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Worker identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Reference to a stateful object hosted on a worker.
///
/// A plain value: it can be stored in a slot and read back by another
/// caller. Whether the object is still alive is only known by resolving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    /// Object identifier
    pub id: Uuid,

    /// Hosting worker
    pub worker: WorkerId,
}

impl ActorRef {
    /// Create a reference to a fresh object on `worker`.
    pub fn new(worker: WorkerId) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker,
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.worker)
    }
}

/// Explicitly resolvable handle for the outcome of a remote call.
///
/// Nothing crosses the boundary until the handle is awaited or
/// [`RemoteFuture::result`] is called.
#[must_use = "remote results are only observed when resolved"]
pub struct RemoteFuture<T> {
    inner: BoxFuture<'static, RemoteResult<T>>,
}

impl<T: Send + 'static> RemoteFuture<T> {
    /// Wrap a future producing the remote outcome.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        Self { inner: fut.boxed() }
    }

    /// A handle that is already resolved.
    pub fn ready(result: RemoteResult<T>) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// A handle resolved by a oneshot reply.
    ///
    /// A dropped sender means the worker went away before replying.
    pub fn from_reply(rx: oneshot::Receiver<RemoteResult<T>>, lost: RemoteError) -> Self {
        Self::new(async move { rx.await.unwrap_or(Err(lost)) })
    }

    /// Resolve the handle.
    pub async fn result(self) -> RemoteResult<T> {
        self.inner.await
    }

    /// Resolve the handle, giving up after `timeout`.
    ///
    /// Returns `None` when the timeout elapsed first.
    pub async fn result_timeout(self, timeout: Duration) -> Option<RemoteResult<T>> {
        tokio::time::timeout(timeout, self.inner).await.ok()
    }

    /// Convert the successful outcome.
    pub fn map<U, F>(self, f: F) -> RemoteFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> RemoteResult<U> + Send + 'static,
    {
        RemoteFuture::new(async move { self.inner.await.and_then(f) })
    }
}

impl<T> Future for RemoteFuture<T> {
    type Output = RemoteResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for RemoteFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFuture").finish_non_exhaustive()
    }
}
