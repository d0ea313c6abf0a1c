//! Error types for remote execution.

use crate::handle::WorkerId;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Boxed error produced by remote user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote execution errors.
///
/// Cloneable so that every resolver of the same remote object observes the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The worker hosting the object or task died
    #[error("Worker holding actor was lost: {0}")]
    WorkerLost(WorkerId),

    /// Remote code returned an error; the original error is preserved
    #[error("Remote call failed: {0}")]
    Failed(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// Remote code panicked
    #[error("Remote call panicked: {0}")]
    Panicked(String),

    /// The object was released or never existed
    #[error("Unknown actor: {0}")]
    UnknownActor(Uuid),

    /// A typed call was made against an object of another type
    #[error("Actor {0} does not hold the requested type")]
    TypeMismatch(Uuid),

    /// No live worker is available for placement
    #[error("No workers available")]
    NoWorkers,

    /// The fabric has been shut down
    #[error("Fabric closed")]
    Closed,
}

impl RemoteError {
    /// Wrap an error returned by remote user code.
    pub fn failed(err: BoxError) -> Self {
        Self::Failed(Arc::from(err))
    }

    /// Check if this error indicates the hosting worker died.
    pub fn is_worker_lost(&self) -> bool {
        matches!(self, Self::WorkerLost(_))
    }

    /// Check if retrying against a fresh object can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WorkerLost(_) | Self::UnknownActor(_))
    }

    /// Check if this error came from user code (error or panic).
    pub fn is_user_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }

    /// Check if the fabric itself is unusable.
    pub fn is_fabric_down(&self) -> bool {
        matches!(self, Self::Closed | Self::NoWorkers)
    }

    /// The error returned by remote user code, if any.
    pub fn user_error(&self) -> Option<&Arc<dyn std::error::Error + Send + Sync>> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}
