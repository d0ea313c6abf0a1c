//! Error types for singleton operations.

use singleton_distributed::{LockError, SlotError};
use singleton_fabric::{RemoteError, WorkerId};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for singleton operations.
pub type SingletonResult<T> = Result<T, SingletonError>;

/// Errors surfaced to callers of the coordinator.
///
/// Lookup misses and lost workers behind already published singletons are
/// absorbed by the protocol and never show up here.
#[derive(Debug, Clone, Error)]
pub enum SingletonError {
    /// Singleton names must be non-empty
    #[error("Invalid singleton name: {0:?}")]
    InvalidName(String),

    /// The user constructor failed; the original error is preserved
    #[error("Singleton constructor failed: {0}")]
    Constructor(#[source] Arc<dyn StdError + Send + Sync>),

    /// The worker running a creation owned by this caller died
    #[error("Worker lost during singleton creation: {0}")]
    WorkerLost(WorkerId),

    /// The backend reports itself non-operational
    #[error("Coordination backend unserviceable: {0}")]
    BackendUnserviceable(String),

    /// Slot store failure
    #[error("Slot error: {0}")]
    Slot(Arc<SlotError>),

    /// Lock failure
    #[error("Lock error: {0}")]
    Lock(Arc<LockError>),

    /// Any other remote execution failure
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SingletonError {
    /// Check if this error came from the user constructor (error or panic).
    pub fn is_constructor_failure(&self) -> bool {
        matches!(
            self,
            Self::Constructor(_) | Self::Remote(RemoteError::Panicked(_))
        )
    }

    /// The error the user constructor returned, if any.
    pub fn constructor_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Constructor(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Downcast the constructor's error to its concrete type.
    ///
    /// # Examples
    ///
    /// ```
    /// use singleton_core::SingletonError;
    /// use std::sync::Arc;
    ///
    /// #[derive(Debug, thiserror::Error)]
    /// #[error("out of licenses")]
    /// struct NoLicense;
    ///
    /// let err = SingletonError::Constructor(Arc::new(NoLicense));
    /// assert!(err.downcast_constructor::<NoLicense>().is_some());
    /// ```
    pub fn downcast_constructor<E: StdError + 'static>(&self) -> Option<&E> {
        self.constructor_error()?.downcast_ref::<E>()
    }

    /// Check if the backend is unusable.
    pub fn is_unserviceable(&self) -> bool {
        matches!(self, Self::BackendUnserviceable(_))
    }

    /// Map a failure of a creation this caller owns.
    pub(crate) fn from_owned(err: RemoteError) -> Self {
        match err {
            RemoteError::Failed(err) => Self::Constructor(err),
            other => other.into(),
        }
    }
}

impl From<RemoteError> for SingletonError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::WorkerLost(worker) => Self::WorkerLost(worker),
            RemoteError::Closed | RemoteError::NoWorkers => {
                Self::BackendUnserviceable(err.to_string())
            }
            other => Self::Remote(other),
        }
    }
}

impl From<SlotError> for SingletonError {
    fn from(err: SlotError) -> Self {
        Self::Slot(Arc::new(err))
    }
}

impl From<LockError> for SingletonError {
    fn from(err: LockError) -> Self {
        Self::Lock(Arc::new(err))
    }
}
