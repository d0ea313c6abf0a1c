//! Failure classification for published handles.

use singleton_fabric::RemoteError;

/// What the protocol does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Treat as absent and (re)create
    Miss,

    /// Surface to the caller
    Fatal,
}

/// Classify a failure met while resolving a handle someone else published.
///
/// A broken published handle is replaced rather than reported: its worker
/// died, its creator's constructor failed, or it was released. A fabric that
/// is down is fatal. Failures of a creation the caller runs itself never
/// pass through here; they always reach that caller, so constructor errors
/// are never swallowed.
///
/// # Examples
///
/// ```
/// use singleton_core::{Disposition, classify};
/// use singleton_fabric::{RemoteError, WorkerId};
///
/// assert_eq!(classify(&RemoteError::WorkerLost(WorkerId(0))), Disposition::Miss);
/// assert_eq!(classify(&RemoteError::Closed), Disposition::Fatal);
/// ```
pub fn classify(err: &RemoteError) -> Disposition {
    match err {
        RemoteError::Closed | RemoteError::NoWorkers => Disposition::Fatal,
        RemoteError::WorkerLost(_)
        | RemoteError::Failed(_)
        | RemoteError::Panicked(_)
        | RemoteError::UnknownActor(_)
        | RemoteError::TypeMismatch(_) => Disposition::Miss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use singleton_fabric::{ActorRef, WorkerId};

    #[derive(Debug, thiserror::Error)]
    #[error("nope")]
    struct Nope;

    #[test]
    fn test_broken_published_handles_are_misses() {
        let id = ActorRef::new(WorkerId(0)).id;
        let cases = [
            RemoteError::WorkerLost(WorkerId(1)),
            RemoteError::failed(Box::new(Nope)),
            RemoteError::Panicked("boom".into()),
            RemoteError::UnknownActor(id),
            RemoteError::TypeMismatch(id),
        ];

        for err in &cases {
            assert_eq!(classify(err), Disposition::Miss, "{err}");
        }
    }

    #[test]
    fn test_fabric_down_is_fatal() {
        assert_eq!(classify(&RemoteError::Closed), Disposition::Fatal);
        assert_eq!(classify(&RemoteError::NoWorkers), Disposition::Fatal);
    }
}
