//! TTL-tracking wrapper around a singleton's handle.
//!
//! A [`CacheShell`] lives on the fabric next to the object it wraps and is
//! only ever mutated through remote calls. Timestamps come from the clock of
//! the process hosting the shell, so no cross-node clock skew enters a TTL
//! decision. Expiry is evaluated lazily on [`CacheShell::cache_check`].

use singleton_fabric::ActorRef;
use std::time::{Duration, Instant};

/// Expiry rules for a singleton. `Duration::ZERO` disables a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Maximum age since creation
    pub ttl_create: Duration,

    /// Maximum idle time since the last successful check
    pub ttl_get: Duration,
}

impl TtlPolicy {
    /// A policy that never expires.
    pub const NEVER: TtlPolicy = TtlPolicy {
        ttl_create: Duration::ZERO,
        ttl_get: Duration::ZERO,
    };

    /// Create a policy from both rules.
    pub fn new(ttl_create: Duration, ttl_get: Duration) -> Self {
        Self {
            ttl_create,
            ttl_get,
        }
    }
}

/// Outcome of [`CacheShell::cache_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCheck {
    /// The wrapped handle is still valid
    Valid(ActorRef),

    /// The shell expired or holds nothing.
    ///
    /// `dropped` is the reference the shell let go of; whoever receives it
    /// releases the shell's reference count on it.
    Expired { dropped: Option<ActorRef> },
}

/// Point-in-time view of a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSnapshot {
    /// The wrapped handle, if any
    pub wrapped: Option<ActorRef>,

    /// Time since `init`
    pub age: Option<Duration>,

    /// Time since the last successful check
    pub idle: Option<Duration>,
}

impl ShellSnapshot {
    /// Whether the shell no longer wraps a handle.
    pub fn is_empty(&self) -> bool {
        self.wrapped.is_none()
    }
}

/// Remote-resident TTL record: `{wrapped_handle, created_at, last_get_at}`.
#[derive(Debug, Default)]
pub struct CacheShell {
    wrapped: Option<ActorRef>,
    created_at: Option<Instant>,
    last_get_at: Option<Instant>,
}

impl CacheShell {
    /// Create an empty shell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `handle` and start both clocks.
    ///
    /// Returns whatever the shell wrapped before, which the caller must
    /// release.
    pub fn init(&mut self, handle: ActorRef, now: Instant) -> Option<ActorRef> {
        self.created_at = Some(now);
        self.last_get_at = Some(now);
        self.wrapped.replace(handle)
    }

    /// Check the TTL rules at `now`.
    ///
    /// On expiry the wrapped handle is dropped; otherwise the access clock
    /// is touched and the handle returned.
    pub fn cache_check(&mut self, policy: TtlPolicy, now: Instant) -> CacheCheck {
        let (Some(handle), Some(created_at), Some(last_get_at)) =
            (self.wrapped, self.created_at, self.last_get_at)
        else {
            return CacheCheck::Expired {
                dropped: self.wrapped.take(),
            };
        };

        let expired_by_age = !policy.ttl_create.is_zero()
            && now.saturating_duration_since(created_at) >= policy.ttl_create;
        let expired_by_idle = !policy.ttl_get.is_zero()
            && now.saturating_duration_since(last_get_at) >= policy.ttl_get;

        if expired_by_age || expired_by_idle {
            return CacheCheck::Expired {
                dropped: self.wrapped.take(),
            };
        }

        self.last_get_at = Some(now);
        CacheCheck::Valid(handle)
    }

    /// Let go of the wrapped handle.
    pub fn discard(&mut self) -> Option<ActorRef> {
        self.wrapped.take()
    }

    /// Current state relative to `now`.
    pub fn snapshot(&self, now: Instant) -> ShellSnapshot {
        ShellSnapshot {
            wrapped: self.wrapped,
            age: self
                .created_at
                .map(|at| now.saturating_duration_since(at)),
            idle: self
                .last_get_at
                .map(|at| now.saturating_duration_since(at)),
        }
    }
}
