//! Per-call options for [`Coordinator::get_with`](crate::Coordinator::get_with).

use crate::shell::TtlPolicy;
use singleton_fabric::Priority;
use std::time::Duration;

/// Options for a singleton lookup.
///
/// # Examples
///
/// ```
/// use singleton_core::GetOptions;
/// use singleton_fabric::Priority;
/// use std::time::Duration;
///
/// let options = GetOptions::new()
///     .ttl_create(Duration::from_secs(600))
///     .ttl_get(Duration::from_secs(60))
///     .priority(Priority::NORMAL);
///
/// assert_eq!(options.ttl_policy().ttl_get, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Replace the singleton once it is this old (zero disables)
    pub ttl_create: Duration,

    /// Replace the singleton once it went unused this long (zero disables)
    pub ttl_get: Duration,

    /// Creation priority; falls back to the task context, then the config
    pub priority: Option<Priority>,
}

impl GetOptions {
    /// Options with no expiry and the default priority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum age.
    pub fn ttl_create(mut self, ttl: Duration) -> Self {
        self.ttl_create = ttl;
        self
    }

    /// Set the maximum idle time.
    pub fn ttl_get(mut self, ttl: Duration) -> Self {
        self.ttl_get = ttl;
        self
    }

    /// Set the creation priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// The expiry rules these options describe.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(self.ttl_create, self.ttl_get)
    }

    /// Effective creation priority.
    pub(crate) fn resolve_priority(&self, default: Priority) -> Priority {
        self.priority.or_else(Priority::current).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_never_expire() {
        let options = GetOptions::new();
        assert_eq!(options.ttl_policy(), TtlPolicy::NEVER);
        assert_eq!(options.priority, None);
    }

    #[tokio::test]
    async fn test_priority_resolution_order() {
        let implicit = GetOptions::new();
        let explicit = GetOptions::new().priority(Priority(-1));

        assert_eq!(implicit.resolve_priority(Priority::SINGLETON), Priority::SINGLETON);
        assert_eq!(explicit.resolve_priority(Priority::SINGLETON), Priority(-1));

        Priority(7)
            .scope(async {
                assert_eq!(implicit.resolve_priority(Priority::SINGLETON), Priority(7));
                assert_eq!(explicit.resolve_priority(Priority::SINGLETON), Priority(-1));
            })
            .await;
    }
}
