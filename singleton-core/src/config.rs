//! Coordinator configuration types.

use crate::error::{SingletonError, SingletonResult};
use singleton_fabric::Priority;
use std::time::Duration;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Timeout for lookaside slot reads; a read that takes longer is a miss
    pub slot_read_timeout: Duration,

    /// Timeout for resolving a published shell's cache check
    pub check_timeout: Duration,

    /// Lease TTL of the per-name lock
    pub lock_ttl: Duration,

    /// Base delay between lock acquisition attempts
    pub lock_retry_interval: Duration,

    /// Creation priority when neither the call nor the task context sets one
    pub default_priority: Priority,

    /// Suffix appended to a name to form its lock key
    pub lock_suffix: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            slot_read_timeout: Duration::from_secs(1),
            check_timeout: Duration::from_secs(1),
            lock_ttl: Duration::from_secs(30),
            lock_retry_interval: Duration::from_millis(100),
            default_priority: Priority::SINGLETON,
            lock_suffix: "__singleton_lock".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults:
    /// - `SINGLETON_SLOT_READ_TIMEOUT_MS`
    /// - `SINGLETON_CHECK_TIMEOUT_MS`
    /// - `SINGLETON_LOCK_TTL_MS`
    /// - `SINGLETON_LOCK_RETRY_MS`
    /// - `SINGLETON_DEFAULT_PRIORITY`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_millis("SINGLETON_SLOT_READ_TIMEOUT_MS") {
            config.slot_read_timeout = ms;
        }

        if let Some(ms) = env_millis("SINGLETON_CHECK_TIMEOUT_MS") {
            config.check_timeout = ms;
        }

        if let Some(ms) = env_millis("SINGLETON_LOCK_TTL_MS") {
            config.lock_ttl = ms;
        }

        if let Some(ms) = env_millis("SINGLETON_LOCK_RETRY_MS") {
            config.lock_retry_interval = ms;
        }

        if let Ok(priority) = std::env::var("SINGLETON_DEFAULT_PRIORITY")
            && let Ok(priority) = priority.trim().parse::<i64>()
        {
            config.default_priority = Priority(priority);
        }

        config
    }

    /// Set the slot read timeout.
    pub fn with_slot_read_timeout(mut self, timeout: Duration) -> Self {
        self.slot_read_timeout = timeout;
        self
    }

    /// Set the cache check timeout.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Set the lock lease TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the lock retry interval.
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Set the default creation priority.
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Set the lock key suffix.
    pub fn with_lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_suffix = suffix.into();
        self
    }

    /// Lock key guarding `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use singleton_core::CoordinatorConfig;
    ///
    /// let config = CoordinatorConfig::default();
    /// assert_eq!(config.lock_key("model"), "model__singleton_lock");
    /// ```
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{}", name, self.lock_suffix)
    }

    /// Check the configuration for values the protocol cannot run with.
    pub fn validate(&self) -> SingletonResult<()> {
        // Leases are kept with millisecond precision
        if self.lock_ttl < Duration::from_millis(1) {
            return Err(SingletonError::Config(
                "lock_ttl must be at least 1ms".to_string(),
            ));
        }
        if self.lock_suffix.is_empty() {
            return Err(SingletonError::Config(
                "lock_suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.slot_read_timeout, Duration::from_secs(1));
        assert_eq!(config.check_timeout, Duration::from_secs(1));
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert_eq!(config.lock_retry_interval, Duration::from_millis(100));
        assert_eq!(config.default_priority, Priority::SINGLETON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CoordinatorConfig::new()
            .with_lock_ttl(Duration::from_secs(5))
            .with_lock_retry_interval(Duration::from_millis(10))
            .with_default_priority(Priority::NORMAL)
            .with_lock_suffix(":lock");

        assert_eq!(config.lock_ttl, Duration::from_secs(5));
        assert_eq!(config.default_priority, Priority::NORMAL);
        assert_eq!(config.lock_key("a"), "a:lock");
    }

    #[test]
    fn test_validate_rejects_sub_millisecond_ttl() {
        for ttl in [Duration::ZERO, Duration::from_micros(999)] {
            let config = CoordinatorConfig::new().with_lock_ttl(ttl);
            assert!(matches!(config.validate(), Err(SingletonError::Config(_))), "{ttl:?}");
        }

        let config = CoordinatorConfig::new().with_lock_ttl(Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        // SAFETY: no other test in this crate reads these variables
        unsafe {
            std::env::set_var("SINGLETON_LOCK_TTL_MS", "2500");
            std::env::set_var("SINGLETON_DEFAULT_PRIORITY", "-1");
            std::env::set_var("SINGLETON_CHECK_TIMEOUT_MS", "not a number");
        }

        let config = CoordinatorConfig::from_env();
        assert_eq!(config.lock_ttl, Duration::from_millis(2500));
        assert_eq!(config.default_priority, Priority(-1));
        assert_eq!(config.check_timeout, Duration::from_secs(1));

        unsafe {
            std::env::remove_var("SINGLETON_LOCK_TTL_MS");
            std::env::remove_var("SINGLETON_DEFAULT_PRIORITY");
            std::env::remove_var("SINGLETON_CHECK_TIMEOUT_MS");
        }
    }
}
