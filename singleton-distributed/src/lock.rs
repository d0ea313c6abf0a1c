//! Lease-based distributed locks

use crate::error::{LockError, LockResult};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Backend for time-bounded exclusive leases.
///
/// A lease is identified by its key and owned by whoever presented the
/// matching token. An expired lease is free to be taken by anyone.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease if it is free or expired.
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool>;

    /// Extend the lease if `token` still owns it.
    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool>;

    /// Give the lease up if `token` still owns it.
    async fn release(&self, key: &str, token: &str) -> LockResult<bool>;

    /// Current owner token, if the lease is held.
    async fn holder(&self, key: &str) -> LockResult<Option<String>>;
}

/// Lock guard that releases the lease on drop.
///
/// While the guard is alive a heartbeat renews the lease every third of
/// its TTL, so a live holder never loses the lock to expiry. If the holder
/// dies without releasing, the lease lapses after at most one TTL.
pub struct LockGuard {
    key: String,
    token: String,
    store: Arc<dyn LeaseStore>,
    heartbeat: Option<JoinHandle<()>>,
    released: bool,
}

impl LockGuard {
    fn new(key: String, token: String, ttl: Duration, store: Arc<dyn LeaseStore>) -> Self {
        let heartbeat = tokio::spawn(heartbeat(
            key.clone(),
            token.clone(),
            ttl,
            store.clone(),
        ));

        Self {
            key,
            token,
            store,
            heartbeat: Some(heartbeat),
            released: false,
        }
    }

    /// Lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token identifying this holder
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Manually release the lock
    pub async fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.stop_heartbeat();

        if self.store.release(&self.key, &self.token).await? {
            debug!(key = %self.key, "Released lock");
            Ok(())
        } else {
            warn!(key = %self.key, "Failed to release lock (not held or expired)");
            Err(LockError::NotHeld)
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.stop_heartbeat();
        if self.released {
            return;
        }

        // Best effort release on drop
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "No runtime to release lock; lease will expire");
            return;
        };

        let key = self.key.clone();
        let token = self.token.clone();
        let store = self.store.clone();

        runtime.spawn(async move {
            match store.release(&key, &token).await {
                Ok(true) => debug!(key = %key, "Released lock on drop"),
                Ok(false) => trace!(key = %key, "Lock already gone on drop"),
                Err(e) => warn!(key = %key, error = %e, "Failed to release lock on drop"),
            }
        });
    }
}

async fn heartbeat(key: String, token: String, ttl: Duration, store: Arc<dyn LeaseStore>) {
    let interval = (ttl / 3).max(Duration::from_millis(1));

    loop {
        tokio::time::sleep(interval).await;

        match store.renew(&key, &token, ttl).await {
            Ok(true) => trace!(key = %key, "Renewed lock lease"),
            Ok(false) => {
                warn!(key = %key, "Lost lock lease");
                return;
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to renew lock lease"),
        }
    }
}

/// Distributed lock over a [`LeaseStore`]
#[derive(Clone)]
pub struct DistributedLock {
    key: String,
    ttl: Duration,
    retry_interval: Duration,
    store: Arc<dyn LeaseStore>,
}

impl DistributedLock {
    /// Create new lock
    ///
    /// # Examples
    ///
    /// ```
    /// use singleton_distributed::{DistributedLock, MemoryLeaseStore};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), singleton_distributed::LockError> {
    /// let store = Arc::new(MemoryLeaseStore::new());
    /// let lock = DistributedLock::new("my-resource", Duration::from_secs(30), store);
    ///
    /// let guard = lock.acquire().await?;
    /// assert!(lock.try_acquire().await?.is_none());
    /// guard.release().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(key: impl Into<String>, ttl: Duration, store: Arc<dyn LeaseStore>) -> Self {
        Self {
            key: key.into(),
            ttl,
            retry_interval: Duration::from_millis(100),
            store,
        }
    }

    /// Get the lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lease TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquire the lock, waiting as long as it takes
    pub async fn acquire(&self) -> LockResult<LockGuard> {
        loop {
            match self.try_acquire().await? {
                Some(guard) => return Ok(guard),
                None => tokio::time::sleep(self.backoff()).await,
            }
        }
    }

    /// Try to acquire the lock (non-blocking)
    pub async fn try_acquire(&self) -> LockResult<Option<LockGuard>> {
        let token = Uuid::new_v4().to_string();

        if self.store.try_acquire(&self.key, &token, self.ttl).await? {
            info!(key = %self.key, "Acquired lock");
            Ok(Some(LockGuard::new(
                self.key.clone(),
                token,
                self.ttl,
                self.store.clone(),
            )))
        } else {
            debug!(key = %self.key, "Failed to acquire lock (already held)");
            Ok(None)
        }
    }

    /// Acquire with timeout
    pub async fn acquire_timeout(&self, timeout: Duration) -> LockResult<LockGuard> {
        let start = tokio::time::Instant::now();

        loop {
            match self.try_acquire().await? {
                Some(guard) => return Ok(guard),
                None => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return Err(LockError::Timeout);
                    }
                    tokio::time::sleep(self.backoff().min(timeout - elapsed)).await;
                }
            }
        }
    }

    /// Check whether anyone holds the lock right now
    pub async fn is_held(&self) -> LockResult<bool> {
        Ok(self.store.holder(&self.key).await?.is_some())
    }

    // Retry interval plus up to 50% jitter, so waiters don't retry in lockstep.
    fn backoff(&self) -> Duration {
        let base = self.retry_interval.as_millis() as u64;
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}

/// Distributed lock builder
pub struct LockBuilder {
    key: String,
    ttl: Duration,
    retry_interval: Duration,
}

impl LockBuilder {
    /// Create new lock builder
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ttl: Duration::from_secs(30),
            retry_interval: Duration::from_millis(100),
        }
    }

    /// Set TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the base delay between acquisition attempts
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Build the lock
    pub fn build(self, store: Arc<dyn LeaseStore>) -> DistributedLock {
        let mut lock = DistributedLock::new(self.key, self.ttl, store);
        lock.retry_interval = self.retry_interval;
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryLeaseStore;

    fn memory_lock(key: &str, ttl: Duration) -> (DistributedLock, Arc<MemoryLeaseStore>) {
        let store = Arc::new(MemoryLeaseStore::new());
        let lock = LockBuilder::new(key)
            .with_ttl(ttl)
            .with_retry_interval(Duration::from_millis(10))
            .build(store.clone());
        (lock, store)
    }

    #[test]
    fn test_lock_builder() {
        let builder = LockBuilder::new("test-lock")
            .with_ttl(Duration::from_secs(60))
            .with_retry_interval(Duration::from_millis(20));

        assert_eq!(builder.key, "test-lock");
        assert_eq!(builder.ttl, Duration::from_secs(60));
        assert_eq!(builder.retry_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_backoff_bounds() {
        let (lock, _) = memory_lock("k", Duration::from_secs(1));
        for _ in 0..50 {
            let delay = lock.backoff();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(15));
        }
    }

    #[tokio::test]
    async fn test_exclusive_acquire() {
        let (lock, _) = memory_lock("exclusive", Duration::from_secs(5));

        let guard = lock.try_acquire().await.unwrap().unwrap();
        assert!(lock.try_acquire().await.unwrap().is_none());
        assert!(lock.is_held().await.unwrap());

        guard.release().await.unwrap();
        assert!(!lock.is_held().await.unwrap());
        assert!(lock.try_acquire().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_after_loss_reports_not_held() {
        let (lock, store) = memory_lock("lost", Duration::from_secs(5));

        let guard = lock.acquire().await.unwrap();
        store.release("lost", guard.token()).await.unwrap();

        assert!(matches!(guard.release().await, Err(LockError::NotHeld)));
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (lock, store) = memory_lock("dropped", Duration::from_secs(5));

        let guard = lock.acquire().await.unwrap();
        drop(guard);

        // Drop releases from a spawned task
        for _ in 0..100 {
            if store.holder("dropped").await.unwrap().is_none() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lock still held after guard drop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout() {
        let (lock, _) = memory_lock("busy", Duration::from_secs(60));
        let _guard = lock.acquire().await.unwrap();

        let result = lock.acquire_timeout(Duration::from_millis(250)).await;
        assert!(matches!(result, Err(LockError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_lease_alive() {
        let (lock, _) = memory_lock("held", Duration::from_millis(300));
        let guard = lock.acquire().await.unwrap();

        // Many TTLs later the lease is still ours
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(lock.try_acquire().await.unwrap().is_none());

        guard.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_lease_expires() {
        let (lock, store) = memory_lock("abandoned", Duration::from_millis(300));

        // A holder that died: the lease exists but nobody renews it
        assert!(store.try_acquire("abandoned", "dead", Duration::from_millis(300)).await.unwrap());
        assert!(lock.try_acquire().await.unwrap().is_none());

        let guard = lock.acquire_timeout(Duration::from_secs(1)).await.unwrap();
        assert_ne!(guard.token(), "dead");
    }
}
