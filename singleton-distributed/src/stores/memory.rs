//! In-memory slot and lease stores
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for a single
//! process sharing one store between coordinators, or for testing.

use crate::error::{LockResult, SlotResult};
use crate::lock::LeaseStore;
use crate::slot::{SlotLookup, SlotStore};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// In-memory slot store
pub struct MemorySlotStore {
    slots: DashMap<String, String>,
    read_delay: Duration,
}

impl MemorySlotStore {
    /// Create a new in-memory slot store
    pub fn new() -> Self {
        debug!("Creating new in-memory slot store");
        Self {
            slots: DashMap::new(),
            read_delay: Duration::ZERO,
        }
    }

    /// Simulate a slow backend: every read takes `delay` to complete.
    ///
    /// Reads whose timeout is shorter than the delay report a miss.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is populated
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for MemorySlotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn get_json(&self, name: &str, timeout: Duration) -> SlotResult<SlotLookup> {
        if !self.read_delay.is_zero() {
            if self.read_delay > timeout {
                tokio::time::sleep(timeout).await;
                trace!(slot = %name, "Slot read timed out");
                return Ok(SlotLookup::Missing);
            }
            tokio::time::sleep(self.read_delay).await;
        }

        Ok(match self.slots.get(name) {
            Some(value) => SlotLookup::Found(value.clone()),
            None => SlotLookup::Missing,
        })
    }

    async fn set_json(&self, name: &str, value: String) -> SlotResult<()> {
        trace!(slot = %name, "Slot write");
        self.slots.insert(name.to_string(), value);
        Ok(())
    }

    async fn delete(&self, name: &str) -> SlotResult<bool> {
        Ok(self.slots.remove(name).is_some())
    }
}

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: Instant,
}

/// In-memory lease store
///
/// Expiry is measured on the tokio clock, so paused-time tests can drive it.
pub struct MemoryLeaseStore {
    leases: DashMap<String, Lease>,
}

impl MemoryLeaseStore {
    /// Create a new in-memory lease store
    pub fn new() -> Self {
        debug!("Creating new in-memory lease store");
        Self {
            leases: DashMap::new(),
        }
    }

    /// Drop expired leases
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.leases.retain(|_, lease| lease.expires_at > now);
    }
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let lease = Lease {
            token: token.to_string(),
            expires_at: now + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Ok(false);
                }
                trace!(key = %key, "Taking over expired lease");
                entry.insert(lease);
            }
            Entry::Vacant(entry) => {
                entry.insert(lease);
            }
        }
        Ok(true)
    }

    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        match self.leases.get_mut(key) {
            Some(mut lease) if lease.token == token && lease.expires_at > now => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &str) -> LockResult<bool> {
        let now = Instant::now();
        Ok(self
            .leases
            .remove_if(key, |_, lease| lease.token == token && lease.expires_at > now)
            .is_some())
    }

    async fn holder(&self, key: &str) -> LockResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .leases
            .get(key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.token.clone()))
    }
}
