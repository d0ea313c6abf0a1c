//! Coordination backend for singleton actors
//!
//! This crate provides the two shared primitives singleton coordination
//! is built on.
//!
//! ## Features
//!
//! - **Slots** - Named, shared, last-write-wins cells holding JSON
//! - **Distributed Locks** - Lease-based mutual exclusion per name
//! - **TTL Management** - Automatic lease renewal while a guard is alive
//! - **RAII Pattern** - Automatic release on drop
//! - **Backends** - In-memory (DashMap) and Redis stores
//!
//! ## Quick Start
//!
//! ```
//! use singleton_distributed::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let slots = MemorySlotStore::new();
//! let leases = Arc::new(MemoryLeaseStore::new());
//!
//! let lock = LockBuilder::new("counter__singleton_lock")
//!     .with_ttl(Duration::from_secs(30))
//!     .build(leases);
//!
//! let guard = lock.acquire().await?;
//! if slots.get_json("counter", Duration::from_secs(1)).await? == SlotLookup::Missing {
//!     slots.set_json("counter", "{}".to_string()).await?;
//! }
//! guard.release().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Redis
//!
//! ```rust,ignore
//! use singleton_distributed::*;
//! use std::sync::Arc;
//!
//! let slots = RedisSlotStore::new("redis://127.0.0.1/").await?;
//! let leases = Arc::new(RedisLeaseStore::new("redis://127.0.0.1/").await?);
//! ```

pub mod error;
pub mod lock;
pub mod slot;
pub mod stores;

pub use error::{LockError, LockResult, SlotError, SlotResult};
pub use lock::{DistributedLock, LeaseStore, LockBuilder, LockGuard};
pub use slot::{SlotLookup, SlotStore};
pub use stores::{MemoryLeaseStore, MemorySlotStore};
#[cfg(feature = "redis")]
pub use stores::{RedisLeaseStore, RedisSlotStore};
