//! Slot and lease storage backends
//!
//! - **Memory**: In-memory storage using DashMap (single process, tests)
//! - **Redis**: Shared storage for multi-process deployments

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryLeaseStore, MemorySlotStore};
#[cfg(feature = "redis")]
pub use redis::{RedisLeaseStore, RedisSlotStore};
