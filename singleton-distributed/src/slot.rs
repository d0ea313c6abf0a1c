//! Shared named reference cells.

use crate::error::SlotResult;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Outcome of a slot read that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLookup {
    /// The slot holds a value
    Found(String),

    /// The slot is absent, or the read did not finish within its timeout
    Missing,
}

impl SlotLookup {
    /// Convert into an `Option`.
    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing => None,
        }
    }
}

/// Shared, multi-writer, last-write-wins named cell.
///
/// Reads are not linearized against writes.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read a slot.
    ///
    /// Returns [`SlotLookup::Missing`] when the slot is absent or the read
    /// takes longer than `timeout`; only genuine backend failures are errors.
    async fn get_json(&self, name: &str, timeout: Duration) -> SlotResult<SlotLookup>;

    /// Write a slot, creating it if needed.
    async fn set_json(&self, name: &str, value: String) -> SlotResult<()>;

    /// Delete a slot.
    ///
    /// Returns `false` if the slot was already absent.
    async fn delete(&self, name: &str) -> SlotResult<bool>;
}

/// Read a typed value from a slot.
///
/// # Examples
///
/// ```
/// use singleton_distributed::{MemorySlotStore, slot};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), singleton_distributed::SlotError> {
/// let store = MemorySlotStore::new();
/// slot::write(&store, "answer", &42u32).await?;
///
/// let value: Option<u32> = slot::read(&store, "answer", Duration::from_secs(1)).await?;
/// assert_eq!(value, Some(42));
/// # Ok(())
/// # }
/// ```
pub async fn read<S, T>(store: &S, name: &str, timeout: Duration) -> SlotResult<Option<T>>
where
    S: SlotStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_json(name, timeout).await? {
        SlotLookup::Found(json) => Ok(Some(serde_json::from_str(&json)?)),
        SlotLookup::Missing => Ok(None),
    }
}

/// Write a typed value into a slot.
pub async fn write<S, T>(store: &S, name: &str, value: &T) -> SlotResult<()>
where
    S: SlotStore + ?Sized,
    T: Serialize,
{
    let json = serde_json::to_string(value)?;
    store.set_json(name, json).await
}
