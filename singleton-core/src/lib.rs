//! Exactly one remote singleton actor per name.
//!
//! Reuses expensive-to-construct state across many tasks running on a pool
//! of failure-prone workers, without allocating it twice. Creation is a
//! double-checked lock over a shared slot; expiry is evaluated lazily by a
//! small TTL shell living next to the object.
//!
//! # Features
//!
//! - `redis` - Enable Redis slot and lease stores (enabled by default)
//! - **At-most-one creation** - Concurrent callers block on a per-name lease
//! - **Lazy TTL eviction** - By age (`ttl_create`) or idle time (`ttl_get`)
//! - **Worker-loss recovery** - Broken singletons are replaced transparently
//! - **Verbatim constructor errors** - Surfaced to the caller that triggered
//!   creation; never cached
//!
//! # Examples
//!
//! ## Shared State
//!
//! ```
//! use singleton_core::*;
//! use singleton_fabric::{ClusterConfig, LocalCluster};
//! use std::convert::Infallible;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), SingletonError> {
//! let cluster = LocalCluster::new(ClusterConfig::new(2));
//! let coordinator = Coordinator::in_memory(cluster.fabric());
//!
//! let options = GetOptions::new().ttl_get(Duration::from_secs(300));
//! let cache = coordinator
//!     .get_with("lookup-table", || Ok::<_, Infallible>(vec![1u32, 2, 3]), options)
//!     .await?;
//!
//! assert_eq!(cache.call(|table| table.len()).await?, 3);
//!
//! coordinator.discard("lookup-table").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Constructor Failures
//!
//! ```
//! use singleton_core::*;
//! use singleton_fabric::{ClusterConfig, LocalCluster};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("model file missing")]
//! struct MissingModel;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cluster = LocalCluster::new(ClusterConfig::new(1));
//! let coordinator = Coordinator::in_memory(cluster.fabric());
//!
//! let err = coordinator
//!     .get("model", || Err::<Vec<f32>, _>(MissingModel))
//!     .await
//!     .unwrap_err();
//!
//! assert!(err.downcast_constructor::<MissingModel>().is_some());
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod options;
pub mod shell;

pub use classify::{Disposition, classify};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{SingletonError, SingletonResult};
pub use options::GetOptions;
pub use shell::{CacheCheck, CacheShell, ShellSnapshot, TtlPolicy};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::CoordinatorConfig;
    pub use crate::coordinator::{Coordinator, CoordinatorBuilder};
    pub use crate::error::{SingletonError, SingletonResult};
    pub use crate::options::GetOptions;
    pub use crate::shell::{ShellSnapshot, TtlPolicy};
}
