//! Remote execution fabric for singleton actors.
//!
//! Provides the remote-execution primitive the singleton coordinator runs on:
//! - 🧱 Stateful remote objects ([`Fabric::spawn_actor`], [`Actor`])
//! - 🔁 Explicit resolution points ([`RemoteFuture`]) for every remote call
//! - ⭐ Task priorities with a contextual default ([`Priority::scope`])
//! - 💀 Failure-prone workers with observable worker loss
//! - 🧹 Reference counting so unreferenced objects are reclaimed
//!
//! ## Quick Start
//!
//! ```
//! use singleton_fabric::{Actor, ClusterConfig, LocalCluster, Priority};
//! use std::convert::Infallible;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cluster = LocalCluster::new(ClusterConfig::new(2));
//!
//! let counter = Actor::spawn(cluster.fabric(), || Ok::<_, Infallible>(0u64), Priority::NORMAL).unwrap();
//! counter.resolve().await.unwrap();
//!
//! let next = counter.call(|n| { *n += 1; *n }).await.unwrap();
//! assert_eq!(next, 1);
//! # }
//! ```
//!
//! ## Worker Loss
//!
//! ```
//! use singleton_fabric::{Actor, ClusterConfig, LocalCluster, Priority};
//! use std::convert::Infallible;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cluster = LocalCluster::new(ClusterConfig::new(2));
//! let actor = Actor::spawn(cluster.fabric(), || Ok::<_, Infallible>(()), Priority::NORMAL).unwrap();
//! actor.resolve().await.unwrap();
//!
//! cluster.kill_worker(actor.actor_ref().worker);
//! assert!(actor.resolve().await.unwrap_err().is_worker_lost());
//! # }
//! ```

pub mod cluster;
pub mod error;
pub mod fabric;
pub mod handle;
pub mod priority;
mod worker;

pub use cluster::{ClusterConfig, LocalCluster};
pub use error::{BoxError, RemoteError, RemoteResult};
pub use fabric::{
    Actor, Constructor, Fabric, FabricStatus, Method, Payload, Task, call, constructor,
};
pub use handle::{ActorRef, RemoteFuture, WorkerId};
pub use priority::Priority;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cluster::{ClusterConfig, LocalCluster};
    pub use crate::error::{BoxError, RemoteError, RemoteResult};
    pub use crate::fabric::{Actor, Fabric, FabricStatus};
    pub use crate::handle::{ActorRef, RemoteFuture, WorkerId};
    pub use crate::priority::Priority;
}
