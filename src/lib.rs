// actor-singleton - exactly one remote actor per name
//
// This library coordinates creation of long-lived remote singleton actors
// across a pool of failure-prone workers with no shared memory.

// Re-export core functionality
pub use singleton_core::*;

// Re-export member crates
pub use singleton_distributed;
pub use singleton_fabric;

pub use singleton_distributed::{
    DistributedLock, LeaseStore, LockBuilder, LockError, LockGuard, MemoryLeaseStore,
    MemorySlotStore, SlotError, SlotLookup, SlotStore,
};
pub use singleton_fabric::{
    Actor, ActorRef, ClusterConfig, Fabric, FabricStatus, LocalCluster, Priority, RemoteError,
    RemoteFuture, WorkerId,
};

#[cfg(feature = "redis")]
pub use singleton_distributed::{RedisLeaseStore, RedisSlotStore};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Actor,
        ClusterConfig,
        Coordinator,
        CoordinatorBuilder,
        CoordinatorConfig,
        Fabric,
        GetOptions,
        LeaseStore,
        LocalCluster,
        MemoryLeaseStore,
        MemorySlotStore,
        Priority,
        RemoteError,
        SingletonError,
        SingletonResult,
        SlotStore,
    };
}
