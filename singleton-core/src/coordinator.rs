//! Double-checked creation of named singleton actors.
//!
//! `get` reads the slot without locking and asks the published shell whether
//! its handle is still valid. On a miss it takes the per-name lock, checks
//! again, and only then creates a fresh shell and payload, publishing the
//! shell once the payload is built. Publication is linearized per name by
//! the lock; reads outside it may be stale, which only costs a re-check.

use crate::classify::{Disposition, classify};
use crate::config::CoordinatorConfig;
use crate::error::{SingletonError, SingletonResult};
use crate::options::GetOptions;
use crate::shell::{CacheCheck, CacheShell, ShellSnapshot, TtlPolicy};
use singleton_distributed::{
    LeaseStore, LockBuilder, LockGuard, MemoryLeaseStore, MemorySlotStore, SlotLookup, SlotStore,
    slot,
};
use singleton_fabric::{
    Actor, ActorRef, BoxError, Fabric, FabricStatus, Priority, RemoteError, call,
};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

enum Lookup<T> {
    Hit(Actor<T>),
    Miss { stale: Option<ActorRef> },
}

/// Entry point for named singleton actors.
///
/// Cheap to clone; all state lives in the slot store, the lease store and
/// on the fabric, so any number of coordinators in any number of processes
/// can share the same names.
///
/// # Examples
///
/// ```
/// use singleton_core::Coordinator;
/// use singleton_fabric::{ClusterConfig, LocalCluster};
/// use std::convert::Infallible;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), singleton_core::SingletonError> {
/// let cluster = LocalCluster::new(ClusterConfig::new(2));
/// let coordinator = Coordinator::in_memory(cluster.fabric());
///
/// let a = coordinator.get("counter", || Ok::<_, Infallible>(0u64)).await?;
/// let b = coordinator.get("counter", || Ok::<_, Infallible>(0u64)).await?;
///
/// a.call(|n| *n += 1).await?;
/// assert_eq!(b.call(|n| *n).await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    slots: Arc<dyn SlotStore>,
    leases: Arc<dyn LeaseStore>,
    fabric: Arc<dyn Fabric>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator with the default configuration.
    pub fn new(
        slots: Arc<dyn SlotStore>,
        leases: Arc<dyn LeaseStore>,
        fabric: Arc<dyn Fabric>,
    ) -> Self {
        Self {
            slots,
            leases,
            fabric,
            config: CoordinatorConfig::default(),
        }
    }

    /// Create a coordinator backed by fresh in-memory stores.
    ///
    /// Only coordinators cloned from the returned value share its names.
    pub fn in_memory(fabric: Arc<dyn Fabric>) -> Self {
        Self::new(
            Arc::new(MemorySlotStore::new()),
            Arc::new(MemoryLeaseStore::new()),
            fabric,
        )
    }

    /// Create a builder.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> SingletonResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The fabric singletons are created on.
    pub fn fabric(&self) -> &Arc<dyn Fabric> {
        &self.fabric
    }

    /// Get the singleton named `name`, creating it with `constructor` if
    /// needed. Never expires; created at the default priority.
    pub async fn get<T, E, F>(&self, name: &str, constructor: F) -> SingletonResult<Actor<T>>
    where
        T: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        self.get_with(name, constructor, GetOptions::default()).await
    }

    /// Get the singleton named `name` under the given expiry rules and
    /// creation priority.
    ///
    /// `constructor` runs at most once per call and only if this caller
    /// wins the creation. Across racing processes it may run more than once;
    /// only one result is published and a losing run is not rolled back.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::Constructor`] with the constructor's own error if
    ///   this caller's creation failed. Nothing is published, so the next
    ///   caller retries.
    /// - [`SingletonError::WorkerLost`] if the worker running this caller's
    ///   creation died. A lost worker behind an already published singleton
    ///   is not an error; it is replaced.
    /// - Slot, lock and fabric failures.
    pub async fn get_with<T, E, F>(
        &self,
        name: &str,
        constructor: F,
        options: GetOptions,
    ) -> SingletonResult<Actor<T>>
    where
        T: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        validate_name(name)?;
        let policy = options.ttl_policy();

        match self.lookup::<T>(name, policy).await? {
            Lookup::Hit(actor) => {
                debug!(name = %name, actor = %actor.actor_ref(), "Singleton cache hit");
                return Ok(actor);
            }
            Lookup::Miss { stale } => {
                debug!(name = %name, stale = stale.is_some(), "Singleton cache miss");
            }
        }

        let priority = options.resolve_priority(self.config.default_priority);
        let guard = self.lock(name).await?;
        let result = self
            .recheck_or_create(name, constructor, policy, priority)
            .await;
        self.unlock(name, guard).await;
        result
    }

    /// Forget the singleton named `name`.
    ///
    /// The published shell lets go of its handle and the slot is deleted, so
    /// the object is reclaimed once no caller holds it anymore. Handles
    /// obtained earlier keep working. A concurrent `get` may land on either
    /// side of the discard.
    ///
    /// # Errors
    ///
    /// [`SingletonError::BackendUnserviceable`] if the fabric is not running.
    pub async fn discard(&self, name: &str) -> SingletonResult<()> {
        validate_name(name)?;

        let status = self.fabric.status();
        if status != FabricStatus::Running {
            return Err(SingletonError::BackendUnserviceable(format!(
                "fabric is {:?}",
                status
            )));
        }

        let guard = self.lock(name).await?;
        let result = self.discard_locked(name).await;
        self.unlock(name, guard).await;
        result
    }

    /// Look at the shell currently published under `name`.
    ///
    /// Returns `None` if nothing is published or the shell is unreachable.
    pub async fn inspect(&self, name: &str) -> SingletonResult<Option<ShellSnapshot>> {
        validate_name(name)?;

        let Some(shell) = self.read_slot(name).await? else {
            return Ok(None);
        };

        let snapshot = call::<CacheShell, _, _>(self.fabric.as_ref(), &shell, |shell| {
            shell.snapshot(Instant::now())
        });

        match snapshot.result_timeout(self.config.check_timeout).await {
            Some(Ok(snapshot)) => Ok(Some(snapshot)),
            Some(Err(err)) => {
                self.absorb(name, err)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn lookup<T: Send + 'static>(
        &self,
        name: &str,
        policy: TtlPolicy,
    ) -> SingletonResult<Lookup<T>> {
        let Some(shell) = self.read_slot(name).await? else {
            return Ok(Lookup::Miss { stale: None });
        };
        let stale = Some(shell);

        let check = call::<CacheShell, _, _>(self.fabric.as_ref(), &shell, move |shell| {
            shell.cache_check(policy, Instant::now())
        });

        let payload = match check.result_timeout(self.config.check_timeout).await {
            Some(Ok(CacheCheck::Valid(payload))) => payload,
            Some(Ok(CacheCheck::Expired { dropped })) => {
                debug!(name = %name, shell = %shell, "Singleton expired");
                if let Some(dropped) = dropped {
                    self.fabric.release(&dropped);
                }
                return Ok(Lookup::Miss { stale });
            }
            Some(Err(err)) => {
                self.absorb(name, err)?;
                return Ok(Lookup::Miss { stale });
            }
            None => {
                debug!(name = %name, shell = %shell, "Cache check timed out");
                return Ok(Lookup::Miss { stale });
            }
        };

        // The returned handle owns a count of its own
        if !self.fabric.retain(&payload) {
            debug!(name = %name, actor = %payload, "Wrapped handle already reclaimed");
            return Ok(Lookup::Miss { stale });
        }
        let actor = Actor::<T>::from_owned(payload, self.fabric.clone());

        match actor.resolve().result_timeout(self.config.check_timeout).await {
            Some(Ok(())) => Ok(Lookup::Hit(actor)),
            Some(Err(err)) => {
                self.absorb(name, err)?;
                Ok(Lookup::Miss { stale })
            }
            None => Ok(Lookup::Miss { stale }),
        }
    }

    async fn recheck_or_create<T, E, F>(
        &self,
        name: &str,
        constructor: F,
        policy: TtlPolicy,
        priority: Priority,
    ) -> SingletonResult<Actor<T>>
    where
        T: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let stale = match self.lookup::<T>(name, policy).await? {
            Lookup::Hit(actor) => {
                debug!(name = %name, "Singleton published while waiting for the lock");
                return Ok(actor);
            }
            Lookup::Miss { stale } => stale,
        };

        // Whoever deletes the slot value retires the shell it named
        let mut leftover = None;
        match self.slots.delete(name).await {
            Ok(true) => {
                if let Some(stale) = stale {
                    self.retire_shell(name, &stale).await;
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to delete stale singleton slot");
                leftover = stale;
            }
        }

        info!(name = %name, priority = priority.0, "Creating singleton");

        let payload =
            Actor::<T>::spawn(self.fabric.clone(), constructor, priority).map_err(SingletonError::from_owned)?;
        // Shell and payload share a worker, so the payload never outlives
        // the only record of the shell's count on it
        let shell = Actor::<CacheShell>::spawn_on(
            self.fabric.clone(),
            payload.actor_ref().worker,
            || Ok::<_, Infallible>(CacheShell::new()),
            priority,
        )?;

        let (payload_built, shell_built) = tokio::join!(payload.resolve(), shell.resolve());
        if let Err(err) = payload_built {
            warn!(name = %name, error = %err, "Singleton construction failed");
            return Err(SingletonError::from_owned(err));
        }
        shell_built?;

        // The shell's count on the payload
        let payload_ref = *payload.actor_ref();
        if !self.fabric.retain(&payload_ref) {
            return Err(SingletonError::WorkerLost(payload_ref.worker));
        }

        let init = call::<CacheShell, _, _>(self.fabric.as_ref(), shell.actor_ref(), move |shell| {
            shell.init(payload_ref, Instant::now())
        });
        if let Err(err) = init.await {
            self.fabric.release(&payload_ref);
            return Err(err.into());
        }

        if let Err(err) = slot::write(self.slots.as_ref(), name, shell.actor_ref()).await {
            self.fabric.release(&payload_ref);
            return Err(err.into());
        }

        // The slot's count on the shell
        if !self.fabric.retain(shell.actor_ref()) {
            warn!(name = %name, shell = %shell.actor_ref(), "Published shell already reclaimed");
        }
        if let Some(stale) = leftover {
            self.retire_shell(name, &stale).await;
        }

        info!(name = %name, actor = %payload_ref, shell = %shell.actor_ref(), "Singleton published");
        Ok(payload)
    }

    async fn discard_locked(&self, name: &str) -> SingletonResult<()> {
        let shell = self.read_slot(name).await?;

        let deleted = self.slots.delete(name).await?;
        if deleted && let Some(shell) = shell {
            self.retire_shell(name, &shell).await;
        }

        info!(name = %name, deleted = deleted, "Discarded singleton");
        Ok(())
    }

    /// Drop the slot's count on a shell that is no longer published, after
    /// taking back the count the shell held on its payload.
    async fn retire_shell(&self, name: &str, shell: &ActorRef) {
        let cleared = call::<CacheShell, _, _>(self.fabric.as_ref(), shell, |shell| shell.discard());

        match cleared.result_timeout(self.config.check_timeout).await {
            Some(Ok(Some(payload))) => self.fabric.release(&payload),
            Some(Ok(None)) => {}
            // Its worker is gone, and the payload with it
            Some(Err(err)) => debug!(name = %name, shell = %shell, error = %err, "Retired shell unreachable"),
            None => warn!(name = %name, shell = %shell, "Timed out clearing retired shell"),
        }

        self.fabric.release(shell);
    }

    async fn read_slot(&self, name: &str) -> SingletonResult<Option<ActorRef>> {
        match self
            .slots
            .get_json(name, self.config.slot_read_timeout)
            .await?
        {
            SlotLookup::Missing => Ok(None),
            SlotLookup::Found(json) => match serde_json::from_str(&json) {
                Ok(shell) => Ok(Some(shell)),
                Err(e) => {
                    warn!(name = %name, error = %e, "Ignoring undecodable singleton slot");
                    Ok(None)
                }
            },
        }
    }

    // Failures of handles someone else published become misses.
    fn absorb(&self, name: &str, err: RemoteError) -> SingletonResult<()> {
        match classify(&err) {
            Disposition::Miss => {
                debug!(name = %name, error = %err, "Replacing broken singleton");
                Ok(())
            }
            Disposition::Fatal => Err(err.into()),
        }
    }

    async fn lock(&self, name: &str) -> SingletonResult<LockGuard> {
        let lock = LockBuilder::new(self.config.lock_key(name))
            .with_ttl(self.config.lock_ttl)
            .with_retry_interval(self.config.lock_retry_interval)
            .build(self.leases.clone());

        let guard = lock.acquire().await?;
        debug!(name = %name, "Singleton lock acquired");
        Ok(guard)
    }

    async fn unlock(&self, name: &str, guard: LockGuard) {
        if let Err(e) = guard.release().await {
            warn!(name = %name, error = %e, "Failed to release singleton lock");
        }
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> SingletonResult<()> {
    if name.is_empty() {
        return Err(SingletonError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Builder for [`Coordinator`].
///
/// Stores default to fresh in-memory ones; the fabric is required.
#[derive(Default)]
pub struct CoordinatorBuilder {
    slots: Option<Arc<dyn SlotStore>>,
    leases: Option<Arc<dyn LeaseStore>>,
    fabric: Option<Arc<dyn Fabric>>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// Set the slot store.
    pub fn slots(mut self, slots: Arc<dyn SlotStore>) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Set the lease store.
    pub fn leases(mut self, leases: Arc<dyn LeaseStore>) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Set the fabric.
    pub fn fabric(mut self, fabric: Arc<dyn Fabric>) -> Self {
        self.fabric = Some(fabric);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the coordinator.
    pub fn build(self) -> SingletonResult<Coordinator> {
        let fabric = self
            .fabric
            .ok_or_else(|| SingletonError::Config("a fabric is required".to_string()))?;
        let slots = self
            .slots
            .unwrap_or_else(|| Arc::new(MemorySlotStore::new()));
        let leases = self
            .leases
            .unwrap_or_else(|| Arc::new(MemoryLeaseStore::new()));

        Coordinator::new(slots, leases, fabric).with_config(self.config)
    }
}
