//! End-to-end tests for singleton creation, expiry and recovery

use singleton_core::*;
use singleton_distributed::{LeaseStore, MemoryLeaseStore, MemorySlotStore, SlotStore, slot};
use singleton_fabric::{ActorRef, ClusterConfig, LocalCluster, Priority, RemoteError, RemoteFuture};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(workers: usize) -> (LocalCluster, Coordinator) {
    init_tracing();
    let cluster = LocalCluster::new(ClusterConfig::new(workers));
    let coordinator = Coordinator::in_memory(cluster.fabric())
        .with_config(CoordinatorConfig::new().with_lock_retry_interval(Duration::from_millis(10)))
        .unwrap();
    (cluster, coordinator)
}

/// Constructor that counts its invocations.
fn counting(
    calls: &Arc<AtomicUsize>,
) -> impl FnOnce() -> Result<u64, Infallible> + Send + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("constructor refused")]
struct Refused;

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_get_shares_one_object() {
    let (_cluster, coordinator) = setup(2);
    let calls = Arc::new(AtomicUsize::new(0));

    let a = assert_ok!(coordinator.get("a", counting(&calls)).await);
    let b = assert_ok!(coordinator.get("a", counting(&calls)).await);

    assert_eq!(a, b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    a.call(|n| *n += 1).await.unwrap();
    b.call(|n| *n += 1).await.unwrap();
    assert_eq!(a.call(|n| *n).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_at_most_one_creation_under_contention() {
    let (_cluster, coordinator) = setup(2);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let coordinator = coordinator.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .get("contended", move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    Ok::<_, Infallible>(0u64)
                })
                .await
        }));
    }

    let mut actors = Vec::new();
    for handle in handles {
        actors.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(actors.windows(2).all(|pair| pair[0] == pair[1]));

    // Every handle talks to the same state
    for actor in &actors {
        actor.call(|n| *n += 1).await.unwrap();
    }
    assert_eq!(actors[0].call(|n| *n).await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_coordinators_sharing_stores_share_singletons() {
    init_tracing();
    let cluster = LocalCluster::new(ClusterConfig::new(2));
    let slots: Arc<dyn SlotStore> = Arc::new(MemorySlotStore::new());
    let leases: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

    let first = Coordinator::new(slots.clone(), leases.clone(), cluster.fabric());
    let second = Coordinator::builder()
        .slots(slots)
        .leases(leases)
        .fabric(cluster.fabric())
        .build()
        .unwrap();

    let a = first.get("shared", || Ok::<_, Infallible>(1u8)).await.unwrap();
    let b = second.get("shared", || Ok::<_, Infallible>(2u8)).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(b.call(|n| *n).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ttl_create_replaces_regardless_of_access() {
    let (_cluster, coordinator) = setup(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let options = GetOptions::new().ttl_create(Duration::from_millis(250));

    let first = coordinator
        .get_with("aging", counting(&calls), options)
        .await
        .unwrap();
    let again = coordinator
        .get_with("aging", counting(&calls), options)
        .await
        .unwrap();
    assert_eq!(first, again);

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator
            .get_with("aging", counting(&calls), options)
            .await
            .unwrap();
    }

    // Roughly one second of steady access with a quarter-second lifetime
    let created = calls.load(Ordering::SeqCst);
    assert!(created >= 3, "only {created} creations");
    assert!(created <= 8, "{created} creations");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ttl_get_kept_alive_by_access() {
    let (_cluster, coordinator) = setup(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let options = GetOptions::new().ttl_get(Duration::from_millis(400));

    let first = coordinator
        .get_with("idle", counting(&calls), options)
        .await
        .unwrap();

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let actor = coordinator
            .get_with("idle", counting(&calls), options)
            .await
            .unwrap();
        assert_eq!(actor, first);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let fresh = coordinator
        .get_with("idle", counting(&calls), options)
        .await
        .unwrap();

    assert_ne!(fresh, first);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discard_then_get() {
    let (_cluster, coordinator) = setup(2);

    let old = coordinator
        .get("discarded", || Ok::<_, Infallible>(String::from("one")))
        .await
        .unwrap();
    let snapshot = coordinator.inspect("discarded").await.unwrap().unwrap();
    assert_eq!(snapshot.wrapped, Some(*old.actor_ref()));

    assert_ok!(coordinator.discard("discarded").await);
    assert_eq!(coordinator.inspect("discarded").await.unwrap(), None);

    let new = coordinator
        .get("discarded", || Ok::<_, Infallible>(String::from("two")))
        .await
        .unwrap();

    assert_ne!(old, new);
    assert_eq!(new.call(|s| s.clone()).await.unwrap(), "two");
    // Handles obtained before the discard keep working
    assert_eq!(old.call(|s| s.clone()).await.unwrap(), "one");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discard_of_unknown_name_is_ok() {
    let (_cluster, coordinator) = setup(1);
    assert_ok!(coordinator.discard("never-created").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_constructor_failure_is_never_cached() {
    let (_cluster, coordinator) = setup(2);
    let attempts = Arc::new(AtomicUsize::new(0));

    for round in 1..=3 {
        let attempts_in = attempts.clone();
        let err = assert_err!(
            coordinator
                .get("fragile", move || {
                    attempts_in.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(Refused)
                })
                .await
        );

        assert!(err.is_constructor_failure());
        assert!(err.downcast_constructor::<Refused>().is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), round);
        assert_eq!(coordinator.inspect("fragile").await.unwrap(), None);
    }

    let fixed = coordinator
        .get("fragile", || Ok::<_, Infallible>(7u64))
        .await
        .unwrap();
    assert_eq!(fixed.call(|n| *n).await.unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_constructor_panic_is_reported() {
    let (_cluster, coordinator) = setup(1);

    let err = coordinator
        .get::<u64, Infallible, _>("panicky", || panic!("bad state"))
        .await
        .unwrap_err();

    assert!(err.is_constructor_failure());
    assert!(matches!(err, SingletonError::Remote(RemoteError::Panicked(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_loss_recovery() {
    let (cluster, coordinator) = setup(2);
    let calls = Arc::new(AtomicUsize::new(0));

    let lost = coordinator.get("fragile-host", counting(&calls)).await.unwrap();
    lost.call(|n| *n = 41).await.unwrap();

    assert!(cluster.kill_worker(lost.actor_ref().worker));

    let fresh = coordinator.get("fragile-host", counting(&calls)).await.unwrap();
    assert_ne!(fresh, lost);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(fresh.call(|n| *n).await.unwrap(), 0);

    let err = lost.call(|n| *n).await.unwrap_err();
    assert!(err.is_worker_lost());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recovery_after_all_workers_died() {
    let (cluster, coordinator) = setup(2);

    let before = coordinator
        .get("phoenix", || Ok::<_, Infallible>(1u8))
        .await
        .unwrap();

    for worker in cluster.worker_ids() {
        cluster.kill_worker(worker);
    }
    assert!(cluster.alive_workers().is_empty());
    cluster.add_worker();

    let after = coordinator
        .get("phoenix", || Ok::<_, Infallible>(2u8))
        .await
        .unwrap();
    assert_ne!(before, after);
    assert_eq!(after.call(|n| *n).await.unwrap(), 2);
}

/// Occupy the single worker's task lane with ordinary work.
fn saturate(cluster: &LocalCluster) -> Vec<RemoteFuture<()>> {
    let mut work = vec![cluster.submit_fn(
        || std::thread::sleep(Duration::from_millis(200)),
        Priority::NORMAL,
    )];
    for _ in 0..8 {
        work.push(cluster.submit_fn(
            || std::thread::sleep(Duration::from_millis(100)),
            Priority::NORMAL,
        ));
    }
    work
}

async fn drain(work: Vec<RemoteFuture<()>>) {
    for job in work {
        job.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_creation_runs_ahead_of_ordinary_work() {
    let (cluster, coordinator) = setup(1);

    let work = saturate(&cluster);
    let start = Instant::now();
    let urgent = coordinator
        .get("urgent", || Ok::<_, Infallible>(()))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(500), "{:?}", start.elapsed());

    // Cache hits are unaffected by priority
    let start = Instant::now();
    let hit = coordinator
        .get_with("urgent", || Ok::<_, Infallible>(()), GetOptions::new().priority(Priority(-1)))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(200), "{:?}", start.elapsed());
    assert_eq!(hit, urgent);

    drain(work).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_low_priority_creation_waits_for_queued_work() {
    let (cluster, coordinator) = setup(1);

    let work = saturate(&cluster);
    let start = Instant::now();
    coordinator
        .get_with("patient", || Ok::<_, Infallible>(()), GetOptions::new().priority(Priority(-1)))
        .await
        .unwrap();
    assert!(start.elapsed() > Duration::from_millis(300), "{:?}", start.elapsed());

    drain(work).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_contextual_priority_applies_to_creation() {
    let (cluster, coordinator) = setup(1);

    let work = saturate(&cluster);
    let start = Instant::now();
    Priority(-1)
        .scope(coordinator.get("scoped", || Ok::<_, Infallible>(())))
        .await
        .unwrap();
    assert!(start.elapsed() > Duration::from_millis(300), "{:?}", start.elapsed());

    drain(work).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closed_backend_fails_fast() {
    let (cluster, coordinator) = setup(2);
    coordinator
        .get("doomed", || Ok::<_, Infallible>(()))
        .await
        .unwrap();

    cluster.close();

    let err = assert_err!(coordinator.discard("doomed").await);
    assert!(err.is_unserviceable());

    let err = assert_err!(coordinator.get("doomed", || Ok::<_, Infallible>(())).await);
    assert!(err.is_unserviceable());

    let err = assert_err!(coordinator.get("fresh", || Ok::<_, Infallible>(())).await);
    assert!(err.is_unserviceable());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_objects_stay_bounded() {
    let (cluster, coordinator) = setup(2);
    let options = GetOptions::new().ttl_create(Duration::from_millis(50));

    for _ in 0..6 {
        let actor = coordinator
            .get_with("churn", || Ok::<_, Infallible>(vec![0u8; 1024]), options)
            .await
            .unwrap();
        drop(actor);
        tokio::time::sleep(Duration::from_millis(70)).await;
    }

    // One payload and its shell
    assert_eq!(cluster.actor_count(), 2);

    coordinator.discard("churn").await.unwrap();
    assert_eq!(cluster.actor_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_losing_the_shell_worker_strands_nothing() {
    init_tracing();
    let cluster = LocalCluster::new(ClusterConfig::new(3));
    let slots = Arc::new(MemorySlotStore::new());
    let coordinator = Coordinator::new(slots.clone(), Arc::new(MemoryLeaseStore::new()), cluster.fabric());

    let first = coordinator.get("x", || Ok::<_, Infallible>(1u8)).await.unwrap();
    let old_payload = *first.actor_ref();
    drop(first);

    let shell: ActorRef = slot::read(slots.as_ref(), "x", Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shell.worker, old_payload.worker);
    assert_eq!(cluster.actor_count(), 2);

    assert!(cluster.kill_worker(shell.worker));
    assert_eq!(cluster.actor_count(), 0);

    let second = coordinator.get("x", || Ok::<_, Infallible>(2u8)).await.unwrap();
    assert_ne!(*second.actor_ref(), old_payload);
    assert_eq!(second.call(|n| *n).await.unwrap(), 2);
    drop(second);

    // The new payload and its shell
    assert_eq!(cluster.actor_count(), 2);

    coordinator.discard("x").await.unwrap();
    assert_eq!(cluster.actor_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_held_handle_outlives_expiry() {
    let (cluster, coordinator) = setup(2);
    let options = GetOptions::new().ttl_create(Duration::from_millis(50));

    let held = coordinator
        .get_with("held", || Ok::<_, Infallible>(1u8), options)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let replacement = coordinator
        .get_with("held", || Ok::<_, Infallible>(2u8), options)
        .await
        .unwrap();

    assert_ne!(held, replacement);
    assert_eq!(held.call(|n| *n).await.unwrap(), 1);
    // Held payload, new payload and the new shell
    assert_eq!(cluster.actor_count(), 3);

    drop(held);
    assert_eq!(cluster.actor_count(), 2);
}
