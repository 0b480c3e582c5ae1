use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use pkg_quota::{AdmissionRequest, EnforcerOptions, QuotaEnforcer, QuotaError, QuotaStore, Registry};
use pkg_state::MemoryStore;
use pkg_types::machine::{Machine, MachineClass};
use pkg_types::quota::ResourceQuota;
use pkg_types::resource_list;

const ATTEMPTS: usize = 15;

async fn setup(hard: ResourceQuota) -> (QuotaStore, Arc<QuotaEnforcer>) {
    let store = QuotaStore::new(Arc::new(MemoryStore::new()));
    store
        .put_machine_class(&MachineClass::new("gold", resource_list! { "cpu" => "1" }))
        .await
        .unwrap();
    store.create_quota(&hard).await.unwrap();
    let registry = Arc::new(Registry::with_default_evaluators(&store).unwrap());
    let options = EnforcerOptions {
        max_retries: 50,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
        rollback_timeout: Duration::from_secs(1),
    };
    let enforcer = Arc::new(QuotaEnforcer::new(store.clone(), registry, options));
    (store, enforcer)
}

async fn race(enforcer: Arc<QuotaEnforcer>) -> Vec<Result<(), QuotaError>> {
    let barrier = Arc::new(Barrier::new(ATTEMPTS));
    let mut handles = Vec::with_capacity(ATTEMPTS);
    for i in 0..ATTEMPTS {
        let enforcer = enforcer.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let request = AdmissionRequest::create(Machine::new("team-a", &format!("m{}", i), "gold"));
            enforcer.admit(&request).await.map(|_| ())
        }));
    }
    let mut results = Vec::with_capacity(ATTEMPTS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_never_exceed_hard() {
    let (store, enforcer) = setup(ResourceQuota::new(
        "team-a",
        "count",
        resource_list! { "count/machines" => "10" },
    ))
    .await;

    let results = race(enforcer.clone()).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(QuotaError::LimitExceeded { .. })))
        .count();
    assert_eq!(admitted, 10, "results: {:?}", results);
    assert_eq!(rejected, 5, "results: {:?}", results);

    let quota = store.get_quota("team-a", "count").await.unwrap().unwrap();
    assert_eq!(quota.used, resource_list! { "count/machines" => "10" });

    let metrics = enforcer.metrics().snapshot();
    assert_eq!(metrics.admitted, 10);
    assert_eq!(metrics.denied, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_respect_every_limit() {
    let (store, enforcer) = setup(ResourceQuota::new(
        "team-a",
        "compute",
        resource_list! { "count/machines" => "20", "requests.cpu" => "7" },
    ))
    .await;

    let results = race(enforcer).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 7);

    let quota = store.get_quota("team-a", "compute").await.unwrap().unwrap();
    assert_eq!(
        quota.used,
        resource_list! { "count/machines" => "7", "requests.cpu" => "7" }
    );
}
