// Integration tests for the Redis shared-state store
//
// These tests require Docker and are marked with #[ignore]
// Run with: cargo test --test redis_store_integration_test -- --ignored

use std::sync::Arc;
use std::time::Duration;
use storage_circuit::breaker::{BreakerRegistry, RequestScope, StorageBreaker};
use storage_circuit::config::Config;
use storage_circuit::error::{BreakerError, StoreError};
use storage_circuit::lease::ExclusiveLease;
use storage_circuit::probe::ProcessProbe;
use storage_circuit::store::{FailureField, RedisConfig, RedisStore, SharedStateStore};
use testcontainers::{clients::Cli, Container, RunnableImage};
use testcontainers_modules::redis::Redis;

fn redis_config(container: &Container<'_, Redis>) -> RedisConfig {
    let redis_port = container.get_host_port_ipv4(6379);
    RedisConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", redis_port)),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore]
async fn test_connects_and_answers_ping() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));

    let store = RedisStore::new(&redis_config(&container)).await.unwrap();
    assert!(store.health_check().await);
}

#[tokio::test]
async fn test_missing_url_is_a_connection_error() {
    let result = RedisStore::new(&RedisConfig::default()).await;
    assert!(matches!(result, Err(StoreError::Connection(_))));
}

#[tokio::test]
#[ignore]
async fn test_fields_round_trip_as_stringified_integers() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let store = RedisStore::new(&redis_config(&container)).await.unwrap();
    let key = "storage_accessible:default:web-01";

    let empty = store.read_fields(key).await.unwrap();
    assert_eq!(empty.failure_count, None);

    store
        .write_field(key, FailureField::FirstFailure, 1_700_000_000)
        .await
        .unwrap();
    store
        .write_field(key, FailureField::LastFailure, 1_700_000_060)
        .await
        .unwrap();
    store
        .write_field(key, FailureField::FailureCount, 2)
        .await
        .unwrap();

    let fields = store.read_fields(key).await.unwrap();
    assert_eq!(fields.failure_count, Some(2));
    assert_eq!(fields.first_failure, Some(1_700_000_000));
    assert_eq!(fields.last_failure, Some(1_700_000_060));

    store
        .clear_field(key, FailureField::FirstFailure)
        .await
        .unwrap();
    assert_eq!(store.read_fields(key).await.unwrap().first_failure, None);
}

#[tokio::test]
#[ignore]
async fn test_reset_all_deletes_known_keys() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let store = RedisStore::new(&redis_config(&container)).await.unwrap();

    // Reset on an empty index is a no-op
    store.reset_all().await.unwrap();

    let keys: Vec<String> = (1..=5)
        .map(|n| format!("storage_accessible:default:web-{:02}", n))
        .collect();
    for key in &keys {
        store.register_known_key(key, 0.0).await.unwrap();
        store
            .write_field(key, FailureField::FailureCount, 3)
            .await
            .unwrap();
    }
    assert_eq!(store.all_known_keys().await.unwrap(), keys);

    store.reset_all().await.unwrap();

    assert!(store.all_known_keys().await.unwrap().is_empty());
    for key in &keys {
        assert_eq!(store.read_fields(key).await.unwrap().failure_count, None);
    }
}

#[tokio::test]
#[ignore]
async fn test_lease_is_exclusive_and_owned() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let store: Arc<dyn SharedStateStore> =
        Arc::new(RedisStore::new(&redis_config(&container)).await.unwrap());

    let lease = ExclusiveLease::new(
        store.clone(),
        "storage_check:storage_accessible:default:web-01",
        Duration::from_secs(10),
    );

    let token = lease.try_obtain().await.unwrap().unwrap();
    assert!(lease.try_obtain().await.unwrap().is_none());
    assert!(!lease.cancel("someone-else").await.unwrap());
    assert!(lease.cancel(&token).await.unwrap());
    assert!(lease.try_obtain().await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn test_breaker_records_failures_in_redis() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let store: Arc<dyn SharedStateStore> =
        Arc::new(RedisStore::new(&redis_config(&container)).await.unwrap());

    let config = Config::from_yaml_with_env(
        "circuit_breaker:\n  storage_timeout: 2\n  access_retries: 1\nstorages:\n  gone:\n    path: /nonexistent/storage-circuit/gone\n",
    )
    .unwrap();
    let registry = BreakerRegistry::new(&config, store.clone(), Arc::new(ProcessProbe::default()))
        .with_hostname("web-01");

    let result: Result<(), BreakerError> = registry
        .for_storage("gone")
        .perform(&RequestScope::new(), || async { Ok(()) })
        .await;

    assert!(matches!(result, Err(BreakerError::Inaccessible { .. })));
    assert_eq!(
        registry.for_storage("gone").failure_count().await.unwrap(),
        1
    );
    assert_eq!(
        store.all_known_keys().await.unwrap(),
        vec!["storage_accessible:gone:web-01"]
    );
}
