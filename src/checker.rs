//! Fleet accessibility checks
//!
//! [`Checker`] is the plain "is this storage reachable from here right now"
//! helper: it probes, records the outcome and touches the known-keys index
//! with the current time. Unlike the request-path breaker it never rejects
//! anything. [`FleetChecker`] runs one checker per configured storage,
//! either once or periodically until shutdown.
//!
//! Checks of the same storage+host are serialized through an
//! [`ExclusiveLease`] in the shared store, so they never overlap within a
//! process or across hosts that share the store.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::breaker::BreakerSettings;
use crate::config::{Config, StorageConfig};
use crate::constants::{CHECK_STORE_ROUND_TRIPS, LEASE_TTL_MARGIN_SECS};
use crate::error::StoreError;
use crate::lease::ExclusiveLease;
use crate::metrics::BreakerMetrics;
use crate::probe::AvailabilityProbe;
use crate::store::key::local_hostname;
use crate::store::{SharedStateStore, StorageKey};
use crate::tracker::FailureTracker;

/// Outcome of one storage check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub storage: String,
    pub success: bool,
}

/// Lease lifetime covering a whole check
///
/// The probe may take `storage_timeout` and every store round trip up to
/// `store_timeout`; the lease must not expire before both are done.
pub fn lease_ttl(storage_timeout: Duration, store_timeout: Duration) -> Duration {
    storage_timeout
        + store_timeout * CHECK_STORE_ROUND_TRIPS
        + Duration::from_secs(LEASE_TTL_MARGIN_SECS)
}

/// Probe-and-record helper for one storage on one host
pub struct Checker {
    storage_path: String,
    settings: BreakerSettings,
    tracker: FailureTracker,
    probe: Arc<dyn AvailabilityProbe>,
    lease: ExclusiveLease,
}

impl Checker {
    pub fn new(
        key: StorageKey,
        storage_path: impl Into<String>,
        settings: BreakerSettings,
        store: Arc<dyn SharedStateStore>,
        store_timeout: Duration,
        probe: Arc<dyn AvailabilityProbe>,
    ) -> Self {
        let ttl = lease_ttl(settings.storage_timeout, store_timeout);
        let lease = ExclusiveLease::new(store.clone(), key.lease_key(), ttl);
        Self {
            storage_path: storage_path.into(),
            settings,
            tracker: FailureTracker::new(key, store),
            probe,
            lease,
        }
    }

    pub fn key(&self) -> &StorageKey {
        self.tracker.key()
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease.ttl()
    }

    /// Runs [`Checker::check`] while holding the storage+host lease
    ///
    /// Waits for a concurrent check of the same key to finish instead of
    /// running alongside it.
    pub async fn check_with_lease(&self) -> Result<CheckResult, StoreError> {
        let token = self.lease.obtain().await?;
        let result = self.check().await;

        if let Err(e) = self.lease.cancel(&token).await {
            tracing::warn!(
                storage = %self.key().storage(),
                error = %e,
                "Failed to release storage check lease"
            );
        }

        result
    }

    /// Probes the storage and records the outcome
    pub async fn check(&self) -> Result<CheckResult, StoreError> {
        let storage = self.key().storage();
        let success = self
            .probe
            .storage_available(
                &self.storage_path,
                self.settings.storage_timeout,
                self.settings.access_retries,
            )
            .await;

        let now = Utc::now();
        if success {
            self.tracker.record_success().await?;
        } else {
            let record = self.tracker.record_failure(now).await?;
            tracing::error!(
                storage = %storage,
                hostname = %self.key().hostname(),
                path = %self.storage_path,
                failure_count = record.failure_count(),
                "Storage is not accessible"
            );
        }
        // Timestamp score, applied last so it wins over the tracker's 0
        self.tracker.register(now.timestamp() as f64).await?;

        BreakerMetrics::global().record_check(storage, success);
        Ok(CheckResult {
            storage: storage.to_string(),
            success,
        })
    }
}

/// Checks every configured storage from this host
pub struct FleetChecker {
    storages: BTreeMap<String, StorageConfig>,
    settings: BreakerSettings,
    check_interval: Duration,
    store_timeout: Duration,
    hostname: String,
    store: Arc<dyn SharedStateStore>,
    probe: Arc<dyn AvailabilityProbe>,
}

impl FleetChecker {
    pub fn new(
        config: &Config,
        store: Arc<dyn SharedStateStore>,
        probe: Arc<dyn AvailabilityProbe>,
    ) -> Self {
        Self {
            storages: config.storages.clone(),
            settings: config.circuit_breaker.to_breaker_settings(),
            check_interval: config.circuit_breaker.check_interval(),
            store_timeout: Duration::from_millis(config.redis.operation_timeout_ms),
            hostname: local_hostname().to_string(),
            store,
            probe,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Checker for `storage`, or `None` if it has no configured path
    pub fn checker(&self, storage: &str) -> Option<Checker> {
        let path = self.storages.get(storage)?.path.as_deref()?;
        Some(Checker::new(
            StorageKey::new(storage, self.hostname.clone()),
            path,
            self.settings.clone(),
            self.store.clone(),
            self.store_timeout,
            self.probe.clone(),
        ))
    }

    /// Checks all configured storages concurrently, in name order
    pub async fn check_all(&self) -> Vec<CheckResult> {
        let checks = self
            .storages
            .keys()
            .map(|storage| self.check_storage(storage));
        join_all(checks).await
    }

    async fn check_storage(&self, storage: &str) -> CheckResult {
        let Some(checker) = self.checker(storage) else {
            tracing::error!(storage = %storage, "Path for storage is not configured");
            BreakerMetrics::global().record_check(storage, false);
            return CheckResult {
                storage: storage.to_string(),
                success: false,
            };
        };

        match checker.check_with_lease().await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(storage = %storage, error = %e, "Storage check failed");
                BreakerMetrics::global().record_check(storage, false);
                CheckResult {
                    storage: storage.to_string(),
                    success: false,
                }
            }
        }
    }

    /// Checks all storages every `check_interval` until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            storages = self.storages.len(),
            hostname = %self.hostname,
            "Storage checker starting"
        );

        let mut ticker = time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let results = self.check_all().await;
                    let failed = results.iter().filter(|r| !r.success).count();
                    tracing::debug!(checked = results.len(), failed, "Storage check round finished");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Storage checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockAvailabilityProbe;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOST: &str = "web-01";

    const CONFIG: &str = r#"
circuit_breaker:
  storage_timeout: 1
  access_retries: 1
storages:
  default:
    path: /var/storage/default
  nfs1:
    path: /mnt/nfs1
  nopath: {}
"#;

    fn fleet(probe: impl AvailabilityProbe + 'static) -> (FleetChecker, Arc<MemoryStore>) {
        let config = Config::from_yaml_with_env(CONFIG).unwrap();
        let store = Arc::new(MemoryStore::new());
        let fleet = FleetChecker::new(&config, store.clone(), Arc::new(probe)).with_hostname(HOST);
        (fleet, store)
    }

    /// Probe that takes a while and tracks how many calls overlap
    struct SlowProbe {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowProbe {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AvailabilityProbe for SlowProbe {
        async fn storage_available(&self, _path: &str, _timeout: Duration, _retries: u32) -> bool {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn test_check_all_reports_every_configured_storage() {
        let mut probe = MockAvailabilityProbe::new();
        probe
            .expect_storage_available()
            .times(2)
            .returning(|path, _, _| path == "/var/storage/default");
        let (fleet, _store) = fleet(probe);

        let results = fleet.check_all().await;

        assert_eq!(
            results,
            vec![
                CheckResult {
                    storage: "default".to_string(),
                    success: true
                },
                CheckResult {
                    storage: "nfs1".to_string(),
                    success: false
                },
                CheckResult {
                    storage: "nopath".to_string(),
                    success: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_check_records_failure_and_success_clears_it() {
        let mut probe = MockAvailabilityProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_storage_available()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| false);
        probe
            .expect_storage_available()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| true);
        let (fleet, store) = fleet(probe);
        let checker = fleet.checker("nfs1").unwrap();
        let cache_key = checker.key().cache_key();

        assert!(!checker.check().await.unwrap().success);
        assert!(!checker.check().await.unwrap().success);
        let fields = store.read_fields(&cache_key).await.unwrap();
        assert_eq!(fields.failure_count, Some(2));
        assert!(fields.first_failure.is_some());
        assert!(fields.first_failure <= fields.last_failure);

        assert!(checker.check().await.unwrap().success);
        let fields = store.read_fields(&cache_key).await.unwrap();
        assert_eq!(fields.failure_count, Some(0));
        assert_eq!(fields.first_failure, None);
        assert_eq!(fields.last_failure, None);
    }

    #[tokio::test]
    async fn test_check_registers_known_key_with_timestamp_score() {
        let mut probe = MockAvailabilityProbe::new();
        probe.expect_storage_available().returning(|_, _, _| true);
        let (fleet, store) = fleet(probe);
        let before = Utc::now().timestamp() as f64;

        let checker = fleet.checker("default").unwrap();
        checker.check().await.unwrap();

        assert_eq!(
            store.all_known_keys().await.unwrap(),
            vec!["storage_accessible:default:web-01"]
        );
        let score = store.known_key_score(&checker.key().cache_key()).unwrap();
        assert!(score >= before);
    }

    #[tokio::test]
    async fn test_checker_is_none_without_path() {
        let (fleet, _store) = fleet(MockAvailabilityProbe::new());
        assert!(fleet.checker("nopath").is_none());
        assert!(fleet.checker("missing").is_none());
        assert!(fleet.checker("default").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_with_lease_never_overlap() {
        let probe = Arc::new(SlowProbe::new());
        let store = Arc::new(MemoryStore::new());
        let make_checker = || {
            Checker::new(
                StorageKey::new("default", HOST),
                "/var/storage/default",
                BreakerSettings::default(),
                store.clone(),
                Duration::from_secs(2),
                probe.clone(),
            )
        };
        let first = make_checker();
        let second = make_checker();

        let (a, b) = tokio::join!(first.check_with_lease(), second.check_with_lease());

        assert!(a.unwrap().success);
        assert!(b.unwrap().success);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lease_ttl_outlasts_probe_and_store_round_trips() {
        assert_eq!(
            lease_ttl(Duration::from_secs(15), Duration::from_secs(2)),
            Duration::from_secs(15 + 2 * 7 + 5)
        );
    }

    #[tokio::test]
    async fn test_fleet_checker_lease_covers_slow_store() {
        let yaml = format!("{}redis:\n  operation_timeout_ms: 3000\n", CONFIG);
        let config = Config::from_yaml_with_env(&yaml).unwrap();
        let fleet = FleetChecker::new(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(MockAvailabilityProbe::new()),
        );

        let checker = fleet.checker("default").unwrap();

        // storage_timeout 1s, seven 3s round trips, 5s margin
        assert_eq!(checker.lease_ttl(), Duration::from_secs(1 + 21 + 5));
    }

    #[tokio::test]
    async fn test_lease_is_released_after_check() {
        let mut probe = MockAvailabilityProbe::new();
        probe.expect_storage_available().returning(|_, _, _| true);
        let (fleet, store) = fleet(probe);
        let checker = fleet.checker("default").unwrap();

        checker.check_with_lease().await.unwrap();

        let lease_key = checker.key().lease_key();
        assert!(store
            .try_acquire_lease(&lease_key, "someone-else", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let mut probe = MockAvailabilityProbe::new();
        let calls = probe_calls.clone();
        probe.expect_storage_available().returning(move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        });
        let (fleet, _store) = fleet(probe);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(fleet.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("checker loop should stop")
            .unwrap();
        // First tick fires immediately: both storages with a path were probed
        assert!(probe_calls.load(Ordering::SeqCst) >= 2);
    }
}
