// Breaker registry
//
// Builds and caches one breaker per storage name for the local host.
// Storages missing from configuration, or configured without a path, get a
// null breaker carrying a misconfiguration error (or no error at all when
// unconfigured storages are allowed through).

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::circuit::CircuitBreaker;
use super::null::NullCircuitBreaker;
use super::settings::BreakerSettings;
use super::switch::BreakerSwitches;
use super::Breaker;
use crate::config::{Config, StorageConfig};
use crate::error::{BreakerError, StoreError};
use crate::probe::AvailabilityProbe;
use crate::store::key::local_hostname;
use crate::store::{SharedStateStore, StorageKey};

/// Hands out breakers for the storages of one host
pub struct BreakerRegistry {
    settings: BreakerSettings,
    storages: BTreeMap<String, StorageConfig>,
    reject_unconfigured: bool,
    hostname: String,
    store: Arc<dyn SharedStateStore>,
    probe: Arc<dyn AvailabilityProbe>,
    switches: BreakerSwitches,
    breakers: DashMap<String, Arc<Breaker>>,
}

impl BreakerRegistry {
    pub fn new(
        config: &Config,
        store: Arc<dyn SharedStateStore>,
        probe: Arc<dyn AvailabilityProbe>,
    ) -> Self {
        Self {
            settings: config.circuit_breaker.to_breaker_settings(),
            storages: config.storages.clone(),
            reject_unconfigured: config.circuit_breaker.reject_unconfigured_storages,
            hostname: local_hostname().to_string(),
            store,
            probe,
            switches: BreakerSwitches::default(),
            breakers: DashMap::new(),
        }
    }

    pub fn with_switches(mut self, switches: BreakerSwitches) -> Self {
        self.switches = switches;
        self
    }

    /// Overrides the local hostname (for tools acting on behalf of another host)
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SharedStateStore> {
        &self.store
    }

    pub fn storage_names(&self) -> impl Iterator<Item = &str> {
        self.storages.keys().map(String::as_str)
    }

    /// Breaker for `storage` on this host, built on first use
    pub fn for_storage(&self, storage: &str) -> Arc<Breaker> {
        if let Some(breaker) = self.breakers.get(storage) {
            return breaker.clone();
        }

        self.breakers
            .entry(storage.to_string())
            .or_insert_with(|| Arc::new(self.build(storage)))
            .clone()
    }

    /// Builds a fresh, uncached breaker for `storage`
    pub fn build(&self, storage: &str) -> Breaker {
        let key = StorageKey::new(storage, self.hostname.clone());

        let Some(config) = self.storages.get(storage) else {
            if !self.reject_unconfigured {
                return Breaker::Null(NullCircuitBreaker::new(
                    key,
                    self.settings.failure_count_threshold,
                    None,
                ));
            }
            return self.misconfigured(key, format!("Storage '{}' is not configured", storage));
        };

        let Some(path) = config.path.as_deref() else {
            return self.misconfigured(
                key,
                format!("Path for storage '{}' is not configured", storage),
            );
        };

        Breaker::Circuit(CircuitBreaker::new(
            key,
            path,
            self.settings.clone(),
            self.store.clone(),
            self.probe.clone(),
            self.switches.clone(),
        ))
    }

    /// Deletes every failure record in the store and drops cached breakers
    pub async fn reset_all(&self) -> Result<(), StoreError> {
        self.store.reset_all().await?;
        self.breakers.clear();
        tracing::info!("All storage failure records reset");
        Ok(())
    }

    fn misconfigured(&self, key: StorageKey, message: String) -> Breaker {
        tracing::warn!(storage = %key.storage(), message = %message, "Storage misconfigured");
        Breaker::Null(NullCircuitBreaker::new(
            key,
            self.settings.failure_count_threshold,
            Some(BreakerError::Misconfiguration {
                message,
                retry_after: self.settings.failure_reset_secs(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{RequestScope, StorageBreaker};
    use crate::probe::MockAvailabilityProbe;
    use crate::store::MemoryStore;

    const CONFIG: &str = r#"
storages:
  default:
    path: /var/storage/default
  nopath: {}
"#;

    fn registry(yaml: &str, probe: MockAvailabilityProbe) -> (BreakerRegistry, Arc<MemoryStore>) {
        let config = Config::from_yaml_with_env(yaml).unwrap();
        let store = Arc::new(MemoryStore::new());
        let registry =
            BreakerRegistry::new(&config, store.clone(), Arc::new(probe)).with_hostname("web-01");
        (registry, store)
    }

    #[tokio::test]
    async fn test_configured_storage_gets_circuit_breaker() {
        let (registry, _store) = registry(CONFIG, MockAvailabilityProbe::new());

        let breaker = registry.for_storage("default");

        assert!(!breaker.is_null());
        assert_eq!(breaker.storage(), "default");
        assert_eq!(breaker.hostname(), "web-01");
        assert_eq!(breaker.failure_count_threshold(), 10);
    }

    #[tokio::test]
    async fn test_for_storage_is_cached() {
        let (registry, _store) = registry(CONFIG, MockAvailabilityProbe::new());

        let first = registry.for_storage("default");
        let second = registry.for_storage("default");

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unknown_storage_is_rejected_as_misconfigured() {
        let (registry, _store) = registry(CONFIG, MockAvailabilityProbe::new());

        let breaker = registry.for_storage("missing");
        assert!(breaker.is_null());

        let result: Result<(), BreakerError> = breaker
            .perform(&RequestScope::new(), || async { Ok(()) })
            .await;
        match result {
            Err(BreakerError::Misconfiguration {
                message,
                retry_after,
            }) => {
                assert_eq!(message, "Storage 'missing' is not configured");
                assert_eq!(retry_after, 1800);
            }
            other => panic!("expected misconfiguration, got {:?}", other),
        }
        assert!(breaker.circuit_broken().await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_without_path_is_rejected_as_misconfigured() {
        let (registry, _store) = registry(CONFIG, MockAvailabilityProbe::new());

        let result: Result<(), BreakerError> = registry
            .for_storage("nopath")
            .perform(&RequestScope::new(), || async { Ok(()) })
            .await;

        match result {
            Err(BreakerError::Misconfiguration { message, .. }) => {
                assert_eq!(message, "Path for storage 'nopath' is not configured");
            }
            other => panic!("expected misconfiguration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_storage_passes_through_when_allowed() {
        let yaml = format!("{}circuit_breaker:\n  reject_unconfigured_storages: false\n", CONFIG);
        let (registry, _store) = registry(&yaml, MockAvailabilityProbe::new());

        let breaker = registry.for_storage("missing");
        let result: Result<u8, BreakerError> = breaker
            .perform(&RequestScope::new(), || async { Ok(7) })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert!(!breaker.circuit_broken().await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_all_clears_store_and_cache() {
        let mut probe = MockAvailabilityProbe::new();
        probe
            .expect_storage_available()
            .times(1)
            .returning(|_, _, _| false);
        let (registry, store) = registry(CONFIG, probe);

        let breaker = registry.for_storage("default");
        let result: Result<(), BreakerError> = breaker
            .perform(&RequestScope::new(), || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(BreakerError::Inaccessible { .. })));
        assert_eq!(breaker.failure_count().await.unwrap(), 1);

        registry.reset_all().await.unwrap();

        assert!(store.all_known_keys().await.unwrap().is_empty());
        assert!(!store.contains_key("storage_accessible:default:web-01"));
        assert!(!Arc::ptr_eq(&breaker, &registry.for_storage("default")));
    }
}
