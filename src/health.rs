// Storage health reporting
//
// Read-only view over the shared store: for each configured storage, the
// failure counts of every host that ever touched it, summarized for
// dashboards and alerts.

use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::StoreError;
use crate::failure::FailureRecord;
use crate::store::key::{hostname_from_key, prefix_for_storage};
use crate::store::SharedStateStore;

/// Failure count of one storage+host key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFailure {
    /// Full storage key, hostname last
    pub name: String,
    pub failure_count: u64,
}

impl HostFailure {
    pub fn hostname(&self) -> &str {
        hostname_from_key(&self.name)
    }
}

/// Health of one storage across all hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    storage_name: String,
    info: Vec<HostFailure>,
}

impl Health {
    pub fn new(storage_name: impl Into<String>, info: Vec<HostFailure>) -> Self {
        Self {
            storage_name: storage_name.into(),
            info,
        }
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Every host key seen for this storage, failing or not
    pub fn info(&self) -> &[HostFailure] {
        &self.info
    }

    /// Hosts with at least one recorded failure
    pub fn failing_info(&self) -> Vec<&HostFailure> {
        self.info
            .iter()
            .filter(|host| host.failure_count > 0)
            .collect()
    }

    pub fn failing(&self) -> bool {
        self.info.iter().any(|host| host.failure_count > 0)
    }

    pub fn total_failures(&self) -> u64 {
        self.info.iter().map(|host| host.failure_count).sum()
    }

    /// Hostnames with at least one recorded failure
    pub fn failing_on_hosts(&self) -> Vec<&str> {
        self.info
            .iter()
            .filter(|host| host.failure_count > 0)
            .map(HostFailure::hostname)
            .collect()
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            storage_name: self.storage_name.clone(),
            failing_info: self.failing_info().into_iter().cloned().collect(),
            total_failures: self.total_failures(),
            failing_on_hosts: self
                .failing_on_hosts()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Serializable summary of a [`Health`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub storage_name: String,
    pub failing_info: Vec<HostFailure>,
    pub total_failures: u64,
    pub failing_on_hosts: Vec<String>,
}

/// Builds [`Health`] views for the configured storages
pub struct HealthAggregator {
    storage_names: Vec<String>,
    store: Arc<dyn SharedStateStore>,
}

impl HealthAggregator {
    pub fn new(config: &Config, store: Arc<dyn SharedStateStore>) -> Self {
        Self {
            storage_names: config.storage_names(),
            store,
        }
    }

    pub async fn for_all_storages(&self) -> Result<Vec<Health>, StoreError> {
        let known_keys = self.store.all_known_keys().await?;

        let mut all = Vec::with_capacity(self.storage_names.len());
        for storage in &self.storage_names {
            let prefix = prefix_for_storage(storage);
            let keys = known_keys.iter().filter(|key| key.starts_with(&prefix));
            let info = try_join_all(keys.map(|key| self.host_failure(key))).await?;
            all.push(Health::new(storage.clone(), info));
        }
        Ok(all)
    }

    pub async fn for_failing_storages(&self) -> Result<Vec<Health>, StoreError> {
        let mut all = self.for_all_storages().await?;
        all.retain(Health::failing);
        Ok(all)
    }

    async fn host_failure(&self, key: &str) -> Result<HostFailure, StoreError> {
        let fields = self.store.read_fields(key).await?;
        Ok(HostFailure {
            name: key.to_string(),
            failure_count: FailureRecord::from_stored(fields).failure_count(),
        })
    }
}
