//! Storage circuit breaker
//!
//! Guards operations against one storage as seen from one host. Each
//! `perform` call:
//!
//! 1. runs the operation directly when the kill switch or feature toggle
//!    says so
//! 2. rejects with `CircuitOpen` while the circuit is open
//! 3. rejects with `Failing` while backing off
//! 4. probes the storage (once per request scope) and on failure records
//!    it and rejects with `Inaccessible`
//! 5. clears recorded failures and runs the operation, passing its result
//!    and errors through untouched

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;

use super::scope::RequestScope;
use super::settings::BreakerSettings;
use super::switch::BreakerSwitches;
use super::StorageBreaker;
use crate::error::{BreakerError, StoreError};
use crate::failure::FailureRecord;
use crate::metrics::BreakerMetrics;
use crate::probe::AvailabilityProbe;
use crate::store::{SharedStateStore, StorageKey};
use crate::tracker::FailureTracker;

/// Circuit breaker for one configured storage
pub struct CircuitBreaker {
    storage_path: String,
    settings: BreakerSettings,
    tracker: FailureTracker,
    probe: Arc<dyn AvailabilityProbe>,
    switches: BreakerSwitches,
}

impl CircuitBreaker {
    pub fn new(
        key: StorageKey,
        storage_path: impl Into<String>,
        settings: BreakerSettings,
        store: Arc<dyn SharedStateStore>,
        probe: Arc<dyn AvailabilityProbe>,
        switches: BreakerSwitches,
    ) -> Self {
        Self {
            storage_path: storage_path.into(),
            settings,
            tracker: FailureTracker::new(key, store),
            probe,
            switches,
        }
    }

    pub fn key(&self) -> &StorageKey {
        self.tracker.key()
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Runs `operation` unless the storage is considered untrustworthy
    ///
    /// Breaker rejections are converted into `E`; errors returned by the
    /// operation itself are passed through as-is.
    pub async fn perform<F, Fut, T, E>(&self, scope: &RequestScope, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BreakerError>,
    {
        if self.switches.bypass() {
            tracing::trace!(storage = %self.key().storage(), "Circuit breaker bypassed");
            return operation().await;
        }

        self.check_storage_accessible(scope).await.map_err(E::from)?;
        operation().await
    }

    /// Decides whether the storage may be used right now, probing if needed
    pub async fn check_storage_accessible(&self, scope: &RequestScope) -> Result<(), BreakerError> {
        let record = self.tracker.current().await?;
        let now = Utc::now();

        if self.settings.circuit_broken(&record, now) {
            return Err(self.reject(BreakerError::CircuitOpen {
                storage: self.key().storage().to_string(),
                retry_after: self.settings.failure_reset_secs(),
            }));
        }

        if self.settings.backing_off(&record, now) {
            return Err(self.reject(BreakerError::Failing {
                storage: self.key().storage().to_string(),
                retry_after: self.settings.failure_wait_secs(),
            }));
        }

        if !self.storage_available(scope).await {
            self.track_storage_inaccessible().await?;
            return Err(self.reject(BreakerError::Inaccessible {
                storage: self.key().storage().to_string(),
                retry_after: self.settings.failure_wait_secs(),
            }));
        }

        self.track_storage_accessible().await?;
        Ok(())
    }

    /// Clears the failure streak
    pub async fn track_storage_accessible(&self) -> Result<(), StoreError> {
        self.tracker.record_success().await
    }

    /// Records one more failure at the current time
    pub async fn track_storage_inaccessible(&self) -> Result<FailureRecord, StoreError> {
        self.tracker.record_failure(Utc::now()).await
    }

    pub(crate) fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    async fn storage_available(&self, scope: &RequestScope) -> bool {
        if scope.storage_accessible(self.key()) {
            return true;
        }

        let available = self
            .probe
            .storage_available(
                &self.storage_path,
                self.settings.storage_timeout,
                self.settings.access_retries,
            )
            .await;

        if available {
            scope.mark_accessible(self.key());
        }
        available
    }

    fn reject(&self, err: BreakerError) -> BreakerError {
        tracing::debug!(
            storage = %self.key().storage(),
            hostname = %self.key().hostname(),
            reason = err.reason(),
            retry_after = err.retry_after(),
            "Storage operation rejected"
        );
        BreakerMetrics::global().record_rejection(self.key().storage(), err.reason());
        err
    }
}

#[async_trait]
impl StorageBreaker for CircuitBreaker {
    fn storage(&self) -> &str {
        self.key().storage()
    }

    fn hostname(&self) -> &str {
        self.key().hostname()
    }

    fn failure_count_threshold(&self) -> u64 {
        self.settings.failure_count_threshold
    }

    async fn failure_info(&self) -> Result<FailureRecord, StoreError> {
        self.tracker.current().await
    }

    async fn circuit_broken(&self) -> Result<bool, StoreError> {
        let record = self.tracker.current().await?;
        Ok(self.settings.circuit_broken(&record, Utc::now()))
    }

    async fn backing_off(&self) -> Result<bool, StoreError> {
        let record = self.tracker.current().await?;
        Ok(self.settings.backing_off(&record, Utc::now()))
    }
}
