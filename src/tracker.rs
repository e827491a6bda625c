// Failure bookkeeping against the shared store
//
// Shared by the request-scoped circuit breaker and the fleet checker: both
// read the current record, stamp failures and clear the streak on success.
// Updates are independent field writes; concurrent writers may under-count
// (read-then-increment), which the thresholds tolerate.
//
// The known-keys index can be cleared by any host at any time, so every
// recorded failure re-adds its key.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::StoreError;
use crate::failure::FailureRecord;
use crate::store::{FailureField, SharedStateStore, StorageKey};

/// Reads and updates the failure record of one storage+host key
pub struct FailureTracker {
    key: StorageKey,
    cache_key: String,
    store: Arc<dyn SharedStateStore>,
    registered: AtomicBool,
}

impl FailureTracker {
    pub fn new(key: StorageKey, store: Arc<dyn SharedStateStore>) -> Self {
        let cache_key = key.cache_key();
        Self {
            key,
            cache_key,
            store,
            registered: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Current record, registering the key in the known-keys index on first use
    pub async fn current(&self) -> Result<FailureRecord, StoreError> {
        if !self.registered.load(Ordering::Acquire) {
            self.register(0.0).await?;
            self.registered.store(true, Ordering::Release);
        }
        let fields = self.store.read_fields(&self.cache_key).await?;
        Ok(FailureRecord::from_stored(fields))
    }

    /// Adds the key to the known-keys index with `score`
    pub async fn register(&self, score: f64) -> Result<(), StoreError> {
        self.store.register_known_key(&self.cache_key, score).await
    }

    /// Stamps one more failure at `now` and returns the new record
    pub async fn record_failure(&self, now: DateTime<Utc>) -> Result<FailureRecord, StoreError> {
        let previous = self.current().await?;
        let next = previous.with_failure(now);

        self.register(0.0).await?;

        if previous.first_failure().is_none() {
            self.store
                .write_field(&self.cache_key, FailureField::FirstFailure, now.timestamp())
                .await?;
        }
        self.store
            .write_field(&self.cache_key, FailureField::LastFailure, now.timestamp())
            .await?;
        self.store
            .write_field(
                &self.cache_key,
                FailureField::FailureCount,
                next.failure_count() as i64,
            )
            .await?;

        tracing::warn!(
            storage = %self.key.storage(),
            hostname = %self.key.hostname(),
            failure_count = next.failure_count(),
            "Storage marked inaccessible"
        );
        Ok(next)
    }

    /// Clears the failure streak
    pub async fn record_success(&self) -> Result<(), StoreError> {
        let previous = self.current().await?;
        if previous.no_failures() {
            return Ok(());
        }

        self.store
            .write_field(&self.cache_key, FailureField::FailureCount, 0)
            .await?;
        self.store
            .clear_field(&self.cache_key, FailureField::LastFailure)
            .await?;
        self.store
            .clear_field(&self.cache_key, FailureField::FirstFailure)
            .await?;

        tracing::info!(
            storage = %self.key.storage(),
            hostname = %self.key.hostname(),
            previous_failures = previous.failure_count(),
            "Storage accessible again, failures cleared"
        );
        Ok(())
    }
}
