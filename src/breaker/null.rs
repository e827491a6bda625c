// Null circuit breaker
//
// Stand-in for storages that are missing from configuration or have no
// path. With an error it rejects every operation with that error and
// reports a fully broken circuit; without one it passes every operation
// through and reports a healthy storage. It never touches the store.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;

use super::scope::RequestScope;
use super::StorageBreaker;
use crate::error::{BreakerError, StoreError};
use crate::failure::FailureRecord;
use crate::metrics::BreakerMetrics;
use crate::store::StorageKey;

/// Breaker for an unusable storage definition
#[derive(Debug, Clone)]
pub struct NullCircuitBreaker {
    key: StorageKey,
    failure_count_threshold: u64,
    error: Option<BreakerError>,
}

impl NullCircuitBreaker {
    pub fn new(key: StorageKey, failure_count_threshold: u64, error: Option<BreakerError>) -> Self {
        Self {
            key,
            failure_count_threshold,
            error,
        }
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn error(&self) -> Option<&BreakerError> {
        self.error.as_ref()
    }

    /// Rejects with the configured error, or runs `operation` if there is none
    pub async fn perform<F, Fut, T, E>(&self, _scope: &RequestScope, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BreakerError>,
    {
        match &self.error {
            Some(err) => {
                BreakerMetrics::global().record_rejection(self.key.storage(), err.reason());
                Err(E::from(err.clone()))
            }
            None => operation().await,
        }
    }

    fn broken(&self) -> bool {
        self.error.is_some()
    }
}

#[async_trait]
impl StorageBreaker for NullCircuitBreaker {
    fn storage(&self) -> &str {
        self.key.storage()
    }

    fn hostname(&self) -> &str {
        self.key.hostname()
    }

    fn failure_count_threshold(&self) -> u64 {
        self.failure_count_threshold
    }

    /// Broken: threshold failures, last one "now". Otherwise: no failures.
    async fn failure_info(&self) -> Result<FailureRecord, StoreError> {
        if self.broken() {
            Ok(FailureRecord::failing_since(
                Utc::now(),
                self.failure_count_threshold.max(1),
            ))
        } else {
            Ok(FailureRecord::none())
        }
    }

    async fn circuit_broken(&self) -> Result<bool, StoreError> {
        Ok(self.broken())
    }

    async fn backing_off(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}
