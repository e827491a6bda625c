//! Storage circuit breakers
//!
//! [`Breaker`] is what callers hold: either a real [`CircuitBreaker`] for a
//! configured storage or a [`NullCircuitBreaker`] for one that cannot be
//! used. Both expose the same `perform` and [`StorageBreaker`] methods, so
//! callers never branch on which one they got.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;

use crate::error::{BreakerError, StoreError};
use crate::failure::FailureRecord;

pub mod circuit;
pub mod null;
pub mod registry;
pub mod scope;
pub mod settings;
pub mod switch;

pub use circuit::CircuitBreaker;
pub use null::NullCircuitBreaker;
pub use registry::BreakerRegistry;
pub use scope::RequestScope;
pub use settings::{BreakerSettings, CircuitState};
pub use switch::{AlwaysEnabled, BreakerSwitches, FeatureToggle, KillSwitch, RuntimeToggle};

/// Read-only view of a breaker's failure state
#[async_trait]
pub trait StorageBreaker: Send + Sync {
    fn storage(&self) -> &str;

    fn hostname(&self) -> &str;

    fn failure_count_threshold(&self) -> u64;

    async fn failure_info(&self) -> Result<FailureRecord, StoreError>;

    async fn circuit_broken(&self) -> Result<bool, StoreError>;

    async fn backing_off(&self) -> Result<bool, StoreError>;

    async fn last_failure(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.failure_info().await?.last_failure())
    }

    async fn failure_count(&self) -> Result<u64, StoreError> {
        Ok(self.failure_info().await?.failure_count())
    }

    async fn no_failures(&self) -> Result<bool, StoreError> {
        Ok(self.failure_info().await?.no_failures())
    }
}

/// Breaker handed out by [`BreakerRegistry::for_storage`]
pub enum Breaker {
    Circuit(CircuitBreaker),
    Null(NullCircuitBreaker),
}

impl Breaker {
    /// See [`CircuitBreaker::perform`] and [`NullCircuitBreaker::perform`]
    pub async fn perform<F, Fut, T, E>(&self, scope: &RequestScope, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BreakerError>,
    {
        match self {
            Breaker::Circuit(breaker) => breaker.perform(scope, operation).await,
            Breaker::Null(breaker) => breaker.perform(scope, operation).await,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Breaker::Null(_))
    }

    fn inner(&self) -> &dyn StorageBreaker {
        match self {
            Breaker::Circuit(breaker) => breaker,
            Breaker::Null(breaker) => breaker,
        }
    }
}

#[async_trait]
impl StorageBreaker for Breaker {
    fn storage(&self) -> &str {
        self.inner().storage()
    }

    fn hostname(&self) -> &str {
        self.inner().hostname()
    }

    fn failure_count_threshold(&self) -> u64 {
        self.inner().failure_count_threshold()
    }

    async fn failure_info(&self) -> Result<FailureRecord, StoreError> {
        self.inner().failure_info().await
    }

    async fn circuit_broken(&self) -> Result<bool, StoreError> {
        self.inner().circuit_broken().await
    }

    async fn backing_off(&self) -> Result<bool, StoreError> {
        self.inner().backing_off().await
    }
}
