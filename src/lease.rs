// Exclusive lease
//
// Time-bounded mutual exclusion across hosts, backed by the shared store.
// A lease is identified by its key and owned through a random token; only
// the owner can cancel it, and it expires on its own after `ttl` if the
// owner dies.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::LEASE_RETRY_INTERVAL_MS;
use crate::error::StoreError;
use crate::store::SharedStateStore;

pub struct ExclusiveLease {
    store: Arc<dyn SharedStateStore>,
    key: String,
    ttl: Duration,
}

impl ExclusiveLease {
    pub fn new(store: Arc<dyn SharedStateStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Takes the lease if it is free, returning the ownership token
    pub async fn try_obtain(&self) -> Result<Option<String>, StoreError> {
        let token = uuid::Uuid::new_v4().to_string();
        if self
            .store
            .try_acquire_lease(&self.key, &token, self.ttl)
            .await?
        {
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Waits until the lease can be taken
    ///
    /// A holder that never cancels only delays this by `ttl`.
    pub async fn obtain(&self) -> Result<String, StoreError> {
        let retry_interval = Duration::from_millis(LEASE_RETRY_INTERVAL_MS);
        let mut contended = false;
        loop {
            if let Some(token) = self.try_obtain().await? {
                return Ok(token);
            }
            if !contended {
                tracing::debug!(lease = %self.key, "Lease held elsewhere, waiting");
                contended = true;
            }
            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Releases the lease if `token` still owns it
    pub async fn cancel(&self, token: &str) -> Result<bool, StoreError> {
        let released = self.store.release_lease(&self.key, token).await?;
        if !released {
            tracing::debug!(lease = %self.key, "Lease expired or taken over before release");
        }
        Ok(released)
    }
}
