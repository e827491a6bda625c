// In-process shared-state store
//
// Same semantics as the Redis store, held behind a single mutex. Used by
// tests and by deployments running on a single host.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{FailureField, SharedStateStore, StoredFields};
use crate::constants::KNOWN_KEYS;
use crate::error::StoreError;

#[derive(Debug)]
struct HeldLease {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    hashes: HashMap<String, HashMap<FailureField, i64>>,
    known_keys: HashMap<String, f64>,
    leases: HashMap<String, HeldLease>,
}

/// Shared-state store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a hash exists at `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().hashes.contains_key(key)
    }

    /// Score of `key` in the known-keys index
    pub fn known_key_score(&self, key: &str) -> Option<f64> {
        self.state.lock().known_keys.get(key).copied()
    }
}

#[async_trait]
impl SharedStateStore for MemoryStore {
    async fn read_fields(&self, key: &str) -> Result<StoredFields, StoreError> {
        let state = self.state.lock();
        let Some(hash) = state.hashes.get(key) else {
            return Ok(StoredFields::default());
        };

        Ok(StoredFields {
            failure_count: hash
                .get(&FailureField::FailureCount)
                .map(|count| (*count).max(0) as u64),
            first_failure: hash.get(&FailureField::FirstFailure).copied(),
            last_failure: hash.get(&FailureField::LastFailure).copied(),
        })
    }

    async fn write_field(
        &self,
        key: &str,
        field: FailureField,
        value: i64,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field, value);
        Ok(())
    }

    async fn clear_field(&self, key: &str, field: FailureField) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(&field);
            // Redis drops a hash once its last field is gone
            if hash.is_empty() {
                state.hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn register_known_key(&self, key: &str, score: f64) -> Result<(), StoreError> {
        self.state.lock().known_keys.insert(key.to_string(), score);
        Ok(())
    }

    async fn all_known_keys(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock();
        let mut entries: Vec<(&String, f64)> = state
            .known_keys
            .iter()
            .map(|(key, score)| (key, *score))
            .collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().map(|(key, _)| key.clone()).collect())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().hashes.remove(key);
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let keys: Vec<String> = state.known_keys.drain().map(|(key, _)| key).collect();
        for key in keys {
            state.hashes.remove(&key);
        }
        tracing::debug!(index = KNOWN_KEYS, "Cleared in-memory failure state");
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(held) = state.leases.get(name) {
            if held.expires_at > now {
                return Ok(false);
            }
        }
        state.leases.insert(
            name.to_string(),
            HeldLease {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, name: &str, token: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        match state.leases.get(name) {
            Some(held) if held.token == token => {
                state.leases.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
