//! Shared-state store abstraction
//!
//! Failure bookkeeping lives in a store shared by every host of the fleet:
//! one hash per storage+host key (`failure_count`, `first_failure`,
//! `last_failure`) plus a sorted set of all known keys. Individual field
//! reads and writes are atomic; nothing here spans several keys in a
//! transaction.
//!
//! Implementations:
//! - [`MemoryStore`]: in-process, for tests and single-node setups
//! - [`RedisStore`]: the fleet-wide store

use async_trait::async_trait;
use std::time::Duration;

use crate::constants::{FIELD_FAILURE_COUNT, FIELD_FIRST_FAILURE, FIELD_LAST_FAILURE};
use crate::error::StoreError;

pub mod key;
pub mod memory;
pub mod redis;

pub use key::StorageKey;
pub use memory::MemoryStore;
pub use self::redis::{RedisConfig, RedisStore};

/// Hash fields of a failure record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureField {
    FailureCount,
    FirstFailure,
    LastFailure,
}

impl FailureField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureField::FailureCount => FIELD_FAILURE_COUNT,
            FailureField::FirstFailure => FIELD_FIRST_FAILURE,
            FailureField::LastFailure => FIELD_LAST_FAILURE,
        }
    }
}

/// Raw field values as read from the store; absent fields are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredFields {
    pub failure_count: Option<u64>,
    pub first_failure: Option<i64>,
    pub last_failure: Option<i64>,
}

impl StoredFields {
    /// Parses the stringified values of the three hash fields
    pub fn parse(
        failure_count: Option<&str>,
        first_failure: Option<&str>,
        last_failure: Option<&str>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            failure_count: parse_field(FailureField::FailureCount, failure_count)?,
            first_failure: parse_field(FailureField::FirstFailure, first_failure)?,
            last_failure: parse_field(FailureField::LastFailure, last_failure)?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    field: FailureField,
    raw: Option<&str>,
) -> Result<Option<T>, StoreError> {
    raw.map(|value| {
        value.parse().map_err(|_| StoreError::MalformedValue {
            field: field.as_str().to_string(),
            value: value.to_string(),
        })
    })
    .transpose()
}

/// Store holding failure hashes, the known-keys index and check leases
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Read all three failure fields of `key` in one round trip
    async fn read_fields(&self, key: &str) -> Result<StoredFields, StoreError>;

    /// Set one field, leaving the others untouched
    async fn write_field(&self, key: &str, field: FailureField, value: i64)
        -> Result<(), StoreError>;

    /// Remove one field, leaving the others untouched
    async fn clear_field(&self, key: &str, field: FailureField) -> Result<(), StoreError>;

    /// Add `key` to the known-keys index (re-adding updates the score)
    async fn register_known_key(&self, key: &str, score: f64) -> Result<(), StoreError>;

    /// Every key in the known-keys index, ordered by score then name
    async fn all_known_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove the hash stored at `key`
    async fn delete_key(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every known key and the index itself; a no-op when empty
    async fn reset_all(&self) -> Result<(), StoreError>;

    /// Take the lease `name` for `token` unless someone else holds it
    async fn try_acquire_lease(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Release the lease `name` if it is still owned by `token`
    async fn release_lease(&self, name: &str, token: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_match_wire_contract() {
        assert_eq!(FailureField::FailureCount.as_str(), "failure_count");
        assert_eq!(FailureField::FirstFailure.as_str(), "first_failure");
        assert_eq!(FailureField::LastFailure.as_str(), "last_failure");
    }

    #[test]
    fn test_parse_absent_fields() {
        let fields = StoredFields::parse(None, None, None).unwrap();
        assert_eq!(fields, StoredFields::default());
    }

    #[test]
    fn test_parse_stringified_values() {
        let fields =
            StoredFields::parse(Some("3"), Some("1700000000"), Some("1700000060")).unwrap();
        assert_eq!(fields.failure_count, Some(3));
        assert_eq!(fields.first_failure, Some(1_700_000_000));
        assert_eq!(fields.last_failure, Some(1_700_000_060));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = StoredFields::parse(Some("many"), None, None).unwrap_err();
        assert_eq!(
            err,
            StoreError::MalformedValue {
                field: "failure_count".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn test_store_trait_is_object_safe() {
        fn _takes_dyn(_store: &dyn SharedStateStore) {}
    }
}
