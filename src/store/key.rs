// Storage key formatting and parsing

use std::fmt;
use std::sync::OnceLock;

use crate::constants::{LEASE_KEY_PREFIX, STORAGE_KEY_PREFIX};

/// Identity of one storage as seen from one host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    storage: String,
    hostname: String,
}

impl StorageKey {
    pub fn new(storage: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            hostname: hostname.into(),
        }
    }

    /// Key for `storage` on the local host
    pub fn local(storage: impl Into<String>) -> Self {
        Self::new(storage, local_hostname())
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Shared store key: `storage_accessible:{storage}:{hostname}`
    pub fn cache_key(&self) -> String {
        format!("{}{}:{}", STORAGE_KEY_PREFIX, self.storage, self.hostname)
    }

    /// Lease name serializing checks of this storage+host
    pub fn lease_key(&self) -> String {
        format!("{}{}", LEASE_KEY_PREFIX, self.cache_key())
    }

    /// Parses a key produced by [`StorageKey::cache_key`]
    ///
    /// The hostname is the last `:`-separated segment.
    pub fn parse(cache_key: &str) -> Option<Self> {
        let rest = cache_key.strip_prefix(STORAGE_KEY_PREFIX)?;
        let (storage, hostname) = rest.rsplit_once(':')?;
        if storage.is_empty() || hostname.is_empty() {
            return None;
        }
        Some(Self::new(storage, hostname))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.storage, self.hostname)
    }
}

/// Prefix shared by every key of `storage`, across all hosts
pub fn prefix_for_storage(storage: &str) -> String {
    format!("{}{}:", STORAGE_KEY_PREFIX, storage)
}

/// Hostname from the last segment of a storage key
pub fn hostname_from_key(cache_key: &str) -> &str {
    cache_key.rsplit(':').next().unwrap_or(cache_key)
}

/// Hostname of this machine, resolved once per process
pub fn local_hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not resolve hostname, using 'localhost'");
            "localhost".to_string()
        }
    })
}
