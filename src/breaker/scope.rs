// Per-request memo of successful probes
//
// One logical request may call `perform` many times against the same
// storage; only the first call probes. Failed probes are not remembered so
// that a retry within the same request sees the recorded failure.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::store::StorageKey;

/// Scope of one logical request or job
#[derive(Debug, Default)]
pub struct RequestScope {
    accessible: Mutex<HashSet<StorageKey>>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a probe already found `key` accessible in this scope
    pub fn storage_accessible(&self, key: &StorageKey) -> bool {
        self.accessible.lock().contains(key)
    }

    pub(crate) fn mark_accessible(&self, key: &StorageKey) {
        self.accessible.lock().insert(key.clone());
    }
}
