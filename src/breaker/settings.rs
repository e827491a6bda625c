//! Breaker thresholds and the derived circuit state
//!
//! State is never stored. It is recomputed on every access from the
//! current [`FailureRecord`] and these settings:
//!
//! - **Open**: `failure_count >= failure_count_threshold` and the last
//!   failure is within `failure_reset_time`
//! - **BackingOff**: `failure_count > backoff_threshold` and the last
//!   failure is within `failure_wait_time`
//! - **Closed**: everything else, including old failures that aged out
//!   without an explicit success

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::constants::{
    DEFAULT_ACCESS_RETRIES, DEFAULT_BACKOFF_THRESHOLD, DEFAULT_FAILURE_COUNT_THRESHOLD,
    DEFAULT_FAILURE_RESET_TIME_SECS, DEFAULT_FAILURE_WAIT_TIME_SECS, DEFAULT_STORAGE_TIMEOUT_SECS,
};
use crate::failure::FailureRecord;

/// Derived circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Operations pass through (after a probe)
    Closed,
    /// Recent failure, shed load for `failure_wait_time`
    BackingOff,
    /// Sustained failure, reject for up to `failure_reset_time`
    Open,
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Failures needed to open the circuit
    pub failure_count_threshold: u64,
    /// Cool-down after a failure while backing off
    pub failure_wait_time: Duration,
    /// Window after which recorded failures no longer count
    pub failure_reset_time: Duration,
    /// Total time allowed for one probe
    pub storage_timeout: Duration,
    /// Probe attempts within `storage_timeout`
    pub access_retries: u32,
    /// Failures above which a recent failure triggers backing off
    pub backoff_threshold: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_count_threshold: DEFAULT_FAILURE_COUNT_THRESHOLD,
            failure_wait_time: Duration::from_secs(DEFAULT_FAILURE_WAIT_TIME_SECS),
            failure_reset_time: Duration::from_secs(DEFAULT_FAILURE_RESET_TIME_SECS),
            storage_timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT_SECS),
            access_retries: DEFAULT_ACCESS_RETRIES,
            backoff_threshold: DEFAULT_BACKOFF_THRESHOLD,
        }
    }
}

impl BreakerSettings {
    pub fn circuit_broken(&self, record: &FailureRecord, now: DateTime<Utc>) -> bool {
        record.failure_count() >= self.failure_count_threshold
            && !record.no_failures()
            && within(record.last_failure(), self.failure_reset_time, now)
    }

    pub fn backing_off(&self, record: &FailureRecord, now: DateTime<Utc>) -> bool {
        record.failure_count() > self.backoff_threshold
            && within(record.last_failure(), self.failure_wait_time, now)
    }

    pub fn state(&self, record: &FailureRecord, now: DateTime<Utc>) -> CircuitState {
        if self.circuit_broken(record, now) {
            CircuitState::Open
        } else if self.backing_off(record, now) {
            CircuitState::BackingOff
        } else {
            CircuitState::Closed
        }
    }

    /// Whether the backing-off state can ever be observed
    ///
    /// With `backoff_threshold >= failure_count_threshold` any count high
    /// enough to back off already opens the circuit, unless the wait window
    /// outlasts the reset window.
    pub fn backing_off_reachable(&self) -> bool {
        self.backoff_threshold < self.failure_count_threshold
            || self.failure_wait_time > self.failure_reset_time
    }

    pub fn failure_wait_secs(&self) -> u64 {
        self.failure_wait_time.as_secs()
    }

    pub fn failure_reset_secs(&self) -> u64 {
        self.failure_reset_time.as_secs()
    }
}

/// True if `last` happened no longer than `window` before `now`
fn within(last: Option<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return false;
    };
    let elapsed = now.timestamp() - last.timestamp();
    let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    elapsed <= window
}
