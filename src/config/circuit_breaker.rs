//! Circuit breaker configuration.
//!
//! This module defines the YAML configuration format for the storage
//! circuit breaker thresholds (the `circuitbreaker_*` installation
//! settings without their prefix). Times are in seconds.
//!
//! Default values for thresholds and timeouts are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::breaker::BreakerSettings;
use crate::constants::{
    DEFAULT_ACCESS_RETRIES, DEFAULT_BACKOFF_THRESHOLD, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_FAILURE_COUNT_THRESHOLD, DEFAULT_FAILURE_RESET_TIME_SECS,
    DEFAULT_FAILURE_WAIT_TIME_SECS, DEFAULT_STORAGE_TIMEOUT_SECS,
};

fn default_failure_count_threshold() -> u64 {
    DEFAULT_FAILURE_COUNT_THRESHOLD
}

fn default_failure_wait_time() -> u64 {
    DEFAULT_FAILURE_WAIT_TIME_SECS
}

fn default_failure_reset_time() -> u64 {
    DEFAULT_FAILURE_RESET_TIME_SECS
}

fn default_storage_timeout() -> u64 {
    DEFAULT_STORAGE_TIMEOUT_SECS
}

fn default_access_retries() -> u32 {
    DEFAULT_ACCESS_RETRIES
}

fn default_backoff_threshold() -> u64 {
    DEFAULT_BACKOFF_THRESHOLD
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_reject_unconfigured_storages() -> bool {
    true
}

/// Circuit breaker configuration (YAML format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfigYaml {
    /// Number of failures that opens the circuit
    #[serde(default = "default_failure_count_threshold")]
    pub failure_count_threshold: u64,
    /// Cool-down after a failure (seconds)
    #[serde(default = "default_failure_wait_time")]
    pub failure_wait_time: u64,
    /// Age after which failures stop counting (seconds)
    #[serde(default = "default_failure_reset_time")]
    pub failure_reset_time: u64,
    /// Total time allowed for one accessibility probe (seconds)
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout: u64,
    /// Probe attempts within `storage_timeout`
    #[serde(default = "default_access_retries")]
    pub access_retries: u32,
    /// Failure count above which a recent failure triggers backing off
    #[serde(default = "default_backoff_threshold")]
    pub backoff_threshold: u64,
    /// Interval between periodic fleet checks (seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Reject operations on unknown storages (false: let them through)
    #[serde(default = "default_reject_unconfigured_storages")]
    pub reject_unconfigured_storages: bool,
}

impl Default for CircuitBreakerConfigYaml {
    fn default() -> Self {
        Self {
            failure_count_threshold: default_failure_count_threshold(),
            failure_wait_time: default_failure_wait_time(),
            failure_reset_time: default_failure_reset_time(),
            storage_timeout: default_storage_timeout(),
            access_retries: default_access_retries(),
            backoff_threshold: default_backoff_threshold(),
            check_interval: default_check_interval(),
            reject_unconfigured_storages: default_reject_unconfigured_storages(),
        }
    }
}

impl CircuitBreakerConfigYaml {
    /// Convert to BreakerSettings from the breaker module
    pub fn to_breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_count_threshold: self.failure_count_threshold,
            failure_wait_time: Duration::from_secs(self.failure_wait_time),
            failure_reset_time: Duration::from_secs(self.failure_reset_time),
            storage_timeout: Duration::from_secs(self.storage_timeout),
            access_retries: self.access_retries,
            backoff_threshold: self.backoff_threshold,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}
