// Constants module - centralized default values and wire names
//
// This module defines all default values used throughout the codebase,
// together with the fixed key names shared with every other host that
// writes to the same store.

// =============================================================================
// Shared store wire contract
// =============================================================================

/// Prefix for per storage+host failure hashes
pub const STORAGE_KEY_PREFIX: &str = "storage_accessible:";

/// Sorted set holding every failure key ever written
pub const KNOWN_KEYS: &str = "known_keys";

/// Prefix for the lease serializing fleet checks of one storage+host
pub const LEASE_KEY_PREFIX: &str = "storage_check:";

/// Hash field names
pub const FIELD_FAILURE_COUNT: &str = "failure_count";
pub const FIELD_FIRST_FAILURE: &str = "first_failure";
pub const FIELD_LAST_FAILURE: &str = "last_failure";

// =============================================================================
// Circuit breaker defaults
// =============================================================================

/// Default number of failures before the circuit opens
pub const DEFAULT_FAILURE_COUNT_THRESHOLD: u64 = 10;

/// Default cool-down after a failure, in seconds
pub const DEFAULT_FAILURE_WAIT_TIME_SECS: u64 = 30;

/// Default window after which recorded failures age out, in seconds
pub const DEFAULT_FAILURE_RESET_TIME_SECS: u64 = 1800;

/// Default total time allowed for one accessibility probe, in seconds
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 15;

/// Default number of probe attempts
pub const DEFAULT_ACCESS_RETRIES: u32 = 3;

/// Default failure count above which a recent failure triggers backing off
pub const DEFAULT_BACKOFF_THRESHOLD: u64 = 5;

/// Default interval between fleet checks, in seconds
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1;

// =============================================================================
// Probe defaults
// =============================================================================

/// Default program spawned to check a storage path
pub const DEFAULT_PROBE_PROGRAM: &str = "test";

/// Default arguments placed before the path
pub const DEFAULT_PROBE_ARGS: &[&str] = &["-e"];

// =============================================================================
// Lease defaults
// =============================================================================

/// Extra lease lifetime on top of the probe and store round trips
pub const LEASE_TTL_MARGIN_SECS: u64 = 5;

/// Most store round trips one check makes while holding its lease
/// (index, read, re-index, three field writes, timestamp index)
pub const CHECK_STORE_ROUND_TRIPS: u32 = 7;

/// Delay between attempts to obtain a contended lease, in milliseconds
pub const LEASE_RETRY_INTERVAL_MS: u64 = 50;

// =============================================================================
// Redis defaults
// =============================================================================

/// Default Redis connection timeout in milliseconds
pub const DEFAULT_REDIS_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Default Redis operation timeout in milliseconds
pub const DEFAULT_REDIS_OPERATION_TIMEOUT_MS: u64 = 2000;

// =============================================================================
// Kill switch
// =============================================================================

/// Environment variable that forces every breaker closed when truthy
pub const KILL_SWITCH_ENV: &str = "STORAGE_CIRCUIT_BREAKER_DISABLED";
