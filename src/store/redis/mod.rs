// Redis shared-state store module
//
// Fleet-wide failure bookkeeping: every host reads and writes the same
// hashes, index and leases through a multiplexed ConnectionManager.

pub mod config;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisStore;
