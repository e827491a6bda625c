// Storage Circuit Library
// Storage-health circuit breaker with fleet-wide failure tracking

pub mod breaker;
pub mod checker; // Fleet accessibility checks
pub mod config;
pub mod constants;
pub mod error;
pub mod failure;
pub mod health; // Health reporting
pub mod lease;
pub mod logging;
pub mod metrics; // Prometheus Metrics
pub mod probe;
pub mod store;
pub mod tracker;
