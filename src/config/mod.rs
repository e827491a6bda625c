// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub mod circuit_breaker;

pub use circuit_breaker::CircuitBreakerConfigYaml;

use crate::logging::LoggingConfig;
use crate::probe::ProbeConfig;
use crate::store::RedisConfig;

/// A configured storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Filesystem path probed for accessibility
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfigYaml,
    /// Storages by name
    #[serde(default)]
    pub storages: BTreeMap<String, StorageConfig>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });
        if let Some(var_name) = missing {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, storage) in &self.storages {
            if name.is_empty() {
                return Err("Storage name cannot be empty".to_string());
            }

            // Failure keys are split on ':' to recover the hostname
            if name.contains(':') {
                return Err(format!("Storage name '{}' must not contain ':'", name));
            }

            if let Some(path) = &storage.path {
                if path.is_empty() {
                    return Err(format!("Storage '{}' has an empty path", name));
                }
            }
        }

        if self.circuit_breaker.failure_count_threshold == 0 {
            return Err("circuit_breaker.failure_count_threshold must be at least 1".to_string());
        }

        if self.circuit_breaker.access_retries == 0 {
            return Err("circuit_breaker.access_retries must be at least 1".to_string());
        }

        if self.circuit_breaker.storage_timeout == 0 {
            return Err("circuit_breaker.storage_timeout must be at least 1 second".to_string());
        }

        // tokio intervals panic on a zero period
        if self.circuit_breaker.check_interval == 0 {
            return Err("circuit_breaker.check_interval must be at least 1 second".to_string());
        }

        if self.probe.program.is_empty() {
            return Err("probe.program cannot be empty".to_string());
        }

        let settings = self.circuit_breaker.to_breaker_settings();
        if !settings.backing_off_reachable() {
            tracing::warn!(
                backoff_threshold = settings.backoff_threshold,
                failure_count_threshold = settings.failure_count_threshold,
                "backoff_threshold is not below failure_count_threshold; storages will never back off"
            );
        }

        Ok(())
    }

    /// Names of all configured storages, sorted
    pub fn storage_names(&self) -> Vec<String> {
        self.storages.keys().cloned().collect()
    }

    /// Path of a configured storage, if it has one
    pub fn storage_path(&self, name: &str) -> Option<&str> {
        self.storages.get(name)?.path.as_deref()
    }
}
