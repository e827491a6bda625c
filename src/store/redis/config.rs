// Redis store configuration module

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_REDIS_CONNECTION_TIMEOUT_MS, DEFAULT_REDIS_OPERATION_TIMEOUT_MS};

/// Redis connection settings for the shared-state store
///
/// Credentials and database number go in the URL
/// (e.g. `redis://:secret@redis:6379/2`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Connection timeout in milliseconds (default: 5000 = 5 seconds)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Operation timeout in milliseconds (default: 2000 = 2 seconds)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            connection_timeout_ms: default_connection_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_REDIS_CONNECTION_TIMEOUT_MS
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_REDIS_OPERATION_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_create_redis_config_from_yaml() {
        let yaml = r#"
redis_url: "redis://localhost:6379"
connection_timeout_ms: 3000
operation_timeout_ms: 1000
"#;

        let config: RedisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.redis_url, Some("redis://localhost:6379".to_string()));
        assert_eq!(config.connection_timeout_ms, 3000);
        assert_eq!(config.operation_timeout_ms, 1000);
    }

    #[test]
    fn test_config_defaults_from_empty_yaml() {
        let config: RedisConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.redis_url.is_none());
        assert_eq!(config.connection_timeout_ms, 5000);
        assert_eq!(config.operation_timeout_ms, 2000);
    }
}
