// Redis shared-state store implementation

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisResult, Script};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::config::RedisConfig;
use crate::constants::{FIELD_FAILURE_COUNT, FIELD_FIRST_FAILURE, FIELD_LAST_FAILURE, KNOWN_KEYS};
use crate::error::StoreError;
use crate::store::{FailureField, SharedStateStore, StoredFields};

/// Deletes the lease only while it still holds the caller's token
const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed shared-state store
///
/// Uses a multiplexed ConnectionManager (reconnects on its own); every
/// command is bounded by the configured operation timeout.
pub struct RedisStore {
    /// Redis connection manager (async, multiplexed)
    connection: ConnectionManager,

    /// Upper bound for a single command round trip
    operation_timeout: Duration,
}

impl RedisStore {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the URL is missing or invalid, or
    /// the server cannot be reached within `connection_timeout_ms`.
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| StoreError::Connection("redis_url is required".to_string()))?;

        let client = Client::open(redis_url.as_str())
            .map_err(|e| StoreError::Connection(format!("Invalid Redis URL: {}", e)))?;

        let connect_timeout = Duration::from_millis(config.connection_timeout_ms);
        let connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(config.connection_timeout_ms))?
            .map_err(|e| StoreError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!(
            operation_timeout_ms = config.operation_timeout_ms,
            "Connected to shared-state store"
        );

        Ok(Self {
            connection,
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        })
    }

    /// Sends PING to verify Redis is responsive
    pub async fn health_check(&self) -> bool {
        let mut conn = self.connection.clone();
        let reply: Result<String, StoreError> = self
            .bounded(async move { ::redis::cmd("PING").query_async(&mut conn).await })
            .await;
        matches!(reply.as_deref(), Ok("PONG"))
    }

    async fn bounded<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::time::timeout(self.operation_timeout, command)
            .await
            .map_err(|_| StoreError::Timeout(self.operation_timeout.as_millis() as u64))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl SharedStateStore for RedisStore {
    async fn read_fields(&self, key: &str) -> Result<StoredFields, StoreError> {
        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = self
            .bounded(async move {
                ::redis::cmd("HMGET")
                    .arg(key)
                    .arg(FIELD_FAILURE_COUNT)
                    .arg(FIELD_FIRST_FAILURE)
                    .arg(FIELD_LAST_FAILURE)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        let field = |index: usize| values.get(index).and_then(|v| v.as_deref());
        StoredFields::parse(field(0), field(1), field(2))
    }

    async fn write_field(
        &self,
        key: &str,
        field: FailureField,
        value: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.bounded(async move {
            ::redis::cmd("HSET")
                .arg(key)
                .arg(field.as_str())
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn clear_field(&self, key: &str, field: FailureField) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.bounded(async move {
            ::redis::cmd("HDEL")
                .arg(key)
                .arg(field.as_str())
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn register_known_key(&self, key: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.bounded(async move {
            ::redis::cmd("ZADD")
                .arg(KNOWN_KEYS)
                .arg(score)
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn all_known_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        self.bounded(async move {
            ::redis::cmd("ZRANGE")
                .arg(KNOWN_KEYS)
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.bounded(async move {
            ::redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        let keys = self.all_known_keys().await?;

        // DEL with no arguments is a Redis error
        if !keys.is_empty() {
            let mut conn = self.connection.clone();
            let keys_ref = &keys;
            self.bounded(async move {
                ::redis::cmd("DEL")
                    .arg(keys_ref)
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await?;
        }
        self.delete_key(KNOWN_KEYS).await?;

        tracing::info!(keys = keys.len(), "Reset all storage failure state");
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let reply: Option<String> = self
            .bounded(async move {
                ::redis::cmd("SET")
                    .arg(name)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lease(&self, name: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let script = Script::new(RELEASE_LEASE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(name).arg(token);

        let deleted: i64 = self
            .bounded(async move { invocation.invoke_async(&mut conn).await })
            .await?;
        Ok(deleted > 0)
    }
}

// Verify Send + Sync bounds (required for sharing behind Arc<dyn SharedStateStore>)
fn _assert_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<RedisStore>();
    assert_sync::<RedisStore>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_store_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisStore>();
        assert_sync::<RedisStore>();
    }

    #[tokio::test]
    async fn test_missing_url_is_a_connection_error() {
        let result = RedisStore::new(&RedisConfig::default()).await;
        assert!(matches!(result, Err(StoreError::Connection(msg)) if msg.contains("redis_url")));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            redis_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let result = RedisStore::new(&config).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[test]
    fn test_release_script_compares_token() {
        assert!(RELEASE_LEASE_SCRIPT.contains("ARGV[1]"));
        assert!(RELEASE_LEASE_SCRIPT.contains("DEL"));
    }
}
