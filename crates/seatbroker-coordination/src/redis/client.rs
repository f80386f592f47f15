//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use seatbroker_core::config::RedisConfig;
use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;

/// Redis client wrapper with connection management.
#[derive(Clone)]
pub struct RedisClient {
    /// Redis connection manager (multiplexed, reconnecting).
    conn: ConnectionManager,
    /// Key prefix for all keys.
    key_prefix: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Connect using the coordination Redis settings.
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        info!(url = %mask_redis_url(&config.url), "Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Coordination, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Coordination, "Failed to connect to Redis", e)
        })?;

        info!("Connected to Redis");
        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// A cloned handle to the connection manager.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Hide the password of a Redis URL before it reaches the logs.
fn mask_redis_url(url: &str) -> String {
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url.rfind('@') {
        Some(at) if at > scheme_end => {
            let credentials = &url[scheme_end..at];
            match credentials.find(':') {
                Some(colon) => format!(
                    "{}****{}",
                    &url[..scheme_end + colon + 1],
                    &url[at..]
                ),
                None => format!("{}****{}", &url[..scheme_end], &url[at..]),
            }
        }
        _ => url.to_string(),
    }
}
