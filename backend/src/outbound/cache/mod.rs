//! Redis adapters for the shared ticket store and the change-event channel.
//!
//! Tickets live under `connreq:<deviceId>` as JSON with a millisecond TTL.
//! Change events arrive on pub/sub channel `acs:changes:<collection>`.

mod change_feed;
mod ticket_store;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::Pool;

pub use change_feed::{RedisChangeFeed, change_channel};
pub use ticket_store::RedisTicketStore;

/// Pooled Redis connections shared by the adapters.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Errors building the Redis pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to build redis pool: {message}")]
pub struct RedisPoolError {
    message: String,
}

/// Connect a pool of at most `max_size` connections to `url`.
///
/// # Errors
/// Returns [`RedisPoolError`] when the URL is invalid or the server is
/// unreachable.
pub async fn connect_pool(url: &str, max_size: u32) -> Result<RedisPool, RedisPoolError> {
    let manager = RedisConnectionManager::new(url).map_err(|err| RedisPoolError {
        message: err.to_string(),
    })?;
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await
        .map_err(|err| RedisPoolError {
            message: err.to_string(),
        })
}
