//! Port for subscribing to per-collection change events.
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use super::define_port_error;

/// Raw change messages, decoded by the consumer.
pub type ChangeStream = BoxStream<'static, Value>;

define_port_error! {
    /// Errors raised while opening a subscription.
    pub enum ChangeFeedError {
        /// The event channel could not be reached.
        Unavailable { message: String } => "change feed unavailable: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to change messages published for `collection`.
    async fn subscribe(&self, collection: &str) -> Result<ChangeStream, ChangeFeedError>;
}
