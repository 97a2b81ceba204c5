//! `ChangeFeed` over Redis pub/sub.

use async_trait::async_trait;
use bb8_redis::redis;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::warn;

use crate::domain::ports::{ChangeFeed, ChangeFeedError, ChangeStream};

/// Pub/sub channel carrying change events for `collection`.
pub fn change_channel(collection: &str) -> String {
    format!("acs:changes:{collection}")
}

/// Subscribes with a dedicated pub/sub connection per collection.
#[derive(Clone)]
pub struct RedisChangeFeed {
    client: redis::Client,
}

impl RedisChangeFeed {
    /// Build a feed for the server at `url`.
    ///
    /// # Errors
    /// Returns [`ChangeFeedError`] when the URL is invalid.
    pub fn open(url: &str) -> Result<Self, ChangeFeedError> {
        let client =
            redis::Client::open(url).map_err(|err| ChangeFeedError::unavailable(err.to_string()))?;
        Ok(Self { client })
    }
}

fn decode_payload(channel: &str, payload: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(channel, error = %error, "dropping undecodable change event");
            None
        }
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn subscribe(&self, collection: &str) -> Result<ChangeStream, ChangeFeedError> {
        let channel = change_channel(collection);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|err| ChangeFeedError::unavailable(err.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|err| ChangeFeedError::unavailable(err.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(move |message| {
            let decoded = match message.get_payload::<String>() {
                Ok(payload) => decode_payload(&channel, &payload),
                Err(error) => {
                    warn!(channel = %channel, error = %error, "dropping non-text change event");
                    None
                }
            };
            std::future::ready(decoded)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn channels_are_namespaced_per_collection() {
        assert_eq!(change_channel("organizations"), "acs:changes:organizations");
    }

    #[rstest]
    #[case::object(r#"{"crudType":"Create","_id":"1"}"#, Some(json!({ "crudType": "Create", "_id": "1" })))]
    #[case::garbage("{", None)]
    fn payloads_decode_as_json(#[case] payload: &str, #[case] expected: Option<Value>) {
        assert_eq!(decode_payload("acs:changes:x", payload), expected);
    }
}
