//! `TicketStore` over Redis strings with millisecond TTLs.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis;

use crate::domain::ConnectionRequestTicket;
use crate::domain::ports::{TicketStore, TicketStoreError, ticket_key};

use super::RedisPool;

/// Delete `KEYS[1]` only when its JSON `owner` equals `ARGV[1]`.
const DELETE_IF_OWNED: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return 0
end
local ok, ticket = pcall(cjson.decode, raw)
if ok and type(ticket) == 'table' and ticket.owner == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis-backed ticket store.
///
/// Creation is `SET key value NX PX ttl`, the atomic primitive every worker
/// relies on for per-device mutual exclusion.
#[derive(Clone)]
pub struct RedisTicketStore {
    pool: RedisPool,
}

impl RedisTicketStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn run<T: redis::FromRedisValue>(&self, command: redis::Cmd) -> Result<T, TicketStoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| TicketStoreError::unavailable(err.to_string()))?;
        command
            .query_async(&mut *conn)
            .await
            .map_err(|err| TicketStoreError::unavailable(err.to_string()))
    }
}

fn encode(ticket: &ConnectionRequestTicket) -> Result<String, TicketStoreError> {
    serde_json::to_string(ticket).map_err(|err| TicketStoreError::serialization(err.to_string()))
}

fn decode(raw: &str) -> Result<ConnectionRequestTicket, TicketStoreError> {
    serde_json::from_str(raw).map_err(|err| TicketStoreError::serialization(err.to_string()))
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl TicketStore for RedisTicketStore {
    async fn create_if_absent(
        &self,
        ticket: &ConnectionRequestTicket,
        ttl: Duration,
    ) -> Result<bool, TicketStoreError> {
        let mut command = redis::cmd("SET");
        command
            .arg(ticket_key(&ticket.device_id))
            .arg(encode(ticket)?)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));
        let reply: Option<String> = self.run(command).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, device_id: &str) -> Result<Option<ConnectionRequestTicket>, TicketStoreError> {
        let mut command = redis::cmd("GET");
        command.arg(ticket_key(device_id));
        let raw: Option<String> = self.run(command).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn replace_keep_ttl(&self, ticket: &ConnectionRequestTicket) -> Result<(), TicketStoreError> {
        let mut command = redis::cmd("SET");
        command
            .arg(ticket_key(&ticket.device_id))
            .arg(encode(ticket)?)
            .arg("XX")
            .arg("KEEPTTL");
        let _replaced: Option<String> = self.run(command).await?;
        Ok(())
    }

    async fn put(&self, ticket: &ConnectionRequestTicket, ttl: Duration) -> Result<(), TicketStoreError> {
        let mut command = redis::cmd("SET");
        command
            .arg(ticket_key(&ticket.device_id))
            .arg(encode(ticket)?)
            .arg("PX")
            .arg(ttl_millis(ttl));
        let _stored: Option<String> = self.run(command).await?;
        Ok(())
    }

    async fn delete_if_owned(&self, device_id: &str, owner: &str) -> Result<bool, TicketStoreError> {
        let mut command = redis::cmd("EVAL");
        command
            .arg(DELETE_IF_OWNED)
            .arg(1)
            .arg(ticket_key(device_id))
            .arg(owner);
        let removed: i64 = self.run(command).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case::sub_millisecond(Duration::from_micros(10), 1)]
    #[case::seconds(Duration::from_secs(30), 30_000)]
    fn ttl_is_whole_milliseconds(#[case] ttl: Duration, #[case] expected: u64) {
        assert_eq!(ttl_millis(ttl), expected);
    }

    #[rstest]
    fn stored_json_decodes_back() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid time");
        let ticket = ConnectionRequestTicket::sending("D1", "acs-1-7", now);
        let raw = encode(&ticket).expect("encode");
        assert_eq!(decode(&raw), Ok(ticket));
    }

    #[rstest]
    fn stored_json_exposes_the_owner_field() {
        let ticket = ConnectionRequestTicket::sending("D1", "acs-1-7", Utc::now());
        let raw: serde_json::Value =
            serde_json::from_str(&encode(&ticket).expect("encode")).expect("json");

        assert_eq!(raw["owner"], "acs-1-7");
    }

    #[rstest]
    fn garbage_is_a_serialization_error() {
        assert!(matches!(
            decode("sending"),
            Err(TicketStoreError::Serialization { .. })
        ));
    }
}
