//! Session affinity cookie: `(deviceId, workerIndex)` carried by the device.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::SessionContext;

/// Cookie name used for session affinity.
pub const SESSION_COOKIE_NAME: &str = "acs-session";

const SEPARATOR: char = '~';

/// Decoded affinity cookie.
///
/// Encoded as `base64url(deviceId~issuedMillis~hostname~workerIndex)`. The
/// routing decision lives entirely in the token; nothing is stored centrally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Device bound to the session.
    pub device_id: String,
    /// Issue time in Unix milliseconds.
    pub issued_millis: i64,
    /// Host of the worker that issued the cookie.
    pub hostname: String,
    /// Worker owning the session.
    pub worker_index: usize,
}

/// Reasons a cookie cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieError {
    /// Not valid base64url or not UTF-8.
    #[error("session cookie is not valid base64url text")]
    Encoding,
    /// Wrong number of fields, or a non-numeric field.
    #[error("session cookie has an invalid layout")]
    Format,
    /// The worker index is outside the pool.
    #[error("session cookie names worker {index} but the pool has {pool_size}")]
    UnknownWorker {
        /// Decoded index.
        index: usize,
        /// Current pool size.
        pool_size: usize,
    },
}

impl SessionCookie {
    /// Bind `device_id` to the worker described by `context`, stamped at
    /// `issued_at`.
    pub fn issue(
        device_id: impl Into<String>,
        context: &SessionContext,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            issued_millis: issued_at.timestamp_millis(),
            hostname: context.hostname.clone(),
            worker_index: context.worker_index,
        }
    }

    /// Opaque `Set-Cookie` value.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.device_id, self.issued_millis, self.hostname, self.worker_index
        ))
    }

    /// Decode a cookie value and check it against the pool size.
    ///
    /// Device ids may themselves contain `~`; the other three fields are
    /// taken from the right.
    ///
    /// # Errors
    /// Returns [`CookieError`] when the value cannot be routed.
    ///
    /// # Examples
    /// ```
    /// use acs_backend::domain::session::{SessionContext, SessionCookie};
    /// use chrono::Utc;
    ///
    /// let context = SessionContext { worker_index: 2, hostname: "acs-1".into() };
    /// let encoded = SessionCookie::issue("00D09E-GW-1", &context, Utc::now()).encode();
    /// let cookie = SessionCookie::decode(&encoded, 4).expect("routable");
    /// assert_eq!(cookie.worker_index, 2);
    /// ```
    pub fn decode(raw: &str, pool_size: usize) -> Result<Self, CookieError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim().trim_end_matches('='))
            .map_err(|_| CookieError::Encoding)?;
        let text = String::from_utf8(bytes).map_err(|_| CookieError::Encoding)?;

        let mut fields = text.rsplitn(4, SEPARATOR);
        let (Some(worker), Some(hostname), Some(issued), Some(device_id)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(CookieError::Format);
        };
        if device_id.is_empty() {
            return Err(CookieError::Format);
        }
        let worker_index: usize = worker.parse().map_err(|_| CookieError::Format)?;
        let issued_millis: i64 = issued.parse().map_err(|_| CookieError::Format)?;
        if worker_index >= pool_size {
            return Err(CookieError::UnknownWorker {
                index: worker_index,
                pool_size,
            });
        }

        Ok(Self {
            device_id: device_id.to_owned(),
            issued_millis,
            hostname: hostname.to_owned(),
            worker_index,
        })
    }
}
