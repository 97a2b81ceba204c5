//! Timing policy for connection requests.

use std::time::Duration;

use thiserror::Error;

/// Port of the internal connection-request proxy.
pub const DEFAULT_PROXY_PORT: u16 = 30005;

/// Engine tuning.
///
/// ## Invariants
/// - `request_timeout` is non-zero.
/// - `failure_soak` is shorter than `request_timeout`.
/// - `race_retry_delay` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequestConfig {
    /// TTL of a fresh ticket and upper bound on the whole handshake.
    pub request_timeout: Duration,
    /// TTL of a failed ticket; blocks re-waking a misbehaving device.
    pub failure_soak: Duration,
    /// Delay before retrying when a conflicting ticket vanished mid-read.
    pub race_retry_delay: Duration,
    /// Upper bound on those retries; `None` retries without limit.
    pub race_retry_limit: Option<u32>,
    /// Port of the internal proxy used for `proxy` requests.
    pub proxy_port: u16,
    /// Identity written into ticket `owner` fields.
    pub owner: String,
}

impl Default for ConnectionRequestConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            failure_soak: Duration::from_secs(10),
            race_retry_delay: Duration::from_secs(5),
            race_retry_limit: Some(3),
            proxy_port: DEFAULT_PROXY_PORT,
            owner: default_owner(),
        }
    }
}

/// Rejected engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionRequestConfigError {
    /// The request timeout is zero.
    #[error("connection request timeout must be positive")]
    ZeroTimeout,
    /// The soak does not fit inside the request timeout.
    #[error("failure soak {soak:?} must be shorter than request timeout {timeout:?}")]
    SoakTooLong {
        /// Configured soak.
        soak: Duration,
        /// Configured timeout.
        timeout: Duration,
    },
    /// The race retry delay is zero.
    #[error("race retry delay must be positive")]
    ZeroRetryDelay,
}

impl ConnectionRequestConfig {
    /// Check the timing relationships.
    ///
    /// # Errors
    /// Returns [`ConnectionRequestConfigError`] naming the first violated
    /// relationship.
    pub fn validate(&self) -> Result<(), ConnectionRequestConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConnectionRequestConfigError::ZeroTimeout);
        }
        if self.failure_soak >= self.request_timeout {
            return Err(ConnectionRequestConfigError::SoakTooLong {
                soak: self.failure_soak,
                timeout: self.request_timeout,
            });
        }
        if self.race_retry_delay.is_zero() {
            return Err(ConnectionRequestConfigError::ZeroRetryDelay);
        }
        Ok(())
    }
}

/// `<hostname>-<pid>` for this process.
pub fn default_owner() -> String {
    format!("{}-{}", host_name(), std::process::id())
}

/// `HOSTNAME`, or `acs` when unset.
pub fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "acs".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_are_valid() {
        assert_eq!(ConnectionRequestConfig::default().validate(), Ok(()));
    }

    #[rstest]
    #[case::zero_timeout(0, 0, 5, ConnectionRequestConfigError::ZeroTimeout)]
    #[case::zero_retry(30, 10, 0, ConnectionRequestConfigError::ZeroRetryDelay)]
    #[case::soak_equals_timeout(10, 10, 5, ConnectionRequestConfigError::SoakTooLong {
        soak: Duration::from_secs(10),
        timeout: Duration::from_secs(10),
    })]
    fn rejects_broken_timing(
        #[case] timeout: u64,
        #[case] soak: u64,
        #[case] retry: u64,
        #[case] expected: ConnectionRequestConfigError,
    ) {
        let config = ConnectionRequestConfig {
            request_timeout: Duration::from_secs(timeout),
            failure_soak: Duration::from_secs(soak),
            race_retry_delay: Duration::from_secs(retry),
            ..ConnectionRequestConfig::default()
        };
        assert_eq!(config.validate(), Err(expected));
    }

    #[rstest]
    fn owner_carries_process_id() {
        assert!(default_owner().ends_with(&format!("-{}", std::process::id())));
    }
}
