//! Wake one device from the command line through the shared ticket store.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::io;
use std::sync::Arc;

use acs_backend::domain::ports::FixtureCommunicationLog;
use acs_backend::domain::{
    ConnectionRequestConfig, ConnectionRequestEngine, ConnectionRequestPorts,
    ConnectionRequestRuntime, TicketState, TracingWakeObserver, WakeRequest,
};
use acs_backend::outbound::cache::{RedisTicketStore, connect_pool};
use acs_backend::outbound::device::ReqwestDeviceTransport;
use clap::Parser;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// `wake-device` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "wake-device",
    about = "Send a CWMP connection request to one device",
    version
)]
struct CliArgs {
    /// Device identifier used as the ticket key.
    #[arg(long = "cpe-id", value_name = "id")]
    cpe_id: String,
    /// Connection request URL reported by the device.
    #[arg(long = "url", value_name = "url")]
    url: String,
    /// Digest user name presented to the device.
    #[arg(long = "username", default_value = "")]
    username: String,
    /// Digest password; an empty password reuses the user name.
    #[arg(long = "password", default_value = "")]
    password: String,
    /// Internal proxy host fronting the device.
    #[arg(long = "proxy", value_name = "host")]
    proxy: Option<String>,
    /// Redis URL. Falls back to `ACS_REDIS_URL` when omitted.
    #[arg(long = "redis-url", value_name = "url")]
    redis_url: Option<String>,
}

fn main() -> io::Result<()> {
    init_tracing();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::parse();
    let redis_url = resolve_redis_url(args.redis_url.clone())?;
    let pool = connect_pool(&redis_url, 2)
        .await
        .map_err(|error| io::Error::other(format!("connect redis: {error}")))?;

    let config = ConnectionRequestConfig::default();
    let transport = ReqwestDeviceTransport::new(config.request_timeout)
        .map_err(|error| io::Error::other(format!("build HTTP client: {error}")))?;
    let engine = ConnectionRequestEngine::new(
        ConnectionRequestPorts {
            store: Arc::new(RedisTicketStore::new(pool)),
            transport: Arc::new(transport),
            communication_log: Arc::new(FixtureCommunicationLog),
            observers: vec![Arc::new(TracingWakeObserver)],
        },
        ConnectionRequestRuntime::default(),
        config,
    );

    let mut request = WakeRequest::new(args.cpe_id, args.url, args.username, args.password);
    if let Some(proxy) = args.proxy {
        request = request.with_proxy(proxy);
    }
    let ticket = engine.wake(&request).await;

    let json = serde_json::to_string_pretty(&ticket)
        .map_err(|error| io::Error::other(format!("encode ticket: {error}")))?;
    println!("{json}");
    if ticket.state == TicketState::Failed {
        return Err(io::Error::other(
            ticket.error.unwrap_or_else(|| "connection request failed".to_owned()),
        ));
    }
    Ok(())
}

/// Install the stderr subscriber; a subscriber already in place is kept.
fn init_tracing() {
    if let Err(error) = fmt().with_env_filter(EnvFilter::from_default_env()).try_init() {
        warn!(error = %error, "tracing init failed");
    }
}

fn resolve_redis_url(explicit: Option<String>) -> io::Result<String> {
    let value = match explicit {
        Some(value) => value,
        None => env::var("ACS_REDIS_URL").map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "redis URL missing: set --redis-url or ACS_REDIS_URL",
            )
        })?,
    };
    if value.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "redis URL must not be empty",
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    //! Unit tests for CLI parsing helpers.

    use clap::Parser;
    use rstest::rstest;

    use super::{CliArgs, init_tracing, resolve_redis_url};

    #[rstest]
    fn explicit_redis_url_wins() {
        assert_eq!(
            resolve_redis_url(Some("redis://cache:6379".to_owned())).expect("url"),
            "redis://cache:6379"
        );
    }

    #[rstest]
    fn blank_redis_url_is_rejected() {
        let error = resolve_redis_url(Some("  ".to_owned())).expect_err("blank should fail");
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[rstest]
    fn credentials_default_to_empty() {
        let args = CliArgs::try_parse_from([
            "wake-device",
            "--cpe-id",
            "D1",
            "--url",
            "http://10.0.0.9:7547/cr",
        ])
        .expect("args parse");
        assert!(args.username.is_empty());
        assert!(args.password.is_empty());
        assert!(args.proxy.is_none());
    }

    #[rstest]
    fn repeated_tracing_init_is_tolerated() {
        init_tracing();
        init_tracing();
        tracing::info!("still logging after a second init");
    }
}
