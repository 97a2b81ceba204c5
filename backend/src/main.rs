//! ACS entry point: loads settings, wires adapters and serves device and
//! northbound HTTP.

mod server;

use actix_web::web;
use color_eyre::eyre::{Result, eyre};
use ortho_config::OrthoConfig;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use acs_backend::inbound::http::health::HealthState;
use acs_backend::settings::AcsSettings;
use server::{ServerConfig, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AcsSettings::load_from_iter(std::env::args_os())
        .map_err(|error| eyre!("failed to load settings: {error}"))?;
    let config = ServerConfig::from_settings(settings)?;

    let health_state = web::Data::new(HealthState::new());
    create_server(health_state, config)
        .await?
        .run_until_stopped()
        .await
}
