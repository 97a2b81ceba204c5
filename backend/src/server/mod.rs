//! Server construction, middleware wiring and graceful shutdown.

mod config;
mod state_builders;

pub use config::ServerConfig;

use state_builders::{Infrastructure, build_authenticators, build_engine, build_router};

use std::sync::Arc;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use acs_backend::Trace;
#[cfg(debug_assertions)]
use acs_backend::doc::ApiDoc;
use acs_backend::domain::ConnectionRequestEngine;
use acs_backend::inbound::http::connection_requests::wake_device;
use acs_backend::inbound::http::cwmp::cwmp_entry;
use acs_backend::inbound::http::health::{HealthState, live, ready};
use acs_backend::inbound::http::json_config;
use acs_backend::inbound::http::state::HttpState;
use acs_backend::outbound::cache::{RedisChangeFeed, connect_pool};
use acs_backend::outbound::persistence::{DbPool, DieselCommunicationLog, PoolConfig, run_migrations};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

/// Redis connections shared by ticket operations.
const REDIS_POOL_SIZE: u32 = 16;

fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(json_config())
        .wrap(Trace)
        .service(ready)
        .service(live)
        .service(wake_device);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Device traffic arrives on provisioned org paths, so it takes whatever
    // the named services above do not.
    app.default_service(web::route().to(cwmp_entry))
}

/// A started server plus the handles needed to stop it cleanly.
pub struct RunningAcs {
    server: Server,
    health_state: web::Data<HealthState>,
    engine: Arc<ConnectionRequestEngine>,
    shutdown: CancellationToken,
    drivers: Vec<JoinHandle<()>>,
}

/// Connect infrastructure, load caches, start workers and bind the listener.
///
/// # Errors
/// Fails when migrations, pools, caches or the listener cannot be set up.
pub async fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> Result<RunningAcs> {
    let database_url = config.database_url.clone();
    let applied = tokio::task::spawn_blocking(move || run_migrations(&database_url))
        .await
        .wrap_err("migration task panicked")?
        .wrap_err("failed to apply migrations")?;
    info!(applied, "database migrations applied");

    let infrastructure = Infrastructure {
        db_pool: DbPool::new(
            PoolConfig::new(config.database_url.clone())
                .with_max_size(config.settings.database_pool_size()),
        )
            .await
            .wrap_err("failed to build database pool")?,
        redis_pool: connect_pool(&config.redis_url, REDIS_POOL_SIZE)
            .await
            .wrap_err("failed to build redis pool")?,
        change_feed: RedisChangeFeed::open(&config.redis_url).wrap_err("invalid redis url")?,
    };

    match DieselCommunicationLog::new(infrastructure.db_pool.clone())
        .purge_expired(Utc::now())
        .await
    {
        Ok(purged) => info!(purged, "expired communication log entries removed"),
        Err(error) => warn!(error = %error, "communication log purge failed"),
    }

    let shutdown = CancellationToken::new();
    let (authenticators, org_driver) =
        build_authenticators(&config, &infrastructure, &shutdown).await?;
    let engine = build_engine(&config, &infrastructure)?;
    let router = build_router(&config, authenticators.clone(), &shutdown)?;
    let http_state = web::Data::new(HttpState::new(router, engine.clone(), authenticators));

    let server_health_state = health_state.clone();
    let server = HttpServer::new(move || build_app(server_health_state.clone(), http_state.clone()))
        .disable_signals()
        .bind(config.bind_addr())
        .wrap_err_with(|| format!("failed to bind {}", config.bind_addr()))?
        .run();

    health_state.mark_ready();
    info!(addr = %config.bind_addr(), host = %config.hostname, "acs listening");
    Ok(RunningAcs {
        server,
        health_state,
        engine,
        shutdown,
        drivers: vec![org_driver],
    })
}

impl RunningAcs {
    /// Serve until SIGINT or SIGTERM, then drain.
    ///
    /// Shutdown order: fail probes, stop accepting requests and let in-flight
    /// ones finish, release held tickets, then stop workers and cache drivers.
    /// No wake can start after its tickets are released.
    ///
    /// # Errors
    /// Fails when the server task errors or signal handlers cannot be installed.
    pub async fn run_until_stopped(self) -> Result<()> {
        let RunningAcs {
            server,
            health_state,
            engine,
            shutdown,
            drivers,
        } = self;
        let handle = server.handle();
        let serving = actix_web::rt::spawn(server);

        wait_for_signal().await?;
        info!("shutdown requested");
        health_state.mark_draining();
        handle.stop(true).await;
        let served = serving
            .await
            .map_err(|error| eyre!("server task failed: {error}"))?;
        let released = engine.release_in_flight().await;
        info!(released, "connection request tickets released");
        shutdown.cancel();
        for driver in drivers {
            if let Err(error) = driver.await {
                warn!(error = %error, "cache driver ended abnormally");
            }
        }
        served.wrap_err("server stopped with an error")
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).wrap_err("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.wrap_err("failed to listen for SIGINT"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.wrap_err("failed to listen for ctrl-c")
}
