//! Builders wiring adapters into the domain services.

use std::sync::Arc;

use acs_backend::domain::cache::{CacheProjection, ReactiveCache};
use acs_backend::domain::ports::{
    ChangeFeed, DocumentCollection, FixtureSessionOwner, SessionOwner, WakeObserver,
};
use acs_backend::domain::session::{SessionDispatcher, StickySessionRouter};
use acs_backend::domain::{
    AuthenticatorCache, ConnectionRequestEngine, ConnectionRequestPorts, ConnectionRequestRuntime,
    OrganizationProjection, TokioSleeper, TracingWakeObserver,
};
use acs_backend::outbound::cache::{RedisChangeFeed, RedisPool, RedisTicketStore};
use acs_backend::outbound::device::ReqwestDeviceTransport;
use acs_backend::outbound::persistence::{DbPool, DieselCommunicationLog, DieselDocumentCollection};
use acs_backend::outbound::webhook::WebhookWakeObserver;
use color_eyre::eyre::{Result, WrapErr};
use mockable::{Clock, DefaultClock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::ServerConfig;

/// Connected infrastructure shared by the builders.
pub(crate) struct Infrastructure {
    pub(crate) db_pool: DbPool,
    pub(crate) redis_pool: RedisPool,
    pub(crate) change_feed: RedisChangeFeed,
}

/// Load the organization cache and start its update driver.
pub(crate) async fn build_authenticators(
    config: &ServerConfig,
    infrastructure: &Infrastructure,
    shutdown: &CancellationToken,
) -> Result<(AuthenticatorCache, JoinHandle<()>)> {
    let documents: Arc<dyn DocumentCollection> =
        Arc::new(DieselDocumentCollection::new(infrastructure.db_pool.clone()));
    let cache = Arc::new(
        ReactiveCache::load(
            OrganizationProjection::new(config.settings.realm()),
            documents,
            config.settings.reconcile()?,
        )
        .await,
    );
    let driver = spawn_cache_driver(cache.clone(), &infrastructure.change_feed, shutdown).await;
    Ok((AuthenticatorCache::new(cache), driver))
}

/// Subscribe to change events and run the cache until shutdown.
///
/// A failed subscription is logged; the cache then relies on reconciliation.
pub(crate) async fn spawn_cache_driver<P: CacheProjection>(
    cache: Arc<ReactiveCache<P>>,
    feed: &dyn ChangeFeed,
    shutdown: &CancellationToken,
) -> JoinHandle<()> {
    let events = match feed.subscribe(cache.collection()).await {
        Ok(stream) => Some(stream),
        Err(error) => {
            warn!(collection = cache.collection(), error = %error, "change feed unavailable; reconciliation only");
            None
        }
    };
    tokio::spawn(cache.run(events, Arc::new(TokioSleeper), shutdown.clone()))
}

/// Assemble the connection request engine with its observers.
pub(crate) fn build_engine(
    config: &ServerConfig,
    infrastructure: &Infrastructure,
) -> Result<Arc<ConnectionRequestEngine>> {
    let tuning = config.settings.connection_requests();
    let transport = ReqwestDeviceTransport::new(tuning.request_timeout)
        .wrap_err("failed to build device HTTP client")?;

    let mut observers: Vec<Arc<dyn WakeObserver>> = vec![Arc::new(TracingWakeObserver)];
    let webhooks = config.settings.webhook_urls()?;
    if !webhooks.is_empty() {
        info!(targets = webhooks.len(), "wake webhooks enabled");
        observers.push(Arc::new(
            WebhookWakeObserver::new(webhooks, config.settings.webhook_timeout())
                .wrap_err("failed to build webhook HTTP client")?,
        ));
    }

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    Ok(Arc::new(ConnectionRequestEngine::new(
        ConnectionRequestPorts {
            store: Arc::new(RedisTicketStore::new(infrastructure.redis_pool.clone())),
            transport: Arc::new(transport),
            communication_log: Arc::new(DieselCommunicationLog::new(infrastructure.db_pool.clone())),
            observers,
        },
        ConnectionRequestRuntime {
            clock,
            sleeper: Arc::new(TokioSleeper),
        },
        tuning,
    )))
}

/// Start the session worker pool and the router in front of it.
pub(crate) fn build_router(
    config: &ServerConfig,
    authenticators: AuthenticatorCache,
    shutdown: &CancellationToken,
) -> Result<Arc<StickySessionRouter>> {
    let owners = (0..config.settings.workers())
        .map(|_| Box::new(FixtureSessionOwner::default()) as Box<dyn SessionOwner>)
        .collect();
    let dispatcher = SessionDispatcher::spawn(
        owners,
        &config.settings.dispatch(config.hostname.clone()),
        shutdown,
    )
    .wrap_err("failed to start session workers")?;
    info!(workers = dispatcher.pool_size(), "session workers started");
    Ok(Arc::new(StickySessionRouter::new(
        authenticators,
        Arc::new(dispatcher),
        config.settings.zero_touch(),
    )))
}
