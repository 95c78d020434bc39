//! Shopfront relay entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use shopfront_broker_redis::{RedisBroker, RedisBrokerConfig};
use shopfront_core::clock::SystemClock;
use shopfront_event_store::{PgInboxStore, PgOutboxStore};
use shopfront_messaging::shutdown::{self, ShutdownTrigger};
use shopfront_messaging::{BrokerConnection, InMemoryBroker, MessagingError};
use shopfront_relay::config::RelayConfig;
use shopfront_relay::error::AppError;
use shopfront_relay::routes;
use shopfront_relay::runtime::{Relay, RelayPorts};
use shopfront_relay::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Shopfront relay");

    let config = RelayConfig::from_env()?;

    // Create database connection pool and bring the event tables up to date.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(AppError::from)?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;

    let broker = connect_broker(&config).await?;
    let outbox = Arc::new(PgOutboxStore::new(pool.clone()));
    let ports = RelayPorts {
        outbox: outbox.clone(),
        inbox: Arc::new(PgInboxStore::new(pool)),
        broker,
        clock: Arc::new(SystemClock),
    };

    let (trigger, signal) = shutdown::channel();
    let relay = Relay::build(&config, ports).await?;
    let handle = relay.start(signal).await?;

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::app(AppState::new(outbox))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::from)?;

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_ctrl_c(trigger))
        .await
        .map_err(AppError::from)?;

    handle.join().await;
    Ok(())
}

async fn connect_broker(config: &RelayConfig) -> Result<Arc<dyn BrokerConnection>, AppError> {
    match &config.redis_url {
        Some(url) => {
            let broker = RedisBroker::connect(RedisBrokerConfig::new(
                url.clone(),
                config.consumer_name.clone(),
            ))
            .await
            .map_err(MessagingError::from)?;
            Ok(Arc::new(broker))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using the in-process broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

async fn wait_for_ctrl_c(trigger: ShutdownTrigger) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal, stopping");
    trigger.trigger();
}
