//! Salon Commerce - storefront and booking API

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use salon_commerce::services::payments::HttpPaymentGateway;
use salon_commerce::services::EventPublisher;
use salon_commerce::store::{MemoryStore, PgStore, Store};
use salon_commerce::{create_router, telemetry, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("loading configuration")?;
    telemetry::init_tracing(&config.log_format);

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections)
                .await
                .context("connecting to postgres")?;
            pg.migrate().await.context("running migrations")?;
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };

    let gateway = Arc::new(HttpPaymentGateway::new(&config.payment));
    let port = config.port;
    let state = AppState::new(config, store, gateway, EventPublisher::new(nats));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "salon-commerce listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
