mod auth;
mod config;
mod db;
mod disputes;
mod errors;
mod labels;
mod models;
mod routes;
mod run;
mod scoring;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::labels::client::LabelerClient;
use crate::routes::build_router;
use crate::run::lease::RunLease;
use crate::state::AppState;
use crate::store::PgScoringStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting community notes scorer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Scoring: helpful >= {}, not helpful <= {}, min {} ratings",
        config.scoring.helpful_threshold,
        config.scoring.not_helpful_threshold,
        config.scoring.min_ratings_for_helpful
    );

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_timeout).await?;

    // Initialize Redis run lease (optional)
    let lease = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis run lease enabled");
            Some(RunLease::new(client, config.lease_ttl, config.db_timeout))
        }
        None => {
            info!("REDIS_URL not set; runs are not guarded against overlap");
            None
        }
    };

    // Initialize labeler client
    let labeler = LabelerClient::new(
        &config.labeler_url,
        config.labeler_token.clone(),
        config.labels.call_timeout,
    )?;
    info!("Labeler client initialized ({})", config.labeler_url);

    let state = AppState {
        store: Arc::new(PgScoringStore::new(db)),
        publisher: Arc::new(labeler),
        lease,
        config: config.clone(),
    };

    let app = build_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
