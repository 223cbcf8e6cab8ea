//! Persona research server.
//!
//! Runs the engine in-process: HTTP API, worker pool and retry sweeper share one
//! `App`. Ctrl-C stops the listener first, then the sweeper and the workers.

mod config;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use persona_core::AppBuilder;
use persona_core::collector::{
    CompetitorPayload, PageCollector, ReviewsPayload, SocialPayload, SocialSearchCollector,
    WebsitePayload,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,persona_core=debug,persona_server=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let mut page = PageCollector::new(config.collector_timeout)
        .context("Failed to build HTTP client for page collector")?;
    if let Some(user_agent) = &config.user_agent {
        page = page.with_user_agent(user_agent.clone());
    }
    if let Some(max_body_bytes) = config.max_body_bytes {
        page = page.with_max_body_bytes(max_body_bytes);
    }
    let mut builder = AppBuilder::new(config.engine.clone())
        .register::<WebsitePayload, _>(page.clone())?
        .register::<ReviewsPayload, _>(page.clone())?
        .register::<CompetitorPayload, _>(page)?
        .with_config_probe(config.config_probe());
    if let Some(url) = &config.social_search_url {
        let mut social = SocialSearchCollector::new(url.clone(), config.collector_timeout)
            .context("Failed to build HTTP client for social search")?;
        if let Some(limit) = config.social_search_limit {
            social = social.with_limit(limit);
        }
        builder = builder.register::<SocialPayload, _>(social)?;
    }
    let app = Arc::new(builder.build().context("Failed to wire engine")?);

    tracing::info!(
        workers = app.config.worker_count,
        sources = ?app.config.enabled_sources(),
        "Starting persona research engine"
    );

    let workers = app.spawn_workers();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = app
        .sweeper
        .clone()
        .spawn(app.config.sweep_interval, shutdown_rx);

    let router = routes::router(AppState { app: app.clone() });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "sweeper task ended abnormally");
    }
    workers.shutdown_and_join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
