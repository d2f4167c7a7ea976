use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cms;
mod config;
mod content_loader;
mod dates;
mod detail;
mod error;
mod hot_reload;
mod models;
mod pages;
mod pagination;
mod rich_text;
mod routes;
mod state;

use crate::cms::PrismicClient;
use crate::config::Config;
use crate::content_loader::{load_listing, load_templates, prerender_posts, start_revalidation};
use crate::hot_reload::start_template_watcher;
use crate::state::{AppState, RouterState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    info!("RUST_ENV is set to development: {}", config.is_development);

    let cms = PrismicClient::new(&config.api_endpoint, config.access_token.clone())
        .context("Invalid PRISMIC_API_ENDPOINT")?;
    info!(endpoint = %cms.endpoint(), "Using Prismic repository");

    let templates = load_templates(&config.template_dir)
        .await
        .with_context(|| format!("Failed to load templates from {}", config.template_dir.display()))?;
    let listing = load_listing(&cms, config.page_size)
        .await
        .context("Failed to fetch the initial post listing")?;

    let static_dir = config.static_dir.clone();
    let port = config.port;
    let is_development = config.is_development;
    let state = Arc::new(AppState::new(config, cms, templates, listing));

    match prerender_posts(&state).await {
        Ok(count) => info!(count, "Pre-rendered posts"),
        Err(e) => warn!("Skipping pre-render, posts will resolve on demand: {}", e),
    }
    start_revalidation(state.clone());

    // Hot-reload setup
    let (tx, _rx) = broadcast::channel(1);
    if is_development {
        info!("Hot reload enabled. Check logs for template change events.");
        start_template_watcher(tx.clone(), state.clone());
    }

    let router_state = RouterState {
        app_state: state,
        broadcaster: tx,
    };
    let app = routes::router(router_state, &static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
