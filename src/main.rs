use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod log;
mod store;

use store::LinkStore;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    /// The only path to the links file and the in-memory table.
    pub store: LinkStore,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; env vars may already be set
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mylinks=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting mylinks on {}", config.bind_addr());

    // A store that fails to load must never serve traffic.
    let store = match &config.links_file {
        Some(path) => LinkStore::load(path, config.sync_writes)
            .with_context(|| format!("failed to load links from {path}"))?,
        None => {
            tracing::warn!("LINKS_FILE is :memory:, links will not survive a restart");
            LinkStore::in_memory()
        }
    };

    if store.is_empty() {
        tracing::info!("No links yet, add one at /setlink");
    }

    let state = Arc::new(AppState { store });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(state) {
        Ok(state) => {
            tracing::info!("Closing links store ({} link(s))", state.store.len());
            state.store.close();
        }
        Err(_) => tracing::warn!("Links store still referenced at shutdown, skipping close"),
    }
    tracing::info!("Server shut down gracefully");

    Ok(())
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::redirect::index))
        .route("/health", get(handlers::redirect::health))
        .route(
            "/setlink",
            get(handlers::setlink::form)
                .post(handlers::setlink::create)
                .fallback(handlers::setlink::invalid_method),
        )
        // Static routes above take priority over key lookup. Keys may span
        // several segments, e.g. /docs/api.
        .route("/*key", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
