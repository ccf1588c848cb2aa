// =============================================================================
// Elastic counter-trend grid engine — Main Entry Point
// =============================================================================
//
// The engine is a tick-serialized state machine: a broker adapter posts
// snapshots to /api/tick and gets back exactly one imperative action. This
// process owns no broker connection and no UI; it is the decision core only.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod commands;
mod engine;
mod grid;
mod hedge;
mod pipeline;
mod reconcile;
mod session;
mod settings;
mod store;
mod takeprofit;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::engine::Engine;
use crate::store::PersistenceStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("grid engine starting up");

    let state_path = std::env::var("GRID_ENGINE_STATE_PATH").unwrap_or_else(|_| "engine_state.json".to_string());
    let store = PersistenceStore::new(state_path.clone());
    let engine = Engine::new(store);
    info!(path = %state_path, "engine state loaded");

    let state = Arc::new(AppState::new(engine));

    let bind_addr = std::env::var("GRID_ENGINE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind API server");
    info!(addr = %bind_addr, "API server listening");

    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "API server failed");
        }
    });

    tokio::select! {
        res = server => {
            if let Err(err) = res {
                error!(error = %err, "API server task panicked");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — persisting state and stopping");
        }
    }

    state.engine.lock().persist();
    info!("grid engine shut down complete");
    Ok(())
}
