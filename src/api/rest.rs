// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Five endpoints, no authentication layer (see DESIGN.md for the drop
// rationale). CORS is permissive — the engine's actual trust boundary is the
// broker adapter's network boundary, not this HTTP surface.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::settings::UserSettings;
use crate::types::{ActionResponse, Side, TickRequest};

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/tick", post(tick))
        .route("/api/control", post(control))
        .route("/api/update-settings", post(update_settings))
        .route("/api/ui-data", get(ui_data))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Tick (ingress)
// =============================================================================

/// Truncate the body at its last closing brace, tolerating trailing NUL
/// bytes and junk a flaky broker adapter may append after the JSON payload.
fn truncate_at_last_brace(raw: &[u8]) -> &[u8] {
    let trimmed = raw
        .iter()
        .rposition(|&b| b != 0)
        .map(|end| &raw[..=end])
        .unwrap_or(&[]);
    match trimmed.iter().rposition(|&b| b == b'}') {
        Some(end) => &trimmed[..=end],
        None => trimmed,
    }
}

async fn tick(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let trimmed = truncate_at_last_brace(&body);
    let request: TickRequest = match serde_json::from_slice(trimmed) {
        Ok(req) => req,
        Err(err) => {
            warn!(error = %err, "tick body failed to parse, replying WAIT");
            return Json(ActionResponse::wait());
        }
    };

    let mut engine = state.engine.lock();
    let action = engine.on_tick(request, Instant::now());
    Json(action)
}

// =============================================================================
// Control
// =============================================================================

#[derive(Deserialize)]
struct ControlRequest {
    #[serde(default)]
    buy_switch: Option<bool>,
    #[serde(default)]
    sell_switch: Option<bool>,
    #[serde(default)]
    cyclic: Option<bool>,
    #[serde(default)]
    emergency_close: Option<bool>,
}

async fn control(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ControlRequest>,
) -> impl IntoResponse {
    let mut engine = state.engine.lock();

    if req.emergency_close == Some(true) {
        warn!("emergency close requested via API");
        engine.emergency_close();
        return Json(serde_json::json!({ "status": "emergency" }));
    }

    if let Some(enable) = req.buy_switch {
        engine.toggle_side(Side::Buy, enable);
    }
    if let Some(enable) = req.sell_switch {
        engine.toggle_side(Side::Sell, enable);
    }
    if let Some(cyclic) = req.cyclic {
        engine.set_cyclic(cyclic);
    }

    Json(serde_json::json!({ "status": "ok" }))
}

// =============================================================================
// Settings update
// =============================================================================

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(incoming): Json<UserSettings>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let mut engine = state.engine.lock();
    engine.update_settings(incoming).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
    })?;

    info!("settings updated via API");
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// =============================================================================
// UI data
// =============================================================================

async fn ui_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.lock().snapshot();
    let current = snapshot.price_history.back().cloned();

    Json(serde_json::json!({
        "settings": snapshot.settings,
        "runtime": snapshot.runtime,
        "buy": snapshot.buy,
        "sell": snapshot.sell,
        "market": {
            "history": snapshot.price_history,
            "current": current,
        },
        "last_update": snapshot.runtime.last_update_ts,
    }))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    error: Option<String>,
    buy: bool,
    sell: bool,
    price: f64,
    version: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.lock().snapshot();

    Json(HealthResponse {
        status: if snapshot.runtime.error_status.is_some() {
            "error"
        } else {
            "healthy"
        },
        error: snapshot.runtime.error_status,
        buy: snapshot.buy.enabled,
        sell: snapshot.sell.enabled,
        price: snapshot.runtime.current_mid(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_drops_trailing_nul_bytes() {
        let raw = b"{\"ask\":1.0}\0\0\0";
        assert_eq!(truncate_at_last_brace(raw), b"{\"ask\":1.0}");
    }

    #[test]
    fn truncate_drops_junk_after_last_brace() {
        let raw = b"{\"ask\":1.0}garbage";
        assert_eq!(truncate_at_last_brace(raw), b"{\"ask\":1.0}");
    }

    #[test]
    fn truncate_handles_no_brace() {
        let raw = b"not json";
        assert_eq!(truncate_at_last_brace(raw), b"not json");
    }
}
