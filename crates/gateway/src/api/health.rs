//! Liveness probe. Unauthenticated.

use axum::extract::State;
use axum::response::Response;

use crate::api::error::ok;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.config.protocol.backend,
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}
