//! Session endpoints.
//!
//! - `POST /session/connect`    — start a session, persist the subscription
//! - `POST /session/disconnect` — stop a logged-in session
//! - `POST /session/logout`     — end the account pairing and stop
//! - `GET  /session/status`     — connected / logged-in flags
//! - `POST /session/pairphone`  — request a phone-number linking code
//! - `GET  /session/paircode`   — fetch the last emitted pairing code

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use cg_domain::events::join_events;

use crate::api::error::{ok, ApiError};
use crate::auth::CurrentUser;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Field names preserve the upstream wire format.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(rename = "Subscribe", default)]
    pub subscribe: Vec<String>,
    #[serde(rename = "Immediate", default)]
    pub immediate: bool,
}

#[derive(Debug, Deserialize)]
pub struct PairPhoneRequest {
    #[serde(rename = "Phone")]
    pub phone: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn connect(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    payload: Result<axum::Json<ConnectRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // An absent body means "subscribe to everything, wait for connect".
    let req = match payload {
        Ok(axum::Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => ConnectRequest::default(),
        Err(e) => return Err(ApiError::BadPayload(e.to_string())),
    };

    let events = state
        .lifecycle
        .connect(&ctx, &req.subscribe, req.immediate)
        .await?;

    Ok(ok(serde_json::json!({
        "details": "Connected!",
        "events": join_events(&events),
        "jid": ctx.jid,
        "webhook": ctx.webhook,
    })))
}

pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    state.lifecycle.disconnect(&ctx).await?;
    Ok(ok(serde_json::json!({ "Details": "Disconnected" })))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    state.lifecycle.logout(&ctx).await?;
    Ok(ok(serde_json::json!({ "Details": "Logged out" })))
}

pub async fn status(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    let (connected, logged_in) = state.lifecycle.status(&ctx)?;
    Ok(ok(serde_json::json!({
        "Connected": connected,
        "LoggedIn": logged_in,
    })))
}

pub async fn pair_phone(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    payload: Result<axum::Json<PairPhoneRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = payload.map_err(|e| ApiError::BadPayload(e.to_string()))?;
    if req.phone.is_empty() {
        return Err(ApiError::BadPayload("missing Phone in payload".into()));
    }

    let code = state.lifecycle.pair_phone(&ctx, &req.phone).await?;
    Ok(ok(serde_json::json!({ "LinkingCode": code })))
}

pub async fn pair_code(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    let code = state.lifecycle.pair_code(&ctx)?;
    Ok(ok(serde_json::json!({ "PairCode": code })))
}
