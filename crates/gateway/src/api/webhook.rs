//! Tenant webhook configuration endpoints.
//!
//! Every mutation writes the store first, then refreshes the cached
//! snapshot, so live session tasks pick up the change on their next
//! event.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use cg_domain::events::{join_events, parse_subscription, split_events};

use crate::api::error::{ok, ApiError};
use crate::auth::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetWebhookRequest {
    #[serde(rename = "webhook", default)]
    pub webhook_url: String,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    #[serde(rename = "webhook", default)]
    pub webhook_url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

/// `GET /webhook` — current webhook URL and subscribed kinds, read from
/// the durable record rather than the cache.
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    let record = state
        .users
        .get(ctx.user_id)
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let subscribe: Vec<&str> = split_events(&record.events)
        .iter()
        .map(|k| k.as_str())
        .collect();
    Ok(ok(serde_json::json!({
        "webhook": record.webhook,
        "subscribe": subscribe,
    })))
}

/// `POST /webhook` — set the webhook URL and event subscription.
pub async fn set(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    payload: Result<axum::Json<SetWebhookRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = payload.map_err(|e| ApiError::BadPayload(e.to_string()))?;

    let events = parse_subscription(&req.events);
    apply(&state, &ctx.token, ctx.user_id, &req.webhook_url, &events)?;

    Ok(ok(serde_json::json!({
        "webhook": req.webhook_url,
        "events": req.events,
    })))
}

/// `PUT /webhook` — update webhook URL and subscription; `active: false`
/// clears both.
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    payload: Result<axum::Json<UpdateWebhookRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = payload.map_err(|e| ApiError::BadPayload(e.to_string()))?;

    let (url, events) = if req.active {
        (req.webhook_url.clone(), parse_subscription(&req.events))
    } else {
        (String::new(), Default::default())
    };
    apply(&state, &ctx.token, ctx.user_id, &url, &events)?;

    Ok(ok(serde_json::json!({
        "webhook": url,
        "events": req.events,
        "active": req.active,
    })))
}

/// `DELETE /webhook` — remove the webhook and clear the subscription.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Response, ApiError> {
    apply(&state, &ctx.token, ctx.user_id, "", &Default::default())?;
    Ok(ok(serde_json::json!({
        "Details": "Webhook and events deleted successfully",
    })))
}

fn apply(
    state: &AppState,
    token: &str,
    user_id: i64,
    url: &str,
    events: &std::collections::BTreeSet<cg_domain::EventKind>,
) -> Result<(), ApiError> {
    state
        .users
        .set_webhook(user_id, url, &join_events(events))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state.auth.update(token, |c| {
        c.webhook = url.to_owned();
        c.events = events.clone();
    });
    Ok(())
}
