//! Admin tenant CRUD.
//!
//! - `GET    /admin/users`      — list all tenants (with live connected flag)
//! - `POST   /admin/users`      — register a tenant
//! - `DELETE /admin/users/:id`  — remove a tenant and evict its cache entry
//!
//! All three require the admin bearer token ([`AdminGuard`]); they never
//! touch the per-request user context.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;

use cg_domain::EventKind;

use crate::api::error::{ok, ApiError};
use crate::auth::AdminGuard;
use crate::state::AppState;
use crate::store::NewUser;

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub webhook: String,
    /// Comma-joined event kinds, e.g. `"Message,ReadReceipt"`.
    #[serde(default)]
    pub events: String,
    #[serde(default)]
    pub expiration: i64,
}

pub async fn list_users(
    _guard: AdminGuard,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let users: Vec<serde_json::Value> = state
        .users
        .list()
        .into_iter()
        .map(|u| {
            serde_json::json!({
                "id": u.id,
                "name": u.name,
                "token": u.token,
                "webhook": u.webhook,
                "jid": u.jid,
                "connected": state.registry.is_registered(u.id),
                "expiration": u.expiration,
                "events": u.events,
            })
        })
        .collect();
    Ok(ok(users))
}

pub async fn add_user(
    _guard: AdminGuard,
    State(state): State<AppState>,
    payload: Result<axum::Json<AddUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = payload.map_err(|e| ApiError::BadPayload(e.to_string()))?;
    if req.name.is_empty() || req.token.is_empty() {
        return Err(ApiError::BadPayload(
            "incomplete payload: name and token are required".into(),
        ));
    }

    // Unlike subscribe-time parsing, admin input is rejected rather than
    // silently filtered.
    for raw in req.events.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if raw.parse::<EventKind>().is_err() {
            return Err(ApiError::BadPayload(format!("invalid event: {raw}")));
        }
    }

    let record = state
        .users
        .insert(NewUser {
            name: req.name,
            token: req.token,
            webhook: req.webhook,
            events: req.events,
            expiration: req.expiration,
        })
        .map_err(|e| match e {
            cg_domain::Error::Store(msg) if msg.contains("already exists") => {
                ApiError::Conflict("user with the same token already exists".into())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    tracing::info!(user_id = record.id, name = %record.name, "user registered");
    Ok(ok(serde_json::json!({ "id": record.id })))
}

pub async fn delete_user(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let removed = state
        .users
        .delete(id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    // Evict the snapshot so the deleted token stops authenticating now,
    // not at the next store re-read.
    state.auth.invalidate(&removed.token);

    // Tear down a live session if one exists; ignore the absent case.
    if let Some(entry) = state.registry.lookup(id) {
        entry.cancel.cancel();
        state.registry.unregister(id);
    }

    tracing::info!(user_id = id, "user deleted");
    Ok(ok(serde_json::json!({ "Details": "User deleted successfully" })))
}
