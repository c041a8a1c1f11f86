pub mod admin;
pub mod error;
pub mod health;
pub mod session;
pub mod webhook;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (health probe), **tenant** (gated by
/// the `token` header/query middleware) and **admin** (gated by the
/// admin bearer token extractor).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let tenant = Router::new()
        // Session lifecycle
        .route("/session/connect", post(session::connect))
        .route("/session/disconnect", post(session::disconnect))
        .route("/session/logout", post(session::logout))
        .route("/session/status", get(session::status))
        .route("/session/pairphone", post(session::pair_phone))
        .route("/session/paircode", get(session::pair_code))
        // Webhook configuration
        .route("/webhook", get(webhook::get))
        .route("/webhook", post(webhook::set))
        .route("/webhook", put(webhook::update))
        .route("/webhook", delete(webhook::delete))
        .layer(middleware::from_fn_with_state(
            state,
            crate::auth::middleware::require_user,
        ));

    // Admin auth lives in the AdminGuard extractor, not a layer.
    let admin = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users", post(admin::add_user))
        .route("/admin/users/:id", delete(admin::delete_user));

    public.merge(tenant).merge(admin)
}
