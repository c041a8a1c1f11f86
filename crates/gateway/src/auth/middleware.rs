//! Tenant authentication middleware.
//!
//! The API token comes from the `token` header or, failing that, a `token`
//! query parameter.  It is resolved to a [`UserContext`] through the auth
//! cache and threaded to handlers explicitly: the middleware stores the
//! snapshot in request extensions and handlers receive it via the
//! [`CurrentUser`] extractor parameter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use cg_domain::user::UserContext;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Axum middleware gating every tenant route. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(&req) {
        Some(t) if !t.is_empty() => t,
        _ => return ApiError::Unauthorized.into_response(),
    };

    match state.auth.resolve(&token) {
        Some(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}

fn extract_token(req: &Request<Body>) -> Option<String> {
    if let Some(header) = req.headers().get("token") {
        return header.to_str().ok().map(str::to_owned);
    }
    // Query values arrive percent-encoded; Query decodes them.
    Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("token"))
}

/// The resolved tenant for this request.  Handlers opt in by adding
/// `CurrentUser(ctx)` to their parameter list; the middleware guarantees
/// the extension is present on protected routes.
pub struct CurrentUser(pub Arc<UserContext>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<UserContext>>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}
