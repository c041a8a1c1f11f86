//! Admin auth guard — `AdminGuard` Axum extractor.
//!
//! Admin routes are gated by a static bearer token, checked before any
//! user-context resolution.  Handlers opt in by adding `_guard: AdminGuard`
//! to their parameter list.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Axum extractor that enforces the admin bearer token.
///
/// The token is read once at startup from the env var named in config and
/// cached as a SHA-256 digest; comparison is constant time so neither the
/// token length nor a prefix leaks through timing.
///
/// If no admin token is configured (dev mode), all requests pass.
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected_hash = match &state.admin_token_hash {
            Some(h) => h,
            None => return Ok(AdminGuard), // no token configured → dev mode
        };

        let provided = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");

        let provided_hash = Sha256::digest(provided.as_bytes());
        if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
            return Err(ApiError::Unauthorized);
        }
        Ok(AdminGuard)
    }
}
