use std::sync::Arc;

use cg_domain::config::Config;

use crate::auth::AuthCache;
use crate::runtime::{LifecycleController, SessionRegistry};
use crate::store::UserStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Tenants ───────────────────────────────────────────────────────
    /// Persistent user records (JSON file under the state path).
    pub users: Arc<UserStore>,
    /// Token → context snapshots, read-through over `users`.
    pub auth: Arc<AuthCache>,

    // ── Sessions ──────────────────────────────────────────────────────
    pub registry: Arc<SessionRegistry>,
    pub lifecycle: Arc<LifecycleController>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,
}
