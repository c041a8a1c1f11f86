//! AppState construction extracted from `main.rs` so CLI commands share
//! one boot path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use cg_domain::config::{Config, ConfigSeverity};
use cg_protocol::memory::{MemoryBehavior, MemoryConnector};
use cg_protocol::Connector;

use crate::auth::AuthCache;
use crate::runtime::{Dispatcher, LifecycleController, SessionRegistry};
use crate::state::AppState;
use crate::store::UserStore;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── User store + auth cache ──────────────────────────────────────
    let users = Arc::new(
        UserStore::new(&config.store.state_path).context("initializing user store")?,
    );
    tracing::info!(path = %config.store.state_path.display(), users = users.list().len(), "user store ready");
    let auth = Arc::new(AuthCache::new(users.clone()));

    // ── Protocol connector ───────────────────────────────────────────
    // Only the in-process backend exists today; config validation has
    // already rejected anything else.
    let connector: Arc<dyn Connector> = Arc::new(MemoryConnector::new(MemoryBehavior::default()));
    tracing::info!(backend = %config.protocol.backend, "protocol connector ready");

    // ── Session runtime ──────────────────────────────────────────────
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(&config.webhook));
    let lifecycle = Arc::new(LifecycleController::new(
        users.clone(),
        auth.clone(),
        registry.clone(),
        connector,
        dispatcher,
        Duration::from_secs(config.protocol.connect_timeout_secs),
    ));
    tracing::info!(
        connect_timeout_secs = config.protocol.connect_timeout_secs,
        "session lifecycle ready"
    );

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = {
        let env_var = &config.server.admin_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "admin bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "admin bearer-token auth DISABLED — set the {env_var} env var"
                );
                None
            }
        }
    };

    Ok(AppState {
        config,
        users,
        auth,
        registry,
        lifecycle,
        admin_token_hash,
    })
}
