//! Session lifecycle — connect, disconnect, logout, status, pairing.
//!
//! Every session owns one background task, driving one protocol client.
//! The registry is the atomicity point: the task only exists while its
//! entry does, and the entry is removed exactly once (controller or task,
//! whichever acts first — `unregister` is idempotent).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cg_domain::events::{join_events, parse_subscription, EventKind};
use cg_domain::user::UserContext;
use cg_protocol::{ClientEvent, Connector, ProtocolClient};

use crate::auth::AuthCache;
use crate::runtime::dispatch::Dispatcher;
use crate::runtime::registry::SessionRegistry;
use crate::store::UserStore;

/// How often `connect` re-checks the client while waiting for it to
/// come up.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("no session")]
    NoSession,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("not connected")]
    NotConnected,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("timed out waiting for connection")]
    ConnectTimeout,
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("store failure: {0}")]
    Store(String),
}

pub struct LifecycleController {
    users: Arc<UserStore>,
    cache: Arc<AuthCache>,
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    connect_timeout: Duration,
}

impl LifecycleController {
    pub fn new(
        users: Arc<UserStore>,
        cache: Arc<AuthCache>,
        registry: Arc<SessionRegistry>,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            users,
            cache,
            registry,
            connector,
            dispatcher,
            connect_timeout,
        }
    }

    /// Start a session for the tenant.  The subscription is persisted
    /// before any protocol work happens, so a crash mid-connect never
    /// loses it.  With `immediate` set the call returns as soon as the
    /// background task is spawned; otherwise it waits up to the
    /// configured deadline for the client to report connected.  A
    /// deadline miss returns `ConnectTimeout` but leaves the session
    /// registered — the client keeps dialing in the background.
    pub async fn connect(
        &self,
        ctx: &UserContext,
        subscribe: &[String],
        immediate: bool,
    ) -> Result<BTreeSet<EventKind>, LifecycleError> {
        // A rejected duplicate connect must leave the live session's
        // subscription untouched, so the registered check comes before
        // any persistence.
        if self.registry.is_registered(ctx.user_id) {
            return Err(LifecycleError::AlreadyConnected);
        }

        let events = parse_subscription(subscribe);
        let joined = join_events(&events);

        // Persist first, cache second. A store write failure is logged
        // but does not abort the connect; the cached snapshot still
        // carries the new subscription for this process lifetime.
        if let Err(e) = self.users.set_events(ctx.user_id, &joined) {
            tracing::warn!(user_id = ctx.user_id, error = %e, "failed to persist subscription");
        }
        self.cache.update(&ctx.token, |c| c.events = events.clone());

        let record = self
            .users
            .get(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;

        // open_session is side-effect free, so constructing the client
        // before registration cannot leak a half-open connection when we
        // lose the registration race.
        let (client, rx) = self
            .connector
            .open_session(&record)
            .await
            .map_err(|e| LifecycleError::Upstream(e.to_string()))?;

        let cancel = CancellationToken::new();
        if self
            .registry
            .register(ctx.user_id, client.clone(), cancel.clone())
            .is_err()
        {
            return Err(LifecycleError::AlreadyConnected);
        }

        tokio::spawn(run_session(
            client.clone(),
            rx,
            cancel,
            ctx.user_id,
            ctx.token.clone(),
            self.users.clone(),
            self.cache.clone(),
            self.registry.clone(),
            self.dispatcher.clone(),
        ));

        if !immediate {
            let deadline = tokio::time::Instant::now() + self.connect_timeout;
            while !client.is_connected() {
                if tokio::time::Instant::now() >= deadline {
                    // Session stays registered; the client keeps trying.
                    return Err(LifecycleError::ConnectTimeout);
                }
                tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
            }
        }

        Ok(events)
    }

    /// Stop the session without ending the account pairing. Requires a
    /// connected, logged-in session. Clears the stored subscription.
    pub async fn disconnect(&self, ctx: &UserContext) -> Result<(), LifecycleError> {
        let entry = self
            .registry
            .lookup(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;

        if !(entry.client.is_connected() && entry.client.is_logged_in()) {
            return Err(LifecycleError::NotLoggedIn);
        }

        entry.cancel.cancel();
        // Unregister here rather than waiting for the task, so a connect
        // issued right after this call does not race a stale entry.
        self.registry.unregister(ctx.user_id);

        if let Err(e) = self.users.set_events(ctx.user_id, "") {
            tracing::warn!(user_id = ctx.user_id, error = %e, "failed to clear subscription");
        }
        self.cache.update(&ctx.token, |c| c.events.clear());

        tracing::info!(user_id = ctx.user_id, "session disconnected");
        Ok(())
    }

    /// End the account pairing and stop the session.  The cached
    /// snapshot is invalidated so the next authenticated request sees
    /// the post-logout store state.
    pub async fn logout(&self, ctx: &UserContext) -> Result<(), LifecycleError> {
        let entry = self
            .registry
            .lookup(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;

        if !entry.client.is_connected() {
            return Err(LifecycleError::NotConnected);
        }
        if !entry.client.is_logged_in() {
            return Err(LifecycleError::NotLoggedIn);
        }

        entry
            .client
            .logout()
            .await
            .map_err(|e| LifecycleError::Upstream(e.to_string()))?;

        entry.cancel.cancel();
        self.registry.unregister(ctx.user_id);

        if let Err(e) = self.users.set_jid(ctx.user_id, "") {
            tracing::warn!(user_id = ctx.user_id, error = %e, "failed to clear jid");
        }
        self.cache.invalidate(&ctx.token);

        tracing::info!(user_id = ctx.user_id, "logged out");
        Ok(())
    }

    /// Report (connected, logged_in) for the tenant's session.
    pub fn status(&self, ctx: &UserContext) -> Result<(bool, bool), LifecycleError> {
        let entry = self
            .registry
            .lookup(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;
        Ok((entry.client.is_connected(), entry.client.is_logged_in()))
    }

    /// Request a phone-number linking code from the upstream.
    pub async fn pair_phone(
        &self,
        ctx: &UserContext,
        phone: &str,
    ) -> Result<String, LifecycleError> {
        let entry = self
            .registry
            .lookup(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;

        if !entry.client.is_connected() {
            return Err(LifecycleError::NotConnected);
        }
        if entry.client.is_logged_in() {
            return Err(LifecycleError::AlreadyLoggedIn);
        }

        entry
            .client
            .pair_phone(phone)
            .await
            .map_err(|e| LifecycleError::Upstream(e.to_string()))
    }

    /// Return the most recent pairing code the session emitted, if any.
    /// Only meaningful while the session is connected but not yet
    /// logged in.
    pub fn pair_code(&self, ctx: &UserContext) -> Result<String, LifecycleError> {
        let entry = self
            .registry
            .lookup(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;

        if !entry.client.is_connected() {
            return Err(LifecycleError::NotConnected);
        }
        if entry.client.is_logged_in() {
            return Err(LifecycleError::AlreadyLoggedIn);
        }

        let record = self
            .users
            .get(ctx.user_id)
            .ok_or(LifecycleError::NoSession)?;
        Ok(record.pair_code)
    }
}

/// Background task owning one session. Exits on cancellation, on a
/// remote logout, or when the event channel closes, and always removes
/// its registry entry on the way out.
#[allow(clippy::too_many_arguments)]
async fn run_session(
    client: Arc<dyn ProtocolClient>,
    mut events: mpsc::Receiver<ClientEvent>,
    cancel: CancellationToken,
    user_id: i64,
    token: String,
    users: Arc<UserStore>,
    cache: Arc<AuthCache>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
) {
    if let Err(e) = client.connect().await {
        // Stay registered: callers observe a session that never came up
        // and tear it down explicitly.
        tracing::warn!(user_id, error = %e, "connect attempt failed");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                client.disconnect().await;
                tracing::debug!(user_id, "session cancelled");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(user_id, "event channel closed");
                    break;
                };
                match event {
                    ClientEvent::Connected => {
                        tracing::debug!(user_id, "session connected");
                    }
                    ClientEvent::PairCode(code) => {
                        if let Err(e) = users.set_pair_code(user_id, &code) {
                            tracing::warn!(user_id, error = %e, "failed to store pair code");
                        }
                    }
                    ClientEvent::LoggedOut => {
                        tracing::info!(user_id, "logged out by remote");
                        // Same cleanup as an explicit logout: the pairing
                        // is gone, so the stored identity goes with it.
                        if let Err(e) = users.set_jid(user_id, "") {
                            tracing::warn!(user_id, error = %e, "failed to clear jid");
                        }
                        cache.invalidate(&token);
                        break;
                    }
                    other => {
                        let (Some(kind), Some(payload)) = (other.kind(), other.payload()) else {
                            continue;
                        };
                        // Resolve per event so subscription changes made
                        // after connect take effect mid-session.
                        let Some(ctx) = cache.resolve(&token) else {
                            tracing::warn!(user_id, "session user vanished, dropping event");
                            continue;
                        };
                        if let Some(delivery) = Dispatcher::plan(&ctx, kind, payload) {
                            // Sequential delivery preserves emission order.
                            dispatcher.deliver(delivery).await;
                        }
                    }
                }
            }
        }
    }

    registry.unregister_if_current(user_id, &client);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_protocol::memory::{MemoryBehavior, MemoryConnector};
    use tempfile::TempDir;

    fn seed_user(users: &UserStore) -> UserContext {
        let record = users
            .insert(crate::store::NewUser {
                name: "alice".into(),
                token: "tok-alice".into(),
                webhook: String::new(),
                events: String::new(),
                expiration: 0,
            })
            .unwrap();
        UserContext::from_record(&record)
    }

    fn controller(
        dir: &TempDir,
        behavior: MemoryBehavior,
    ) -> (LifecycleController, UserContext, Arc<SessionRegistry>) {
        let users = Arc::new(UserStore::new(dir.path()).unwrap());
        let ctx = seed_user(&users);
        let cache = Arc::new(AuthCache::new(users.clone()));
        let registry = Arc::new(SessionRegistry::new());
        let connector = Arc::new(MemoryConnector::new(behavior));
        let dispatcher = Arc::new(Dispatcher::new(&Default::default()));
        let controller = LifecycleController::new(
            users,
            cache,
            registry.clone(),
            connector,
            dispatcher,
            Duration::from_secs(2),
        );
        (controller, ctx, registry)
    }

    #[tokio::test]
    async fn connect_waits_until_client_is_up() {
        let dir = TempDir::new().unwrap();
        let behavior = MemoryBehavior {
            connect_delay: Duration::from_millis(300),
            ..Default::default()
        };
        let (controller, ctx, registry) = controller(&dir, behavior);

        let events = controller
            .connect(&ctx, &["Message".into()], false)
            .await
            .unwrap();
        assert!(events.contains(&EventKind::Message));
        assert!(registry.is_registered(ctx.user_id));

        let (connected, logged_in) = controller.status(&ctx).unwrap();
        assert!(connected);
        assert!(logged_in);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, _) = controller(&dir, MemoryBehavior::default());

        controller.connect(&ctx, &[], true).await.unwrap();
        let err = controller.connect(&ctx, &[], true).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyConnected));
    }

    #[tokio::test]
    async fn rejected_connect_leaves_subscription_untouched() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, _) = controller(&dir, MemoryBehavior::default());

        controller
            .connect(&ctx, &["Message".into()], false)
            .await
            .unwrap();

        let err = controller
            .connect(&ctx, &["Presence".into()], true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyConnected));

        // The live session keeps its original filter, in the store and
        // in the cached snapshot.
        assert_eq!(controller.users.get(ctx.user_id).unwrap().events, "Message");
        let snapshot = controller.cache.resolve(&ctx.token).unwrap();
        assert!(snapshot.events.contains(&EventKind::Message));
        assert!(!snapshot.events.contains(&EventKind::Presence));
    }

    #[tokio::test]
    async fn connect_timeout_leaves_session_registered() {
        let dir = TempDir::new().unwrap();
        let behavior = MemoryBehavior {
            reachable: false,
            ..Default::default()
        };
        let (controller, ctx, registry) = controller(&dir, behavior);

        // Short deadline for the test; the poll interval still applies.
        let controller = LifecycleController {
            connect_timeout: Duration::from_millis(400),
            ..controller
        };

        let err = controller.connect(&ctx, &[], false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ConnectTimeout));
        assert!(registry.is_registered(ctx.user_id));
    }

    #[tokio::test]
    async fn disconnect_frees_the_slot() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, registry) = controller(&dir, MemoryBehavior::default());

        controller.connect(&ctx, &[], false).await.unwrap();
        controller.disconnect(&ctx).await.unwrap();
        assert!(!registry.is_registered(ctx.user_id));

        // Reconnect succeeds immediately; no stale entry blocks it.
        controller.connect(&ctx, &[], false).await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_without_session_is_no_session() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, _) = controller(&dir, MemoryBehavior::default());
        let err = controller.disconnect(&ctx).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NoSession));
    }

    #[tokio::test]
    async fn logout_requires_login() {
        let dir = TempDir::new().unwrap();
        let behavior = MemoryBehavior {
            auto_login: false,
            ..Default::default()
        };
        let (controller, ctx, _) = controller(&dir, behavior);

        controller.connect(&ctx, &[], false).await.unwrap();
        let err = controller.logout(&ctx).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotLoggedIn));
    }

    #[tokio::test]
    async fn logout_tears_down_and_clears_jid() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, registry) = controller(&dir, MemoryBehavior::default());

        controller.users.set_jid(ctx.user_id, "1555@s").unwrap();
        controller.connect(&ctx, &[], false).await.unwrap();
        controller.logout(&ctx).await.unwrap();

        assert!(!registry.is_registered(ctx.user_id));
        assert_eq!(controller.users.get(ctx.user_id).unwrap().jid, "");
    }

    #[tokio::test]
    async fn pair_phone_rejected_when_already_logged_in() {
        let dir = TempDir::new().unwrap();
        let (controller, ctx, _) = controller(&dir, MemoryBehavior::default());

        controller.connect(&ctx, &[], false).await.unwrap();
        let err = controller.pair_phone(&ctx, "15551234").await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyLoggedIn));
    }

    #[tokio::test]
    async fn pair_phone_returns_linking_code() {
        let dir = TempDir::new().unwrap();
        let behavior = MemoryBehavior {
            auto_login: false,
            ..Default::default()
        };
        let (controller, ctx, _) = controller(&dir, behavior);

        controller.connect(&ctx, &[], false).await.unwrap();
        let code = controller.pair_phone(&ctx, "15551234").await.unwrap();
        assert!(code.starts_with("LINK-"));
    }

    #[tokio::test]
    async fn pair_code_comes_from_store() {
        let dir = TempDir::new().unwrap();
        let behavior = MemoryBehavior {
            auto_login: false,
            ..Default::default()
        };
        let (controller, ctx, _) = controller(&dir, behavior);

        controller.connect(&ctx, &[], false).await.unwrap();
        // The task stores the emitted code asynchronously.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let code = controller.pair_code(&ctx).unwrap();
        assert_eq!(code, "CGATE-0000");
    }
}
