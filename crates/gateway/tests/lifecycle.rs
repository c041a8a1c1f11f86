//! Integration tests for the session lifecycle and webhook bridge —
//! full round-trip against the in-process protocol backend and a local
//! HTTP capture endpoint standing in for a tenant webhook.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;

use cg_domain::config::WebhookConfig;
use cg_domain::events::EventKind;
use cg_domain::user::UserContext;
use cg_gateway::auth::AuthCache;
use cg_gateway::runtime::{Dispatcher, LifecycleController, LifecycleError, SessionRegistry};
use cg_gateway::store::{NewUser, UserStore};
use cg_protocol::memory::{MemoryBehavior, MemoryConnector};
use cg_protocol::ClientEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Captured = Arc<Mutex<Vec<serde_json::Value>>>;

/// Spawn a local HTTP endpoint that records every POSTed JSON body.
async fn spawn_webhook_sink() -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));

    async fn capture(
        State(captured): State<Captured>,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) {
        captured.lock().push(body);
    }

    let app = Router::new()
        .route("/hook", post(capture))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), captured)
}

struct Harness {
    users: Arc<UserStore>,
    cache: Arc<AuthCache>,
    connector: Arc<MemoryConnector>,
    controller: LifecycleController,
    registry: Arc<SessionRegistry>,
    _dir: tempfile::TempDir,
}

fn harness(behavior: MemoryBehavior) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let users = Arc::new(UserStore::new(dir.path()).unwrap());
    let cache = Arc::new(AuthCache::new(users.clone()));
    let registry = Arc::new(SessionRegistry::new());
    let connector = Arc::new(MemoryConnector::new(behavior));
    let dispatcher = Arc::new(Dispatcher::new(&WebhookConfig::default()));
    let controller = LifecycleController::new(
        users.clone(),
        cache.clone(),
        registry.clone(),
        connector.clone(),
        dispatcher,
        Duration::from_secs(2),
    );
    Harness {
        users,
        cache,
        connector,
        controller,
        registry,
        _dir: dir,
    }
}

fn register_user(h: &Harness, webhook: &str) -> UserContext {
    let record = h
        .users
        .insert(NewUser {
            name: "alice".into(),
            token: "tok-e2e".into(),
            webhook: webhook.into(),
            events: String::new(),
            expiration: 0,
        })
        .unwrap();
    UserContext::from_record(&record)
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..50 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within 2.5s");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// End-to-end: connect → filter → deliver → disconnect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn message_subscription_filters_and_delivers() {
    let (hook_url, captured) = spawn_webhook_sink().await;
    let h = harness(MemoryBehavior::default());
    let ctx = register_user(&h, &hook_url);

    let events = h
        .controller
        .connect(&ctx, &["Message".into()], false)
        .await
        .unwrap();
    assert!(events.contains(&EventKind::Message));

    let (connected, logged_in) = h.controller.status(&ctx).unwrap();
    assert!(connected);
    assert!(logged_in);

    let handle = h.connector.handle(ctx.user_id).unwrap();

    // Presence is not subscribed — must not reach the webhook.
    handle
        .emit(ClientEvent::Presence(serde_json::json!({"from": "x"})))
        .await;
    // Message is subscribed — must be delivered with user id and payload.
    let payload = serde_json::json!({"id": "msg-1", "text": "hello"});
    handle.emit(ClientEvent::Message(payload.clone())).await;

    {
        let captured = captured.clone();
        wait_for(move || !captured.lock().is_empty()).await;
    }
    // Give a straggling Presence delivery (a bug) a chance to land.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bodies = captured.lock().clone();
    assert_eq!(bodies.len(), 1, "only the Message event is delivered");
    assert_eq!(bodies[0]["type"], "Message");
    assert_eq!(bodies[0]["userId"], ctx.user_id);
    assert_eq!(bodies[0]["event"], payload);

    h.controller.disconnect(&ctx).await.unwrap();
    assert!(matches!(
        h.controller.status(&ctx).unwrap_err(),
        LifecycleError::NoSession
    ));
}

#[tokio::test]
async fn subscription_change_applies_mid_session() {
    let (hook_url, captured) = spawn_webhook_sink().await;
    let h = harness(MemoryBehavior::default());
    let ctx = register_user(&h, &hook_url);

    h.controller
        .connect(&ctx, &["Message".into()], false)
        .await
        .unwrap();
    let handle = h.connector.handle(ctx.user_id).unwrap();

    handle
        .emit(ClientEvent::Presence(serde_json::json!({"n": 1})))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(captured.lock().is_empty());

    // Widen the subscription store-first, cache-second, as the webhook
    // API does.
    h.users.set_webhook(ctx.user_id, &hook_url, "All").unwrap();
    h.cache.update(&ctx.token, |c| {
        c.events = [EventKind::All].into_iter().collect();
    });

    handle
        .emit(ClientEvent::Presence(serde_json::json!({"n": 2})))
        .await;
    {
        let captured = captured.clone();
        wait_for(move || !captured.lock().is_empty()).await;
    }
    assert_eq!(captured.lock()[0]["type"], "Presence");
}

#[tokio::test]
async fn concurrent_connects_one_winner() {
    let h = Arc::new(harness(MemoryBehavior::default()));
    let ctx = register_user(&h, "");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            h.controller.connect(&ctx, &[], true).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(LifecycleError::AlreadyConnected) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);
    assert!(h.registry.is_registered(ctx.user_id));
}

#[tokio::test]
async fn remote_logout_tears_down_the_session() {
    let h = harness(MemoryBehavior::default());
    let ctx = register_user(&h, "");
    h.users
        .set_jid(ctx.user_id, "1555000@s.whatsapp.net")
        .unwrap();

    h.controller.connect(&ctx, &[], false).await.unwrap();
    let handle = h.connector.handle(ctx.user_id).unwrap();

    handle.emit(ClientEvent::LoggedOut).await;
    {
        let registry = h.registry.clone();
        let user_id = ctx.user_id;
        wait_for(move || !registry.is_registered(user_id)).await;
    }

    assert!(matches!(
        h.controller.status(&ctx).unwrap_err(),
        LifecycleError::NoSession
    ));
    // Remote logout clears the stored identity like an explicit one.
    assert_eq!(h.users.get(ctx.user_id).unwrap().jid, "");
}
