//! In-memory protocol backend.
//!
//! Single-process only, no real network. Sessions are scriptable: tests and
//! dev deployments control connect latency, whether the transport ever
//! comes up, and whether the session authenticates by itself. Events are
//! injected through a [`MemoryHandle`] looked up by user id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cg_domain::user::UserRecord;
use cg_domain::{Error, Result};

use crate::{ClientEvent, Connector, ProtocolClient, EVENT_CHANNEL_CAPACITY};

/// Scripted behaviour for sessions opened by a [`MemoryConnector`].
#[derive(Debug, Clone)]
pub struct MemoryBehavior {
    /// Simulated dial latency before the transport comes up.
    pub connect_delay: Duration,
    /// When false, `connect()` returns but the transport never comes up —
    /// models an unreachable endpoint with the client retrying internally.
    pub reachable: bool,
    /// When true, the session authenticates as soon as it connects.
    /// When false it stays unauthenticated pending pairing.
    pub auto_login: bool,
    /// Pairing artifact emitted on connect while unauthenticated.
    pub pair_code: String,
}

impl Default for MemoryBehavior {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(0),
            reachable: true,
            auto_login: true,
            pair_code: "CGATE-0000".into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryClient {
    behavior: MemoryBehavior,
    connected: Arc<AtomicBool>,
    logged_in: Arc<AtomicBool>,
    events: mpsc::Sender<ClientEvent>,
}

#[async_trait]
impl ProtocolClient for MemoryClient {
    async fn connect(&self) -> Result<()> {
        if self.behavior.connect_delay > Duration::ZERO {
            tokio::time::sleep(self.behavior.connect_delay).await;
        }
        if !self.behavior.reachable {
            // Unreachable endpoint: the attempt stays pending forever from
            // the gateway's point of view.
            return Ok(());
        }
        self.connected.store(true, Ordering::Release);
        let _ = self.events.send(ClientEvent::Connected).await;
        if self.behavior.auto_login {
            self.logged_in.store(true, Ordering::Release);
        } else {
            let _ = self
                .events
                .send(ClientEvent::PairCode(self.behavior.pair_code.clone()))
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.logged_in.store(false, Ordering::Release);
    }

    async fn logout(&self) -> Result<()> {
        if !self.logged_in.load(Ordering::Acquire) {
            return Err(Error::Protocol("not logged in".into()));
        }
        self.logged_in.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        let _ = self.events.send(ClientEvent::LoggedOut).await;
        Ok(())
    }

    async fn pair_phone(&self, phone: &str) -> Result<String> {
        if phone.is_empty() {
            return Err(Error::Protocol("empty phone number".into()));
        }
        if self.logged_in.load(Ordering::Acquire) {
            return Err(Error::Protocol("already paired".into()));
        }
        Ok(format!("LINK-{}", &self.behavior.pair_code))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle (event injection)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// External control surface for one in-memory session: inject events and
/// flip authentication state, as the remote server would.
#[derive(Clone)]
pub struct MemoryHandle {
    connected: Arc<AtomicBool>,
    logged_in: Arc<AtomicBool>,
    events: mpsc::Sender<ClientEvent>,
}

impl MemoryHandle {
    pub async fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event).await;
    }

    /// Mark the session authenticated, as a completed pairing would.
    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::Release);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connector producing [`MemoryClient`] sessions.
///
/// Behaviour can be overridden per user id before `open_session` runs;
/// handles for opened sessions are retained for injection.
pub struct MemoryConnector {
    default_behavior: MemoryBehavior,
    overrides: Mutex<HashMap<i64, MemoryBehavior>>,
    handles: Mutex<HashMap<i64, MemoryHandle>>,
}

impl MemoryConnector {
    pub fn new(default_behavior: MemoryBehavior) -> Self {
        Self {
            default_behavior,
            overrides: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Script the behaviour of the next session opened for `user_id`.
    pub fn script(&self, user_id: i64, behavior: MemoryBehavior) {
        self.overrides.lock().insert(user_id, behavior);
    }

    /// Injection handle for the most recent session of `user_id`.
    pub fn handle(&self, user_id: i64) -> Option<MemoryHandle> {
        self.handles.lock().get(&user_id).cloned()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(MemoryBehavior::default())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open_session(
        &self,
        record: &UserRecord,
    ) -> Result<(Arc<dyn ProtocolClient>, mpsc::Receiver<ClientEvent>)> {
        let behavior = self
            .overrides
            .lock()
            .get(&record.id)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let logged_in = Arc::new(AtomicBool::new(false));

        let handle = MemoryHandle {
            connected: connected.clone(),
            logged_in: logged_in.clone(),
            events: tx.clone(),
        };
        self.handles.lock().insert(record.id, handle);

        let client = MemoryClient {
            behavior,
            connected,
            logged_in,
            events: tx,
        };
        tracing::debug!(user_id = record.id, "in-memory session opened");
        Ok((Arc::new(client), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> UserRecord {
        UserRecord {
            id,
            name: format!("user-{id}"),
            token: format!("tok-{id}"),
            webhook: String::new(),
            jid: String::new(),
            pair_code: String::new(),
            events: String::new(),
            expiration: 0,
        }
    }

    #[tokio::test]
    async fn connect_sets_flags_and_emits_connected() {
        let connector = MemoryConnector::default();
        let (client, mut rx) = connector.open_session(&record(1)).await.unwrap();

        assert!(!client.is_connected());
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert!(client.is_logged_in());
        assert!(matches!(rx.recv().await, Some(ClientEvent::Connected)));
    }

    #[tokio::test]
    async fn unreachable_session_never_connects() {
        let connector = MemoryConnector::default();
        connector.script(
            2,
            MemoryBehavior {
                reachable: false,
                ..Default::default()
            },
        );
        let (client, _rx) = connector.open_session(&record(2)).await.unwrap();
        client.connect().await.unwrap();
        assert!(!client.is_connected());
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn pairing_flow_emits_pair_code() {
        let connector = MemoryConnector::default();
        connector.script(
            3,
            MemoryBehavior {
                auto_login: false,
                pair_code: "QR-XYZ".into(),
                ..Default::default()
            },
        );
        let (client, mut rx) = connector.open_session(&record(3)).await.unwrap();
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert!(!client.is_logged_in());

        assert!(matches!(rx.recv().await, Some(ClientEvent::Connected)));
        match rx.recv().await {
            Some(ClientEvent::PairCode(code)) => assert_eq!(code, "QR-XYZ"),
            other => panic!("expected pair code, got {other:?}"),
        }

        let link = client.pair_phone("15550001111").await.unwrap();
        assert!(link.starts_with("LINK-"));

        // The remote side completes pairing.
        connector.handle(3).unwrap().set_logged_in(true);
        assert!(client.is_logged_in());
    }

    #[tokio::test]
    async fn logout_requires_login_and_emits_logged_out() {
        let connector = MemoryConnector::default();
        let (client, mut rx) = connector.open_session(&record(4)).await.unwrap();

        assert!(client.logout().await.is_err());

        client.connect().await.unwrap();
        let _ = rx.recv().await; // Connected
        client.logout().await.unwrap();
        assert!(!client.is_logged_in());
        assert!(matches!(rx.recv().await, Some(ClientEvent::LoggedOut)));
    }

    #[tokio::test]
    async fn handle_injects_events() {
        let connector = MemoryConnector::default();
        let (_client, mut rx) = connector.open_session(&record(5)).await.unwrap();
        let handle = connector.handle(5).unwrap();

        handle
            .emit(ClientEvent::Presence(serde_json::json!({"from": "x"})))
            .await;
        match rx.recv().await {
            Some(ClientEvent::Presence(p)) => assert_eq!(p["from"], "x"),
            other => panic!("expected presence, got {other:?}"),
        }
    }
}
