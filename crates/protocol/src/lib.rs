//! Protocol-client boundary: the seam between the gateway and whatever
//! library owns the actual WhatsApp wire connection.
//!
//! The gateway never touches connection, encryption, or message encoding —
//! it only drives a [`ProtocolClient`] (connect / disconnect / logout /
//! status / pairing) and consumes the [`ClientEvent`] stream it emits.
//! Implementations may wrap a real protocol library or a test double; the
//! in-tree [`memory::MemoryConnector`] is the dev/test backend.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cg_domain::events::EventKind;
use cg_domain::user::UserRecord;
use cg_domain::Result;

/// Buffered capacity of a session's event channel.  A slow consumer
/// backpressures the client rather than dropping events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An event emitted by a live session.
///
/// The first five variants are the dispatchable kinds — candidates for
/// webhook delivery, subject to the tenant's subscription.  The rest are
/// session-internal signals the lifecycle layer consumes itself.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Message(serde_json::Value),
    ReadReceipt(serde_json::Value),
    Presence(serde_json::Value),
    HistorySync(serde_json::Value),
    ChatPresence(serde_json::Value),
    /// Transport reached the server (not necessarily authenticated yet).
    Connected,
    /// A fresh pairing artifact (QR payload or linking code) to persist.
    PairCode(String),
    /// The remote side unpaired the device; the session must tear down.
    LoggedOut,
}

impl ClientEvent {
    /// The subscription kind this event dispatches under, if any.
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            ClientEvent::Message(_) => Some(EventKind::Message),
            ClientEvent::ReadReceipt(_) => Some(EventKind::ReadReceipt),
            ClientEvent::Presence(_) => Some(EventKind::Presence),
            ClientEvent::HistorySync(_) => Some(EventKind::HistorySync),
            ClientEvent::ChatPresence(_) => Some(EventKind::ChatPresence),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            ClientEvent::Message(p)
            | ClientEvent::ReadReceipt(p)
            | ClientEvent::Presence(p)
            | ClientEvent::HistorySync(p)
            | ClientEvent::ChatPresence(p) => Some(p),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client & connector traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live (or connecting) protocol session for exactly one tenant.
///
/// `is_connected` / `is_logged_in` are point-in-time reads and may change
/// between calls; the gateway treats them as advisory status, not locks.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Start the connection attempt.  Implementations retry internally;
    /// returning `Ok` means the attempt is underway or complete, not that
    /// the session is connected — poll `is_connected` for that.
    async fn connect(&self) -> Result<()>;

    /// Close the transport without unpairing the device.
    async fn disconnect(&self);

    /// Unpair the device server-side, then drop the transport.
    async fn logout(&self) -> Result<()>;

    /// Request a phone-number linking code for pairing.
    async fn pair_phone(&self, phone: &str) -> Result<String>;

    fn is_connected(&self) -> bool;

    fn is_logged_in(&self) -> bool;
}

/// Factory for per-tenant protocol clients.
///
/// `open_session` only constructs the client and its event channel; it must
/// be cheap and side-effect free.  The network work happens when the
/// session task calls [`ProtocolClient::connect`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open_session(
        &self,
        record: &UserRecord,
    ) -> Result<(Arc<dyn ProtocolClient>, mpsc::Receiver<ClientEvent>)>;
}
