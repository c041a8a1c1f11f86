//! Per-tenant user records and the resolved request context.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::events::{split_events, EventKind};

/// A durable tenant row, as held by the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    /// Opaque API token identifying this tenant on every request.
    pub token: String,
    /// Outbound webhook URL; empty means no webhook configured.
    #[serde(default)]
    pub webhook: String,
    /// Linked WhatsApp identity (empty until first pairing).
    #[serde(default)]
    pub jid: String,
    /// Last pairing artifact (QR payload or phone-linking code).
    #[serde(default)]
    pub pair_code: String,
    /// Comma-joined subscribed event kinds (wire form).
    #[serde(default)]
    pub events: String,
    /// Tenant expiration timestamp (unix seconds); 0 means never.
    #[serde(default)]
    pub expiration: i64,
}

/// Immutable per-request snapshot of a tenant, resolved from its token.
///
/// Owned by the auth cache and shared as `Arc<UserContext>` with in-flight
/// requests and session tasks. Any mutation builds a fresh snapshot; a live
/// snapshot is never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: i64,
    pub name: String,
    pub jid: String,
    pub webhook: String,
    pub events: BTreeSet<EventKind>,
    pub token: String,
}

impl UserContext {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            user_id: record.id,
            name: record.name.clone(),
            jid: record.jid.clone(),
            webhook: record.webhook.clone(),
            events: split_events(&record.events),
            token: record.token.clone(),
        }
    }
}
