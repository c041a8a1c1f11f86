//! Session registry — the single source of truth for "is this tenant
//! currently connected".
//!
//! Maps a user id to its live session handle and cancellation token.
//! Registration is an atomic check-and-set: two concurrent connects for the
//! same user cannot both win, and an existing entry is never overwritten.
//! The raw map is never exposed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use cg_protocol::ProtocolClient;

/// One registered session: the protocol handle plus the single-use stop
/// signal its background task selects on.  Cancellation is non-blocking
/// from the controller side and idempotent on double-signal.
#[derive(Clone)]
pub struct SessionEntry {
    pub client: Arc<dyn ProtocolClient>,
    pub cancel: CancellationToken,
}

/// Returned by `register` when an entry already exists for the user.
#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyRegistered;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<i64, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `user_id`. Fails if one is already present.
    pub fn register(
        &self,
        user_id: i64,
        client: Arc<dyn ProtocolClient>,
        cancel: CancellationToken,
    ) -> Result<(), AlreadyRegistered> {
        let mut sessions = self.sessions.lock();
        match sessions.entry(user_id) {
            std::collections::hash_map::Entry::Occupied(_) => Err(AlreadyRegistered),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(SessionEntry { client, cancel });
                Ok(())
            }
        }
    }

    pub fn lookup(&self, user_id: i64) -> Option<SessionEntry> {
        self.sessions.lock().get(&user_id).cloned()
    }

    /// Remove the entry for `user_id`; idempotent if absent.
    pub fn unregister(&self, user_id: i64) {
        self.sessions.lock().remove(&user_id);
    }

    /// Remove the entry for `user_id` only if it still holds `client`.
    /// Used by a session task on exit so it cannot evict a successor
    /// registered after its own entry was already removed.
    pub fn unregister_if_current(&self, user_id: i64, client: &Arc<dyn ProtocolClient>) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(&user_id) {
            if Arc::ptr_eq(&entry.client, client) {
                sessions.remove(&user_id);
            }
        }
    }

    pub fn is_registered(&self, user_id: i64) -> bool {
        self.sessions.lock().contains_key(&user_id)
    }
}
