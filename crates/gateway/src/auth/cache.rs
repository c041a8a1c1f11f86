//! Token → user-context cache.
//!
//! Read-through over the user store with no expiration: a miss populates the
//! cache from the store, a hit returns the cached snapshot untouched.  The
//! cache accelerates auth; it never owns persistence — callers pair every
//! `update` with the matching store write (store first, then cache).
//!
//! Snapshots are `Arc<UserContext>` and immutable: `update` builds a new
//! snapshot and swaps it in, so in-flight requests and session tasks holding
//! the old one never observe a partial write.  Explicit invalidation points:
//! logout, webhook changes, admin delete.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cg_domain::user::UserContext;

use crate::store::UserStore;

pub struct AuthCache {
    users: Arc<UserStore>,
    entries: RwLock<HashMap<String, Arc<UserContext>>>,
}

impl AuthCache {
    pub fn new(users: Arc<UserStore>) -> Self {
        Self {
            users,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a token to its user context. `None` means unknown token
    /// (callers treat as unauthorized).
    pub fn resolve(&self, token: &str) -> Option<Arc<UserContext>> {
        if let Some(ctx) = self.entries.read().get(token) {
            return Some(ctx.clone());
        }

        tracing::info!("looking up user information in store");
        let record = self.users.find_by_token(token)?;
        let ctx = Arc::new(UserContext::from_record(&record));
        self.entries
            .write()
            .insert(token.to_owned(), ctx.clone());
        Some(ctx)
    }

    /// Replace the snapshot for `token` with a copy modified by `f`.
    /// Returns the new snapshot, or `None` when the token is not cached
    /// and unknown to the store.
    pub fn update(
        &self,
        token: &str,
        f: impl FnOnce(&mut UserContext),
    ) -> Option<Arc<UserContext>> {
        let current = self.resolve(token)?;
        let mut next = (*current).clone();
        f(&mut next);
        let next = Arc::new(next);
        self.entries
            .write()
            .insert(token.to_owned(), next.clone());
        Some(next)
    }

    /// Drop the entry for `token`; the next resolve re-reads the store.
    pub fn invalidate(&self, token: &str) {
        self.entries.write().remove(token);
    }
}
