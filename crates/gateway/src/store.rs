//! Durable tenant store.
//!
//! Persists user rows in `users.json` under the configured state path and
//! keeps them in memory behind a lock.  The store is the system of record;
//! the auth cache (`auth::cache`) is a derived read-through layer on top.
//! Every mutation rewrites the file atomically (tmp + rename).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use cg_domain::user::UserRecord;
use cg_domain::{Error, Result};

/// Fields supplied when an admin registers a new tenant.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub token: String,
    pub webhook: String,
    pub events: String,
    pub expiration: i64,
}

/// Tenant store backed by a JSON file.
pub struct UserStore {
    users_path: PathBuf,
    users: RwLock<HashMap<i64, UserRecord>>,
}

impl UserStore {
    /// Load or create the store at `state_path/users.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let users_path = state_path.join("users.json");
        let users: HashMap<i64, UserRecord> = if users_path.exists() {
            let raw = std::fs::read_to_string(&users_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            users = users.len(),
            path = %users_path.display(),
            "user store loaded"
        );

        Ok(Self {
            users_path,
            users: RwLock::new(users),
        })
    }

    pub fn get(&self, id: i64) -> Option<UserRecord> {
        self.users.read().get(&id).cloned()
    }

    pub fn find_by_token(&self, token: &str) -> Option<UserRecord> {
        self.users
            .read()
            .values()
            .find(|u| u.token == token)
            .cloned()
    }

    pub fn list(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.users.read().values().cloned().collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Register a new tenant. Fails when the token is already taken.
    pub fn insert(&self, new: NewUser) -> Result<UserRecord> {
        let mut users = self.users.write();
        if users.values().any(|u| u.token == new.token) {
            return Err(Error::Store("token already exists".into()));
        }

        let id = users.keys().max().copied().unwrap_or(0) + 1;
        let record = UserRecord {
            id,
            name: new.name,
            token: new.token,
            webhook: new.webhook,
            jid: String::new(),
            pair_code: String::new(),
            events: new.events,
            expiration: new.expiration,
        };
        users.insert(id, record.clone());
        Self::flush_locked(&self.users_path, &users)?;
        Ok(record)
    }

    /// Remove a tenant. Returns the deleted row, `None` when absent.
    pub fn delete(&self, id: i64) -> Result<Option<UserRecord>> {
        let mut users = self.users.write();
        let removed = users.remove(&id);
        if removed.is_some() {
            Self::flush_locked(&self.users_path, &users)?;
        }
        Ok(removed)
    }

    pub fn set_events(&self, id: i64, events: &str) -> Result<()> {
        self.mutate(id, |u| u.events = events.to_owned())
    }

    pub fn set_webhook(&self, id: i64, webhook: &str, events: &str) -> Result<()> {
        self.mutate(id, |u| {
            u.webhook = webhook.to_owned();
            u.events = events.to_owned();
        })
    }

    pub fn set_jid(&self, id: i64, jid: &str) -> Result<()> {
        self.mutate(id, |u| u.jid = jid.to_owned())
    }

    pub fn set_pair_code(&self, id: i64, code: &str) -> Result<()> {
        self.mutate(id, |u| u.pair_code = code.to_owned())
    }

    fn mutate(&self, id: i64, f: impl FnOnce(&mut UserRecord)) -> Result<()> {
        let mut users = self.users.write();
        let record = users
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("no user with id {id}")))?;
        f(record);
        Self::flush_locked(&self.users_path, &users)
    }

    /// Atomic rewrite of the whole file from the in-memory map.
    fn flush_locked(path: &Path, users: &HashMap<i64, UserRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(users)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, path).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, token: &str) -> NewUser {
        NewUser {
            name: name.into(),
            token: token.into(),
            webhook: String::new(),
            events: String::new(),
            expiration: 0,
        }
    }

    #[test]
    fn insert_and_find_by_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();

        let rec = store.insert(new_user("alice", "tok-a")).unwrap();
        assert_eq!(rec.id, 1);

        let found = store.find_by_token("tok-a").unwrap();
        assert_eq!(found.name, "alice");
        assert!(store.find_by_token("tok-x").is_none());
    }

    #[test]
    fn duplicate_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();

        store.insert(new_user("alice", "tok-a")).unwrap();
        assert!(store.insert(new_user("mallory", "tok-a")).is_err());
    }

    #[test]
    fn ids_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();

        let a = store.insert(new_user("a", "t1")).unwrap();
        let b = store.insert(new_user("b", "t2")).unwrap();
        store.delete(b.id).unwrap();
        let c = store.insert(new_user("c", "t3")).unwrap();
        assert!(c.id > a.id);
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = UserStore::new(dir.path()).unwrap();
            let rec = store.insert(new_user("alice", "tok-a")).unwrap();
            store.set_webhook(rec.id, "http://hook.test", "Message").unwrap();
            rec.id
        };

        let store = UserStore::new(dir.path()).unwrap();
        let rec = store.get(id).unwrap();
        assert_eq!(rec.webhook, "http://hook.test");
        assert_eq!(rec.events, "Message");
    }

    #[test]
    fn delete_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();

        let rec = store.insert(new_user("alice", "tok-a")).unwrap();
        assert!(store.delete(rec.id).unwrap().is_some());
        assert!(store.delete(rec.id).unwrap().is_none());
        assert!(store.find_by_token("tok-a").is_none());
    }

    #[test]
    fn mutate_missing_user_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();
        assert!(store.set_events(42, "Message").is_err());
    }
}
