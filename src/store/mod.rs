//! Session storage.
//!
//! The assistant only talks to [`SessionStore`]. [`MemorySessionStore`] keeps
//! sessions for the lifetime of the process; [`SqliteSessionStore`] keeps them
//! across restarts.

mod schema;
mod sqlite;

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::models::{Session, SessionId};

pub use sqlite::SqliteSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session body could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("could not determine data directory")]
    NoDataDir,
}

/// Keyed storage for [`Session`] records.
///
/// Implementations hand out copies: mutating a returned session has no effect
/// until it is `put` back.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Inserts or replaces the session with the same id.
    fn put(&self, session: &Session) -> Result<(), StoreError>;

    /// Returns whether a session was removed.
    fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;

    /// All sessions, oldest first.
    fn list(&self) -> Result<Vec<Session>, StoreError>;

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }
}

/// In-memory store, the default.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().expect("session store lock poisoned");
        Ok(sessions.get(id).cloned())
    }

    fn put(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");
        Ok(sessions.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().expect("session store lock poisoned");
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(all)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().expect("session store lock poisoned").len())
    }
}
