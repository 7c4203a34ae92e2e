use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::{schema, SessionStore, StoreError};
use crate::models::{Session, SessionId};

/// Durable store: one row per session, the full session kept as a JSON body.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::debug!(path = %path.display(), "Opened session database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens `clarita.db` in the platform data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = directories::ProjectDirs::from("", "", "clarita-pm").ok_or(StoreError::NoDataDir)?;
        Self::open(dirs.data_dir().join("clarita.db"))
    }

    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn).map_err(|e| StoreError::Migration(format!("{:#}", e)))
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM sessions WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b)).transpose().map_err(Into::into)
    }

    fn put(&self, session: &Session) -> Result<(), StoreError> {
        let body = serde_json::to_string(session)?;
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO sessions (id, state, body, created_at, last_activity)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                body = excluded.body,
                last_activity = excluded.last_activity",
            (
                session.id().as_str(),
                session.state().as_str(),
                &body,
                format_timestamp(session.created_at()),
                format_timestamp(session.last_activity()),
            ),
        )?;
        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let removed = conn.execute("DELETE FROM sessions WHERE id = ?", [id.as_str()])?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT body FROM sessions ORDER BY created_at, id")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(Into::into))
            .collect()
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

/// Fixed-precision RFC 3339, so text order matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let whole = format_timestamp("2026-01-01T00:00:00Z".parse().unwrap());
        let fraction = format_timestamp("2026-01-01T00:00:00.5Z".parse().unwrap());
        assert!(whole < fraction);
        assert_eq!(fraction, "2026-01-01T00:00:00.500000Z");
    }
}
