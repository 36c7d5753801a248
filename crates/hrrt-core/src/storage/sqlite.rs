use rusqlite::{Connection, Result};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// The relational index of subjects, scans and files.
///
/// The connection sits behind a mutex so one index can be shared by
/// reference across propagation workers.
pub struct Index {
    conn: Mutex<Connection>,
}

impl Index {
    pub fn open(path: &str) -> Result<Self> {
        let index = Index {
            conn: Mutex::new(Connection::open(path)?),
        };
        index.configure_pragmas()?;
        index.migrate_schema()?;
        debug!("Opened index at {}", path);
        Ok(index)
    }

    pub fn open_in_memory() -> Result<Self> {
        let index = Index {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        index.configure_pragmas()?;
        index.migrate_schema()?;
        Ok(index)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.connection().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        self.connection()
            .execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version 1)");
        Ok(())
    }

    /// Lock the connection. A poisoned lock still yields the connection:
    /// SQLite keeps its own transactional consistency.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close the connection, surfacing any error SQLite reports on shutdown.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| e)?;
        debug!("Index closed");
        Ok(())
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.connection().execute_batch(
            "DELETE FROM file;
             DELETE FROM scan;
             DELETE FROM subject;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}
