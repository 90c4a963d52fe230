//! Local libSQL connection

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

const MEMORY_TARGET: &str = ":memory:";

/// Applied to every new connection; in-memory databases reject some
const PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = FULL",
    "PRAGMA busy_timeout = 5000",
];

/// An open, migrated libSQL database
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open or create the database file at `path` and bring its schema up
    /// to date
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_target(&path.as_ref().to_string_lossy()).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open_target(MEMORY_TARGET).await
    }

    async fn open_target(target: &str) -> Result<Self> {
        let db = Builder::new_local(target).build().await?;
        let conn = db.connect()?;
        for pragma in PRAGMAS {
            // journal_mode answers with a row, so it goes through query
            if let Err(error) = conn.query(pragma, ()).await {
                tracing::debug!("{pragma} not applied: {error}");
            }
        }

        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
