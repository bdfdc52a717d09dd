pub mod repository;
pub mod schema;

use std::path::Path;

use crate::error::{Error, Result};

/// Connection settings shared by both handles. WAL lets the analytics read
/// path keep answering while a sync or cache refresh holds the writer.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
                       PRAGMA foreign_keys=ON;\
                       PRAGMA busy_timeout=5000;";

/// The warehouse store. Syncs, imports, and cache rebuilds go through
/// `writer`, which `tokio_rusqlite` runs one call at a time; `get_*` queries
/// go through `reader`.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// `~/.newsletterdw/newsletterdw.db`, created on first use.
    pub async fn open() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("no home directory for the default warehouse path".into()))?;
        let dir = home.join(".newsletterdw");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(dir.join("newsletterdw.db")).await
    }

    /// Open (or create) a warehouse file and bring its schema up to date.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let writer = tokio_rusqlite::Connection::open(path).await?;
        migrate(&writer).await?;
        let reader = tokio_rusqlite::Connection::open(path).await?;
        reader
            .call(|conn| conn.execute_batch(PRAGMAS))
            .await?;
        Ok(Self { writer, reader })
    }

    /// A throwaway warehouse. SQLite memory databases are private to their
    /// connection, so both handles point at the same one.
    pub async fn open_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        migrate(&conn).await?;
        Ok(Self {
            reader: conn.clone(),
            writer: conn,
        })
    }

    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}

async fn migrate(conn: &tokio_rusqlite::Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS).map_err(|e| e.to_string())?;
        schema::migrations()
            .to_latest(conn)
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| Error::Migration(e.to_string()))
}
