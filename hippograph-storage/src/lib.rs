#![allow(clippy::expect_used)]

//! # Hippograph Storage
//!
//! libSQL-backed durable persistence for the [`hippograph_core::StoreBackend`]
//! contract: nodes, edges, entities, note-entity links, note versions, edge
//! history, and search logs.
//!
//! ## Example
//!
//! ```no_run
//! use hippograph_storage::LibsqlStore;
//!
//! # async fn example() -> hippograph_core::Result<()> {
//! let store = LibsqlStore::new("file:hippograph.db", "").await?;
//! store.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use libsql::Database;
use tokio::sync::Mutex as AsyncMutex;

mod rows;
mod schema;
mod store;

pub use schema::initialize_schema_sql;

/// libSQL-backed store for hippograph's knowledge graph.
///
/// Holds a single shared connection to keep the implementation proportionate
/// to what a personal, single-tenant memory store needs; writes additionally
/// serialize behind `write_lock` per the single-writer discipline the
/// `StoreBackend` trait contract requires, so the store is safe to use
/// directly even outside the facade's own write-serialization.
pub struct LibsqlStore {
    db: Arc<Database>,
    write_lock: AsyncMutex<()>,
}

impl LibsqlStore {
    /// Open a store at `url` with `token` for remote authentication.
    ///
    /// # Security
    ///
    /// Only `libsql://`, `file:`, and `:memory:` URLs are accepted. Remote
    /// (`libsql://`) connections additionally require a non-empty `token`.
    /// Anything else — including bare `http://`/`https://` — is rejected
    /// before a connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`hippograph_core::Error::Validation`] for a rejected URL or
    /// missing token, and [`hippograph_core::Error::Storage`] if the
    /// underlying connection attempt fails.
    pub async fn new(url: &str, token: &str) -> hippograph_core::Result<Self> {
        use hippograph_core::Error;

        if !url.starts_with("libsql://") && !url.starts_with("file:") && !url.starts_with(":memory:")
        {
            return Err(Error::Validation(format!(
                "insecure database url: {url}. Only libsql://, file:, or :memory: are allowed"
            )));
        }
        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::Validation(
                "authentication token required for remote libsql connections".to_string(),
            ));
        }

        tracing::info!(%url, "connecting to libsql database");

        let db = if let Some(remote) = url.strip_prefix("libsql://") {
            libsql::Builder::new_remote(format!("libsql://{remote}"), token.to_string())
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to connect to libsql: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            libsql::Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open local database: {e}")))?
        };

        Ok(Self::from_database(db))
    }

    /// Wrap an already-built [`Database`] — used by tests and by callers
    /// that need finer control over connection construction.
    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Create all tables and indices, idempotently.
    ///
    /// # Errors
    ///
    /// Returns [`hippograph_core::Error::Storage`] if any DDL statement
    /// fails.
    pub async fn initialize_schema(&self) -> hippograph_core::Result<()> {
        let conn = self.connection()?;
        for stmt in schema::initialize_schema_sql() {
            conn.execute(stmt, ())
                .await
                .map_err(|e| hippograph_core::Error::Storage(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    fn connection(&self) -> hippograph_core::Result<libsql::Connection> {
        self.db
            .connect()
            .map_err(|e| hippograph_core::Error::Storage(format!("failed to get connection: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_insecure_url() {
        let err = LibsqlStore::new("http://example.com", "token").await.unwrap_err();
        assert!(matches!(err, hippograph_core::Error::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_remote_without_token() {
        let err = LibsqlStore::new("libsql://example.com", "").await.unwrap_err();
        assert!(matches!(err, hippograph_core::Error::Validation(_)));
    }

    #[tokio::test]
    async fn in_memory_store_initializes_schema() {
        let store = LibsqlStore::new(":memory:", "").await.expect("connect");
        store.initialize_schema().await.expect("init schema");
    }
}
