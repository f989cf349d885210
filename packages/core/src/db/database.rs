//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql/Turso.
//!
//! # Architecture
//!
//! - **Path-agnostic**: accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: enabled per connection; attribute cleanup on entity
//!   delete and parent nulling on parent delete are FK actions
//! - **Busy timeout**: per-connection, so a mutation that cannot take the
//!   write lock blocks until the holder commits instead of failing with
//!   `SQLITE_BUSY` - lock waits are backpressure, not errors
//!
//! # Database Connection Patterns
//!
//! **Always use `connect_with_timeout()` in async functions.** It applies the
//! busy timeout and enables foreign keys on the fresh connection; both
//! pragmas are connection-scoped in SQLite, so a bare `connect()` would skip
//! them.

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use entitytree_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/entitytree.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        // A new database file needs a WAL checkpoint after schema creation;
        // existing files skip it.
        let is_new_database = !db_path.exists();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Create a connection handle to the database
    ///
    /// Prefer [`connect_with_timeout`](Self::connect_with_timeout); this raw
    /// variant skips the per-connection pragmas.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::from)
    }

    /// Create a connection with the per-connection pragmas applied
    ///
    /// Sets a 5-second busy timeout (concurrent writers queue on the write
    /// lock instead of failing) and enables foreign key enforcement, which
    /// SQLite scopes to the connection.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of
    /// execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Creates tables and indexes using CREATE TABLE IF NOT EXISTS,
    /// ensuring idempotent initialization (safe to call multiple times).
    ///
    /// # Schema
    ///
    /// - `entities` table: the tree itself, with the indexed materialized
    ///   `path` column that all prefix-range scans run over
    /// - `attributes` table: numeric properties owned by entities
    ///
    /// Uniqueness follows the per-parent policy: `(parent_id, path)` unique
    /// for non-roots, `path` globally unique among roots.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Enable WAL mode for better concurrency
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent_id INTEGER,
                path TEXT NOT NULL,
                tree_id INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                -- Parent deletion orphans children; their stored path and
                -- tree_id go stale until their next save
                FOREIGN KEY (parent_id) REFERENCES entities(id) ON DELETE SET NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create entities table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS attributes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                precision TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                -- Entity deletion cascades to its attributes
                FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create attributes table: {}", e))
        })?;

        self.create_core_indexes(&conn).await?;

        // Flush the schema for newly created databases so a connection opened
        // immediately afterwards cannot race the WAL.
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create core indexes for the entities and attributes tables
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        // Range-scan index on path (subtree fetches, cascades)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_path ON entities(path)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_entities_path': {}",
                e
            ))
        })?;

        // Index on parent_id (hierarchy queries, FK enforcement)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_parent ON entities(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_entities_parent': {}",
                e
            ))
        })?;

        // Per-parent path uniqueness for non-roots
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_parent_path
             ON entities(parent_id, path) WHERE parent_id IS NOT NULL",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_entities_parent_path': {}",
                e
            ))
        })?;

        // Global path uniqueness among roots
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_root_path
             ON entities(path) WHERE parent_id IS NULL",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_entities_root_path': {}",
                e
            ))
        })?;

        // One value per key per entity
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_attributes_entity_key
             ON attributes(entity_id, key)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_attributes_entity_key': {}",
                e
            ))
        })?;

        Ok(())
    }
}
