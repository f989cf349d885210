//! TursoStore - EntityStore Implementation for Turso/libsql Backend
//!
//! This module implements the `EntityStore` trait on top of
//! [`DatabaseService`]. All tree-consistency SQL lives here: the uniqueness
//! probes, the cycle check, and the single-statement prefix-substitution
//! cascades for paths and tree ids.
//!
//! # Transaction discipline
//!
//! Every mutation opens its own connection and runs under `BEGIN IMMEDIATE`,
//! taking the write lock up front so concurrent cascades over overlapping
//! subtrees queue on the busy timeout instead of deadlocking mid-flight.
//! Readers (`fetch_subtree_rows`) take no locks; WAL guarantees they see a
//! consistent pre- or post-commit snapshot.
//!
//! # Cascade shape
//!
//! Descendant paths are rewritten server-side in one statement:
//!
//! ```sql
//! UPDATE entities
//! SET path = ?new || substr(path, length(?old) + 1)
//! WHERE path LIKE ?old_escaped || '/%' ESCAPE '\'
//! ```
//!
//! The `'/%'` suffix makes the match segment-exact (`/Rocket1` never matches
//! a cascade on `/Rocket`) and strict (the mutated row itself is updated
//! separately, never by its own cascade).

use crate::db::entity_store::{EntityStore, ParentUpdate};
use crate::db::error::{DatabaseError, StoreError};
use crate::db::DatabaseService;
use crate::models::{Attribute, Entity, SubtreeRow};
use crate::paths::{derive_path, descendant_like_pattern, is_self_or_descendant};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row};
use std::sync::Arc;

const ENTITY_COLUMNS: &str = "id, name, parent_id, path, tree_id, created_at, modified_at";
const ATTRIBUTE_COLUMNS: &str = "id, entity_id, key, value, precision, created_at, modified_at";

/// `EntityStore` implementation for the Turso/libsql backend.
pub struct TursoStore {
    /// Underlying database service (connection + schema management)
    db: Arc<DatabaseService>,
}

impl TursoStore {
    /// Create a new TursoStore over an initialized database
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Parse a timestamp from the database - handles both SQLite and RFC3339
    /// formats
    ///
    /// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
    /// Old data might use RFC3339: "YYYY-MM-DDTHH:MM:SSZ"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        Err(DatabaseError::row_conversion(format!(
            "Unrecognized timestamp format: {s}"
        )))
    }

    fn entity_from_row(row: &Row) -> Result<Entity, DatabaseError> {
        let created_at: String = row
            .get(5)
            .map_err(|e| DatabaseError::row_conversion(format!("created_at: {e}")))?;
        let modified_at: String = row
            .get(6)
            .map_err(|e| DatabaseError::row_conversion(format!("modified_at: {e}")))?;

        Ok(Entity {
            id: row
                .get(0)
                .map_err(|e| DatabaseError::row_conversion(format!("id: {e}")))?,
            name: row
                .get(1)
                .map_err(|e| DatabaseError::row_conversion(format!("name: {e}")))?,
            parent_id: row
                .get(2)
                .map_err(|e| DatabaseError::row_conversion(format!("parent_id: {e}")))?,
            path: row
                .get(3)
                .map_err(|e| DatabaseError::row_conversion(format!("path: {e}")))?,
            tree_id: row
                .get(4)
                .map_err(|e| DatabaseError::row_conversion(format!("tree_id: {e}")))?,
            created_at: Self::parse_timestamp(&created_at)?,
            modified_at: Self::parse_timestamp(&modified_at)?,
        })
    }

    fn attribute_from_row(row: &Row) -> Result<Attribute, DatabaseError> {
        let created_at: String = row
            .get(5)
            .map_err(|e| DatabaseError::row_conversion(format!("created_at: {e}")))?;
        let modified_at: String = row
            .get(6)
            .map_err(|e| DatabaseError::row_conversion(format!("modified_at: {e}")))?;

        Ok(Attribute {
            id: row
                .get(0)
                .map_err(|e| DatabaseError::row_conversion(format!("id: {e}")))?,
            entity_id: row
                .get(1)
                .map_err(|e| DatabaseError::row_conversion(format!("entity_id: {e}")))?,
            key: row
                .get(2)
                .map_err(|e| DatabaseError::row_conversion(format!("key: {e}")))?,
            value: row
                .get(3)
                .map_err(|e| DatabaseError::row_conversion(format!("value: {e}")))?,
            precision: row
                .get(4)
                .map_err(|e| DatabaseError::row_conversion(format!("precision: {e}")))?,
            created_at: Self::parse_timestamp(&created_at)?,
            modified_at: Self::parse_timestamp(&modified_at)?,
        })
    }

    async fn begin(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    async fn commit(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    async fn rollback(conn: &Connection) {
        // Best effort; the connection is dropped right after and SQLite rolls
        // back an open transaction on close anyway.
        let _ = conn.execute("ROLLBACK", ()).await;
    }

    async fn select_entity(conn: &Connection, id: i64) -> Result<Option<Entity>, StoreError> {
        let mut stmt = conn
            .prepare(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query([id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::entity_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn select_ids_at_path(conn: &Connection, path: &str) -> Result<Vec<i64>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT id FROM entities WHERE path = ?")
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query([path])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            ids.push(
                row.get(0)
                    .map_err(|e| DatabaseError::row_conversion(format!("id: {e}")))?,
            );
        }
        Ok(ids)
    }

    /// Transaction body for [`EntityStore::create_entity`].
    async fn create_entity_tx(
        conn: &Connection,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Entity, StoreError> {
        let (path, parent_tree_id) = match parent_id {
            Some(pid) => {
                let parent = Self::select_entity(conn, pid)
                    .await?
                    .ok_or_else(|| StoreError::missing_parent(pid))?;
                (derive_path(name, Some(&parent.path)), Some(parent.tree_id))
            }
            None => (derive_path(name, None), None),
        };

        if !Self::select_ids_at_path(conn, &path).await?.is_empty() {
            return Err(StoreError::duplicate_path(path));
        }

        conn.execute(
            "INSERT INTO entities (name, parent_id, path, tree_id) VALUES (?, ?, ?, ?)",
            (name, parent_id, path.as_str(), parent_tree_id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert entity: {}", e)))?;

        let id = conn.last_insert_rowid();

        // A root's tree id is its own id, unknown before the insert.
        if parent_tree_id.is_none() {
            conn.execute("UPDATE entities SET tree_id = ? WHERE id = ?", (id, id))
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to assign tree id: {}", e))
                })?;
        }

        Self::select_entity(conn, id)
            .await?
            .ok_or_else(|| StoreError::entity_not_found(id))
    }

    /// Transaction body for [`EntityStore::rename_or_reparent`].
    async fn rename_or_reparent_tx(
        conn: &Connection,
        id: i64,
        new_name: &str,
        parent: ParentUpdate,
    ) -> Result<Entity, StoreError> {
        let current = Self::select_entity(conn, id)
            .await?
            .ok_or_else(|| StoreError::entity_not_found(id))?;

        let new_parent_id = match parent {
            ParentUpdate::Keep => current.parent_id,
            ParentUpdate::Set(pid) => pid,
        };

        let new_parent = match new_parent_id {
            Some(pid) => {
                if pid == id {
                    return Err(StoreError::cyclic_reference(current.path));
                }
                Some(
                    Self::select_entity(conn, pid)
                        .await?
                        .ok_or_else(|| StoreError::missing_parent(pid))?,
                )
            }
            None => None,
        };

        // Reject before any write: attaching under a node inside our own
        // subtree would make the entity its own ancestor.
        if let Some(p) = &new_parent {
            if is_self_or_descendant(&p.path, &current.path) {
                return Err(StoreError::cyclic_reference(current.path));
            }
        }

        let new_path = derive_path(new_name, new_parent.as_ref().map(|p| p.path.as_str()));
        let new_tree_id = match &new_parent {
            Some(p) => p.tree_id,
            None => id,
        };

        let path_changed = new_path != current.path;
        if path_changed && !Self::select_ids_at_path(conn, &new_path).await?.is_empty() {
            return Err(StoreError::duplicate_path(new_path));
        }

        conn.execute(
            "UPDATE entities
             SET name = ?, parent_id = ?, path = ?, tree_id = ?, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            (new_name, new_parent_id, new_path.as_str(), new_tree_id, id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to update entity: {}", e)))?;

        if path_changed {
            // One atomic multi-row prefix substitution over strict
            // descendants; matched rows keep everything after the old prefix.
            let descendants = conn
                .execute(
                    "UPDATE entities
                     SET path = ? || substr(path, length(?) + 1),
                         modified_at = CURRENT_TIMESTAMP
                     WHERE path LIKE ? ESCAPE '\\'",
                    (
                        new_path.as_str(),
                        current.path.as_str(),
                        descendant_like_pattern(&current.path),
                    ),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to cascade paths: {}", e))
                })?;

            tracing::debug!(
                entity_id = id,
                old_path = %current.path,
                new_path = %new_path,
                descendants,
                "cascaded path update"
            );
        }

        if new_tree_id != current.tree_id {
            conn.execute(
                "UPDATE entities SET tree_id = ? WHERE path LIKE ? ESCAPE '\\'",
                (new_tree_id, descendant_like_pattern(&new_path)),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to cascade tree ids: {}", e))
            })?;
        }

        Self::select_entity(conn, id)
            .await?
            .ok_or_else(|| StoreError::entity_not_found(id))
    }

    /// Transaction body for [`EntityStore::set_attribute`].
    async fn set_attribute_tx(
        conn: &Connection,
        entity_id: i64,
        key: &str,
        value: &str,
        precision: &str,
    ) -> Result<Attribute, StoreError> {
        if Self::select_entity(conn, entity_id).await?.is_none() {
            return Err(StoreError::entity_not_found(entity_id));
        }

        conn.execute(
            "INSERT INTO attributes (entity_id, key, value, precision) VALUES (?, ?, ?, ?)
             ON CONFLICT(entity_id, key) DO UPDATE SET
                 value = excluded.value,
                 precision = excluded.precision,
                 modified_at = CURRENT_TIMESTAMP",
            (entity_id, key, value, precision),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to upsert attribute: {}", e)))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ATTRIBUTE_COLUMNS} FROM attributes WHERE entity_id = ? AND key = ?"
            ))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query((entity_id, key))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Self::attribute_from_row(&row)?),
            None => Err(DatabaseError::sql_execution(
                "Upserted attribute row missing on readback".to_string(),
            )
            .into()),
        }
    }
}

#[async_trait]
impl EntityStore for TursoStore {
    async fn create_entity(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Entity, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::begin(&conn).await?;
        match Self::create_entity_tx(&conn, name, parent_id).await {
            Ok(entity) => {
                Self::commit(&conn).await?;
                Ok(entity)
            }
            Err(e) => {
                Self::rollback(&conn).await;
                Err(e)
            }
        }
    }

    async fn rename_or_reparent(
        &self,
        id: i64,
        new_name: &str,
        parent: ParentUpdate,
    ) -> Result<Entity, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::begin(&conn).await?;
        match Self::rename_or_reparent_tx(&conn, id, new_name, parent).await {
            Ok(entity) => {
                Self::commit(&conn).await?;
                Ok(entity)
            }
            Err(e) => {
                Self::rollback(&conn).await;
                Err(e)
            }
        }
    }

    async fn delete_entity(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;

        // FK actions do the cascading: attributes are deleted, children's
        // parent_id becomes NULL. Children's paths and tree ids stay stale.
        let deleted = conn
            .execute("DELETE FROM entities WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete entity: {}", e)))?;

        if deleted == 0 {
            return Err(StoreError::entity_not_found(id));
        }
        Ok(())
    }

    async fn entity_by_id(&self, id: i64) -> Result<Option<Entity>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::select_entity(&conn, id).await
    }

    async fn ids_at_path(&self, path: &str) -> Result<Vec<i64>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::select_ids_at_path(&conn, path).await
    }

    async fn fetch_subtree_rows(&self, root_path: &str) -> Result<Vec<SubtreeRow>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.name, e.path, e.parent_id,
                        a.key, a.value, a.precision
                 FROM entities e
                 LEFT JOIN attributes a ON a.entity_id = e.id
                 WHERE e.path = ? OR e.path LIKE ? ESCAPE '\\'
                 ORDER BY e.path, a.id",
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query((root_path, descendant_like_pattern(root_path)))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            out.push(SubtreeRow {
                entity_id: row
                    .get(0)
                    .map_err(|e| DatabaseError::row_conversion(format!("entity_id: {e}")))?,
                name: row
                    .get(1)
                    .map_err(|e| DatabaseError::row_conversion(format!("name: {e}")))?,
                path: row
                    .get(2)
                    .map_err(|e| DatabaseError::row_conversion(format!("path: {e}")))?,
                parent_id: row
                    .get(3)
                    .map_err(|e| DatabaseError::row_conversion(format!("parent_id: {e}")))?,
                attribute_key: row
                    .get(4)
                    .map_err(|e| DatabaseError::row_conversion(format!("attribute_key: {e}")))?,
                attribute_value: row
                    .get(5)
                    .map_err(|e| DatabaseError::row_conversion(format!("attribute_value: {e}")))?,
                attribute_precision: row.get(6).map_err(|e| {
                    DatabaseError::row_conversion(format!("attribute_precision: {e}"))
                })?,
            });
        }
        Ok(out)
    }

    async fn set_attribute(
        &self,
        entity_id: i64,
        key: &str,
        value: &str,
        precision: &str,
    ) -> Result<Attribute, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::begin(&conn).await?;
        match Self::set_attribute_tx(&conn, entity_id, key, value, precision).await {
            Ok(attribute) => {
                Self::commit(&conn).await?;
                Ok(attribute)
            }
            Err(e) => {
                Self::rollback(&conn).await;
                Err(e)
            }
        }
    }

    async fn delete_attribute(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;

        let deleted = conn
            .execute("DELETE FROM attributes WHERE id = ?", [id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete attribute: {}", e))
            })?;

        if deleted == 0 {
            return Err(StoreError::attribute_not_found(id));
        }
        Ok(())
    }
}
