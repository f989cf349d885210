//! Database Error Types
//!
//! This module defines error types for database operations: `DatabaseError`
//! for connection/SQL plumbing failures and `StoreError` for tree-invariant
//! violations detected inside a store transaction.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers all error cases for database connection, initialization,
/// and basic operations. Invariant violations are handled by
/// [`StoreError`].
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Row-to-model conversion error
    #[error("Row conversion failed: {0}")]
    RowConversionError(String),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a row conversion error
    pub fn row_conversion(context: impl Into<String>) -> Self {
        Self::RowConversionError(context.into())
    }
}

/// Tree-invariant violations surfaced by [`crate::db::EntityStore`]
/// operations.
///
/// Every variant is detected before the first durable write of its mutation;
/// the surrounding transaction rolls back in full, so no partial cascade is
/// ever committed.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another entity already occupies the computed path
    #[error("Entity path is not unique: {path}")]
    DuplicatePath { path: String },

    /// The proposed parent lies inside the entity's own subtree
    #[error("A node cannot be a descendant of itself: {path}")]
    CyclicReference { path: String },

    /// The referenced parent entity does not exist
    #[error("Parent entity not found: {parent_id}")]
    MissingParent { parent_id: i64 },

    /// The mutation target does not exist
    #[error("Entity not found: {id}")]
    EntityNotFound { id: i64 },

    /// The attribute targeted for deletion does not exist
    #[error("Attribute not found: {id}")]
    AttributeNotFound { id: i64 },

    /// Underlying database failure
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl StoreError {
    /// Create a duplicate path error
    pub fn duplicate_path(path: impl Into<String>) -> Self {
        Self::DuplicatePath { path: path.into() }
    }

    /// Create a cyclic reference error
    pub fn cyclic_reference(path: impl Into<String>) -> Self {
        Self::CyclicReference { path: path.into() }
    }

    /// Create a missing parent error
    pub fn missing_parent(parent_id: i64) -> Self {
        Self::MissingParent { parent_id }
    }

    /// Create an entity not found error
    pub fn entity_not_found(id: i64) -> Self {
        Self::EntityNotFound { id }
    }

    /// Create an attribute not found error
    pub fn attribute_not_found(id: i64) -> Self {
        Self::AttributeNotFound { id }
    }
}
