//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::db::{DatabaseError, StoreError};
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// The upward-facing error taxonomy. Every invariant violation is detected
/// before the first durable write of its mutation and rolls the whole
/// transaction back; `MissingParent` is kept distinct from `EntityNotFound`
/// so callers can tell "target missing" from "new-parent missing".
#[derive(Error, Debug)]
pub enum EntityServiceError {
    /// Entity name is empty or contains the path separator
    #[error("Invalid entity name: {0}")]
    InvalidName(#[from] ValidationError),

    /// Attribute value is not a decimal number
    #[error("Invalid attribute value: {value}")]
    InvalidAttributeValue { value: String },

    /// Another entity already occupies the computed path
    #[error("Entity path is not unique: {path}")]
    DuplicatePath { path: String },

    /// The proposed reparent would make the entity its own ancestor
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

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl EntityServiceError {
    /// Create an invalid attribute value error
    pub fn invalid_attribute_value(value: impl Into<String>) -> Self {
        Self::InvalidAttributeValue {
            value: value.into(),
        }
    }
}

impl From<StoreError> for EntityServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicatePath { path } => Self::DuplicatePath { path },
            StoreError::CyclicReference { path } => Self::CyclicReference { path },
            StoreError::MissingParent { parent_id } => Self::MissingParent { parent_id },
            StoreError::EntityNotFound { id } => Self::EntityNotFound { id },
            StoreError::AttributeNotFound { id } => Self::AttributeNotFound { id },
            StoreError::Database(e) => Self::Database(e),
        }
    }
}
