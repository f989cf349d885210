//! EntityStore Trait - Database Abstraction Layer
//!
//! This module defines the `EntityStore` trait that abstracts the
//! transactional tree repository from the service layer. The trait keeps
//! `EntityService` free of SQL and lets tests substitute a backend without
//! touching business logic.
//!
//! # Contract
//!
//! Every mutation method is one atomic unit: path computation, uniqueness
//! probe, the row write, and the descendant cascades all commit or roll back
//! together. A concurrent subtree read observes either the fully-old or the
//! fully-new state of a mutated subtree, never a mix.

use crate::db::error::StoreError;
use crate::models::{Attribute, Entity, SubtreeRow};
use async_trait::async_trait;

/// How `rename_or_reparent` should treat the entity's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentUpdate {
    /// Leave the current parent untouched (pure rename)
    Keep,
    /// Attach under the given parent; `Set(None)` detaches the entity into a
    /// new root
    Set(Option<i64>),
}

/// Abstraction layer for entity tree persistence operations
///
/// Implementations must be `Send + Sync`; the service layer shares one store
/// across concurrent requests.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert a new entity under `parent_id` (or as a root when `None`)
    ///
    /// Derives the materialized path from the parent chain, probes it for
    /// uniqueness, and assigns `tree_id` - the parent's for a child, the
    /// entity's own id for a root - all in the insert's transaction.
    ///
    /// # Errors
    ///
    /// - `MissingParent` if `parent_id` matches no row
    /// - `DuplicatePath` if another entity already occupies the derived path
    async fn create_entity(&self, name: &str, parent_id: Option<i64>)
        -> Result<Entity, StoreError>;

    /// Rename and/or reparent an entity, cascading to its subtree
    ///
    /// Recomputes the path from `new_name` and the effective parent. When the
    /// recomputed path differs from the stored one, every descendant's path
    /// has the old prefix replaced with the new one in a single multi-row
    /// UPDATE inside the same transaction; `tree_id` is re-propagated over
    /// the moved subtree the same way when the parent changed. A recomputed
    /// path equal to the stored one triggers no cascade and no uniqueness
    /// probe beyond the row itself.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if `id` matches no row
    /// - `MissingParent` if the new parent matches no row
    /// - `CyclicReference` if the new parent lies inside the entity's subtree
    /// - `DuplicatePath` if the recomputed path is taken
    async fn rename_or_reparent(
        &self,
        id: i64,
        new_name: &str,
        parent: ParentUpdate,
    ) -> Result<Entity, StoreError>;

    /// Delete an entity
    ///
    /// Cascades deletion of the entity's attributes and nulls children's
    /// `parent_id` (both are FK actions). Children's own paths and tree ids
    /// are deliberately left untouched.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if `id` matches no row.
    async fn delete_entity(&self, id: i64) -> Result<(), StoreError>;

    /// Fetch a single entity by id; `Ok(None)` when absent
    async fn entity_by_id(&self, id: i64) -> Result<Option<Entity>, StoreError>;

    /// Ids of entities at exactly `path` (no partial segment match)
    ///
    /// Used for uniqueness probes and existence checks.
    async fn ids_at_path(&self, path: &str) -> Result<Vec<i64>, StoreError>;

    /// One linear scan over an entire subtree
    ///
    /// Returns every entity whose path is `root_path` or lies strictly below
    /// it, left-joined with its attributes, ordered by path ascending. Takes
    /// no locks; a read racing an in-flight cascade sees the pre- or
    /// post-cascade subtree, never a mix.
    async fn fetch_subtree_rows(&self, root_path: &str) -> Result<Vec<SubtreeRow>, StoreError>;

    /// Create or replace the attribute `key` on `entity_id`
    ///
    /// `value` and `precision` arrive pre-encoded by the quantizer
    /// ([`crate::models::write_value`]).
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if `entity_id` matches no row.
    async fn set_attribute(
        &self,
        entity_id: i64,
        key: &str,
        value: &str,
        precision: &str,
    ) -> Result<Attribute, StoreError>;

    /// Delete an attribute by id
    ///
    /// # Errors
    ///
    /// `AttributeNotFound` if `id` matches no row.
    async fn delete_attribute(&self, id: i64) -> Result<(), StoreError>;
}
