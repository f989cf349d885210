//! Entity Service - Tree Mutations and Subtree Reads
//!
//! The business logic layer over [`EntityStore`]:
//!
//! - structural mutations (create, rename/reparent, delete) with name
//!   validation and the per-entity consistency guard armed around each one
//! - attribute writes with precision capture
//! - subtree reads, addressed by id or by normalized path
//!
//! The store guarantees atomicity of each mutation plus its cascades; this
//! layer guarantees the mutation ordering discipline around them: validate
//! first, arm the guard, mutate, release the guard unconditionally.

use crate::db::{EntityStore, ParentUpdate};
use crate::models::{validate_name, write_value, Attribute, Entity, EntityTree};
use crate::paths::normalize;
use crate::services::error::EntityServiceError;
use crate::services::mutation_guard::TreeConsistencyController;
use crate::services::subtree;
use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;

/// Service layer for the entity tree.
///
/// # Examples
///
/// ```no_run
/// use entitytree_core::db::{DatabaseService, EntityStore, TursoStore};
/// use entitytree_core::services::EntityService;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./entitytree.db")).await?);
///     let store: Arc<dyn EntityStore> = Arc::new(TursoStore::new(db));
///     let service = EntityService::new(store);
///
///     let rocket = service.create_entity("Rocket", None).await?;
///     let stage = service.create_entity("Stage1", Some(rocket.id)).await?;
///     service.set_attribute(stage.id, "DryMass", "22.2").await?;
///
///     let tree = service.get_subtree_at_path("/Rocket").await?;
///     assert!(tree.is_some());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EntityService {
    store: Arc<dyn EntityStore>,
    controller: TreeConsistencyController,
}

impl EntityService {
    /// Create a new service over the given store
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            controller: TreeConsistencyController::new(),
        }
    }

    /// Access the consistency controller (mutation-phase introspection)
    pub fn controller(&self) -> &TreeConsistencyController {
        &self.controller
    }

    /// Create an entity under `parent_id`, or a new root when `None`
    ///
    /// The derived path, the uniqueness probe, and the tree-id assignment all
    /// commit with the insert.
    ///
    /// # Errors
    ///
    /// - [`EntityServiceError::InvalidName`] before anything is persisted
    /// - [`EntityServiceError::MissingParent`] if the parent id matches no row
    /// - [`EntityServiceError::DuplicatePath`] if the path is taken
    pub async fn create_entity(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Entity, EntityServiceError> {
        validate_name(name)?;

        // Creation grows the parent's subtree, so the guard is keyed by the
        // parent; a brand-new root has no existing entity to guard. An insert
        // has no descendants, so the scope never enters Propagating.
        let _scope = match parent_id {
            Some(pid) => Some(self.controller.begin(pid).await),
            None => None,
        };

        let entity = self.store.create_entity(name, parent_id).await?;

        tracing::debug!(entity_id = entity.id, path = %entity.path, "created entity");
        Ok(entity)
    }

    /// Rename an entity, move it under a new parent, or both
    ///
    /// `parent` selects the reparent behavior: [`ParentUpdate::Keep`] for a
    /// pure rename, [`ParentUpdate::Set`] to attach elsewhere (or detach into
    /// a root with `Set(None)`). Path and tree-id changes cascade to every
    /// descendant atomically with this mutation.
    ///
    /// # Errors
    ///
    /// - [`EntityServiceError::InvalidName`]
    /// - [`EntityServiceError::EntityNotFound`] for the target
    /// - [`EntityServiceError::MissingParent`] for the new parent
    /// - [`EntityServiceError::CyclicReference`] if the move would make the
    ///   entity its own ancestor; the tree is left completely unchanged
    /// - [`EntityServiceError::DuplicatePath`]
    pub async fn rename_or_reparent(
        &self,
        id: i64,
        new_name: &str,
        parent: ParentUpdate,
    ) -> Result<Entity, EntityServiceError> {
        validate_name(new_name)?;

        let scope = self.controller.begin(id).await;

        // The store call performs the row write and the descendant cascades
        // in one transaction, so the scope must already be in Propagating
        // when it is issued.
        scope.advance_to_propagating();
        let entity = self.store.rename_or_reparent(id, new_name, parent).await?;

        tracing::debug!(entity_id = id, path = %entity.path, "renamed/reparented entity");
        Ok(entity)
    }

    /// Delete an entity
    ///
    /// The entity's attributes are deleted with it; its children become
    /// orphaned roots (`parent_id` nulled) whose stored paths and tree ids
    /// are left as-is until their own next mutation recomputes them.
    ///
    /// # Errors
    ///
    /// [`EntityServiceError::EntityNotFound`]
    pub async fn delete_entity(&self, id: i64) -> Result<(), EntityServiceError> {
        let _scope = self.controller.begin(id).await;
        self.store.delete_entity(id).await?;
        tracing::debug!(entity_id = id, "deleted entity");
        Ok(())
    }

    /// Fetch a single entity by id; `Ok(None)` when absent
    pub async fn get_entity(&self, id: i64) -> Result<Option<Entity>, EntityServiceError> {
        Ok(self.store.entity_by_id(id).await?)
    }

    /// Fetch the full subtree rooted at the entity with `id`
    ///
    /// `Ok(None)` when the entity does not exist. Takes no locks; a read
    /// racing a cascade sees the fully-old or fully-new subtree.
    pub async fn get_subtree(&self, id: i64) -> Result<Option<EntityTree>, EntityServiceError> {
        let Some(entity) = self.store.entity_by_id(id).await? else {
            return Ok(None);
        };
        self.get_subtree_at_path(&entity.path).await
    }

    /// Fetch the full subtree rooted at a path
    ///
    /// The path is normalized first (stray separators stripped, exactly one
    /// leading separator), so `"Rocket/Stage1/"` addresses
    /// `/Rocket/Stage1`. `Ok(None)` when no entity sits at the path.
    pub async fn get_subtree_at_path(
        &self,
        path: &str,
    ) -> Result<Option<EntityTree>, EntityServiceError> {
        let root_path = normalize(path);
        let rows = self.store.fetch_subtree_rows(&root_path).await?;
        Ok(subtree::assemble(&rows, &root_path))
    }

    /// Create or replace the attribute `key` on an entity
    ///
    /// `value` is the submitted decimal text; its scale is captured as the
    /// precision template so reads reproduce the submission exactly.
    ///
    /// # Errors
    ///
    /// - [`EntityServiceError::InvalidAttributeValue`] for non-decimal input
    /// - [`EntityServiceError::EntityNotFound`]
    pub async fn set_attribute(
        &self,
        entity_id: i64,
        key: &str,
        value: &str,
    ) -> Result<Attribute, EntityServiceError> {
        let parsed = BigDecimal::from_str(value.trim())
            .map_err(|_| EntityServiceError::invalid_attribute_value(value))?;
        let (stored, precision) = write_value(&parsed);

        Ok(self
            .store
            .set_attribute(entity_id, key, &stored, &precision)
            .await?)
    }

    /// Delete an attribute by id
    ///
    /// # Errors
    ///
    /// [`EntityServiceError::AttributeNotFound`]
    pub async fn delete_attribute(&self, id: i64) -> Result<(), EntityServiceError> {
        Ok(self.store.delete_attribute(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::models::SubtreeRow;
    use crate::services::mutation_guard::MutationPhase;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Mutex, OnceLock};

    /// Store stub that records the controller phase it observes while the
    /// cascading call is in flight.
    struct PhaseRecordingStore {
        controller: OnceLock<TreeConsistencyController>,
        observed: Mutex<Option<MutationPhase>>,
    }

    impl PhaseRecordingStore {
        fn new() -> Self {
            Self {
                controller: OnceLock::new(),
                observed: Mutex::new(None),
            }
        }

        fn stub_entity(id: i64, name: &str) -> Entity {
            Entity {
                id,
                name: name.to_string(),
                path: format!("/{name}"),
                parent_id: None,
                tree_id: id,
                created_at: Utc::now(),
                modified_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl EntityStore for PhaseRecordingStore {
        async fn create_entity(
            &self,
            name: &str,
            _parent_id: Option<i64>,
        ) -> Result<Entity, StoreError> {
            Ok(Self::stub_entity(1, name))
        }

        async fn rename_or_reparent(
            &self,
            id: i64,
            new_name: &str,
            _parent: ParentUpdate,
        ) -> Result<Entity, StoreError> {
            *self.observed.lock().unwrap() =
                self.controller.get().and_then(|c| c.phase(id));
            Ok(Self::stub_entity(id, new_name))
        }

        async fn delete_entity(&self, _id: i64) -> Result<(), StoreError> {
            unreachable!()
        }

        async fn entity_by_id(&self, _id: i64) -> Result<Option<Entity>, StoreError> {
            unreachable!()
        }

        async fn ids_at_path(&self, _path: &str) -> Result<Vec<i64>, StoreError> {
            unreachable!()
        }

        async fn fetch_subtree_rows(
            &self,
            _root_path: &str,
        ) -> Result<Vec<SubtreeRow>, StoreError> {
            unreachable!()
        }

        async fn set_attribute(
            &self,
            _entity_id: i64,
            _key: &str,
            _value: &str,
            _precision: &str,
        ) -> Result<Attribute, StoreError> {
            unreachable!()
        }

        async fn delete_attribute(&self, _id: i64) -> Result<(), StoreError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn rename_enters_propagating_before_the_cascading_store_call() {
        let store = Arc::new(PhaseRecordingStore::new());
        let service = EntityService::new(store.clone());
        let _ = store.controller.set(service.controller().clone());

        service
            .rename_or_reparent(7, "Rocket", ParentUpdate::Keep)
            .await
            .unwrap();

        // The cascade-bearing store call ran under Propagating, and the
        // scope was released when the mutation returned.
        assert_eq!(
            *store.observed.lock().unwrap(),
            Some(MutationPhase::Propagating)
        );
        assert!(service.controller().phase(7).is_none());
    }
}
