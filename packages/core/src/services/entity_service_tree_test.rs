//! Integration Tests for Tree Consistency
//!
//! End-to-end scenarios over a real libsql database: path derivation and
//! cascades, tree-id propagation, subtree assembly with quantized
//! attributes, and the full error taxonomy.

#[cfg(test)]
mod tree_consistency_tests {
    use crate::db::{DatabaseService, EntityStore, ParentUpdate, TursoStore};
    use crate::services::{EntityService, EntityServiceError};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper to create a test service over a fresh file-backed database
    async fn create_test_service() -> (EntityService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Arc::new(DatabaseService::new(db_path).await.unwrap());
        let store: Arc<dyn EntityStore> = Arc::new(TursoStore::new(db));
        (EntityService::new(store), temp_dir)
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn create_derives_paths_and_tree_ids() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        assert_eq!(rocket.path, "/Rocket");
        assert_eq!(rocket.tree_id, rocket.id);
        assert!(rocket.is_root());

        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        assert_eq!(stage.path, "/Rocket/Stage1");
        assert_eq!(stage.tree_id, rocket.id);

        let engine = service
            .create_entity("Engine1", Some(stage.id))
            .await
            .unwrap();
        assert_eq!(engine.path, "/Rocket/Stage1/Engine1");
        // tree_id equals the root ancestor's id, transitively.
        assert_eq!(engine.tree_id, rocket.id);
    }

    #[tokio::test]
    async fn rocket_scenario_subtree_with_quantized_attribute() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        let engine = service
            .create_entity("Engine1", Some(stage.id))
            .await
            .unwrap();
        service
            .set_attribute(engine.id, "Thrust", "9.493")
            .await
            .unwrap();

        let tree = service.get_subtree_at_path("/Rocket").await.unwrap().unwrap();
        assert_eq!(tree.name, "Rocket");
        assert_eq!(tree.descendants.len(), 1);
        assert_eq!(tree.descendants[0].name, "Stage1");
        assert_eq!(tree.descendants[0].descendants.len(), 1);

        let engine_node = &tree.descendants[0].descendants[0];
        assert_eq!(engine_node.name, "Engine1");
        assert_eq!(engine_node.properties["Thrust"], dec("9.493"));
    }

    #[tokio::test]
    async fn rename_cascades_to_descendants() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        let engine = service
            .create_entity("Engine1", Some(stage.id))
            .await
            .unwrap();

        let renamed = service
            .rename_or_reparent(stage.id, "StageA", ParentUpdate::Keep)
            .await
            .unwrap();
        assert_eq!(renamed.path, "/Rocket/StageA");

        let tree = service.get_subtree_at_path("/Rocket").await.unwrap().unwrap();
        assert!(tree.find("/Rocket/StageA/Engine1").is_some());
        assert!(tree.find("/Rocket/Stage1").is_none());

        // The old address is gone.
        assert!(service
            .get_subtree_at_path("/Rocket/Stage1")
            .await
            .unwrap()
            .is_none());

        let engine = service.get_entity(engine.id).await.unwrap().unwrap();
        assert_eq!(engine.path, "/Rocket/StageA/Engine1");
    }

    #[tokio::test]
    async fn reparent_rewrites_subtree_prefix_and_tree_id() {
        let (service, _temp) = create_test_service().await;

        // /A/B/C with a leaf under C, and a destination /A/D.
        let a = service.create_entity("A", None).await.unwrap();
        let b = service.create_entity("B", Some(a.id)).await.unwrap();
        let c = service.create_entity("C", Some(b.id)).await.unwrap();
        let e = service.create_entity("E", Some(c.id)).await.unwrap();
        let d = service.create_entity("D", Some(a.id)).await.unwrap();

        let moved = service
            .rename_or_reparent(c.id, "C", ParentUpdate::Set(Some(d.id)))
            .await
            .unwrap();
        assert_eq!(moved.path, "/A/D/C");

        // Every former descendant had its /A/B/C prefix replaced by /A/D/C.
        let e = service.get_entity(e.id).await.unwrap().unwrap();
        assert_eq!(e.path, "/A/D/C/E");
        assert_eq!(e.tree_id, a.id);

        // Nothing outside the moved subtree changed.
        let b = service.get_entity(b.id).await.unwrap().unwrap();
        assert_eq!(b.path, "/A/B");
        let tree = service.get_subtree_at_path("/A/B").await.unwrap().unwrap();
        assert!(tree.descendants.is_empty());
    }

    #[tokio::test]
    async fn reparent_across_trees_repropagates_tree_id() {
        let (service, _temp) = create_test_service().await;

        let rocket_a = service.create_entity("RocketA", None).await.unwrap();
        let rocket_b = service.create_entity("RocketB", None).await.unwrap();
        assert_ne!(rocket_a.tree_id, rocket_b.tree_id);

        let stage = service
            .create_entity("Stage", Some(rocket_a.id))
            .await
            .unwrap();
        let engine = service
            .create_entity("Engine", Some(stage.id))
            .await
            .unwrap();

        service
            .rename_or_reparent(stage.id, "Stage", ParentUpdate::Set(Some(rocket_b.id)))
            .await
            .unwrap();

        // The whole moved subtree now belongs to RocketB's tree.
        let stage = service.get_entity(stage.id).await.unwrap().unwrap();
        let engine = service.get_entity(engine.id).await.unwrap().unwrap();
        assert_eq!(stage.path, "/RocketB/Stage");
        assert_eq!(stage.tree_id, rocket_b.id);
        assert_eq!(engine.path, "/RocketB/Stage/Engine");
        assert_eq!(engine.tree_id, rocket_b.id);

        // Neither subtree fetch leaks nodes from the other tree.
        let tree_a = service.get_subtree_at_path("/RocketA").await.unwrap().unwrap();
        assert!(tree_a.descendants.is_empty());
        let tree_b = service.get_subtree_at_path("/RocketB").await.unwrap().unwrap();
        assert_eq!(tree_b.descendants.len(), 1);
    }

    #[tokio::test]
    async fn detach_into_root_starts_a_new_tree() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        let engine = service
            .create_entity("Engine1", Some(stage.id))
            .await
            .unwrap();

        let detached = service
            .rename_or_reparent(stage.id, "Stage1", ParentUpdate::Set(None))
            .await
            .unwrap();
        assert_eq!(detached.path, "/Stage1");
        assert_eq!(detached.tree_id, stage.id);
        assert!(detached.is_root());

        let engine = service.get_entity(engine.id).await.unwrap().unwrap();
        assert_eq!(engine.path, "/Stage1/Engine1");
        assert_eq!(engine.tree_id, stage.id);
    }

    #[tokio::test]
    async fn cyclic_reparent_is_rejected_and_tree_unchanged() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        let engine = service
            .create_entity("Engine1", Some(stage.id))
            .await
            .unwrap();

        // Under a strict descendant.
        let err = service
            .rename_or_reparent(rocket.id, "Rocket", ParentUpdate::Set(Some(engine.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::CyclicReference { .. }));

        // Under itself.
        let err = service
            .rename_or_reparent(stage.id, "Stage1", ParentUpdate::Set(Some(stage.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::CyclicReference { .. }));

        // Completely unchanged.
        let tree = service.get_subtree_at_path("/Rocket").await.unwrap().unwrap();
        assert!(tree.find("/Rocket/Stage1/Engine1").is_some());
        assert_eq!(tree.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_paths_are_rejected() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();

        // Duplicate root name.
        let err = service.create_entity("Rocket", None).await.unwrap_err();
        assert!(matches!(err, EntityServiceError::DuplicatePath { .. }));

        // Duplicate sibling name.
        let err = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::DuplicatePath { .. }));

        // Rename onto an occupied sibling path.
        let stage2 = service
            .create_entity("Stage2", Some(rocket.id))
            .await
            .unwrap();
        let err = service
            .rename_or_reparent(stage2.id, "Stage1", ParentUpdate::Keep)
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::DuplicatePath { .. }));

        // The failed rename left no partial writes behind.
        let stage2 = service.get_entity(stage2.id).await.unwrap().unwrap();
        assert_eq!(stage2.path, "/Rocket/Stage2");
    }

    #[tokio::test]
    async fn noop_rename_is_accepted() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();

        // Renaming to the current name must not trip the uniqueness probe.
        let unchanged = service
            .rename_or_reparent(stage.id, "Stage1", ParentUpdate::Keep)
            .await
            .unwrap();
        assert_eq!(unchanged.path, "/Rocket/Stage1");
    }

    #[tokio::test]
    async fn missing_references_surface_distinctly() {
        let (service, _temp) = create_test_service().await;

        let err = service.create_entity("Rocket", Some(404)).await.unwrap_err();
        assert!(matches!(
            err,
            EntityServiceError::MissingParent { parent_id: 404 }
        ));

        let err = service
            .rename_or_reparent(404, "Rocket", ParentUpdate::Keep)
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::EntityNotFound { id: 404 }));

        let err = service.delete_entity(404).await.unwrap_err();
        assert!(matches!(err, EntityServiceError::EntityNotFound { id: 404 }));

        let err = service.set_attribute(404, "Thrust", "1").await.unwrap_err();
        assert!(matches!(err, EntityServiceError::EntityNotFound { id: 404 }));

        let err = service.delete_attribute(404).await.unwrap_err();
        assert!(matches!(err, EntityServiceError::AttributeNotFound { id: 404 }));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_before_persistence() {
        let (service, _temp) = create_test_service().await;

        assert!(matches!(
            service.create_entity("", None).await.unwrap_err(),
            EntityServiceError::InvalidName(_)
        ));
        assert!(matches!(
            service.create_entity("a/b", None).await.unwrap_err(),
            EntityServiceError::InvalidName(_)
        ));

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        assert!(matches!(
            service
                .rename_or_reparent(rocket.id, "Roc/ket", ParentUpdate::Keep)
                .await
                .unwrap_err(),
            EntityServiceError::InvalidName(_)
        ));
    }

    #[tokio::test]
    async fn subtree_fetch_is_segment_exact() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        // A textual prefix neighbor that must never leak into /Rocket reads.
        let rocket1 = service.create_entity("Rocket1", None).await.unwrap();
        service
            .create_entity("StageX", Some(rocket1.id))
            .await
            .unwrap();

        let tree = service.get_subtree_at_path("/Rocket").await.unwrap().unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.find("/Rocket1").is_none());
        assert!(tree.find("/Rocket1/StageX").is_none());
    }

    #[tokio::test]
    async fn subtree_lookup_normalizes_paths_and_supports_ids() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();

        // Sloppy path forms address the same subtree.
        for raw in ["Rocket/Stage1", "/Rocket/Stage1/", "Rocket/Stage1/"] {
            let tree = service.get_subtree_at_path(raw).await.unwrap().unwrap();
            assert_eq!(tree.id, stage.id);
        }

        let by_id = service.get_subtree(rocket.id).await.unwrap().unwrap();
        assert_eq!(by_id.len(), 2);

        assert!(service.get_subtree(404).await.unwrap().is_none());
        assert!(service
            .get_subtree_at_path("/Nothing/Here")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn attribute_upsert_replaces_value_and_precision() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let first = service
            .set_attribute(rocket.id, "Thrust", "9.493")
            .await
            .unwrap();
        let second = service
            .set_attribute(rocket.id, "Thrust", "12.5")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.value, "12.5");
        assert_eq!(second.precision, "12.5");

        let tree = service.get_subtree_at_path("/Rocket").await.unwrap().unwrap();
        assert_eq!(tree.properties.len(), 1);
        assert_eq!(tree.properties["Thrust"], dec("12.5"));

        let err = service
            .set_attribute(rocket.id, "Thrust", "not a number")
            .await
            .unwrap_err();
        assert!(matches!(err, EntityServiceError::InvalidAttributeValue { .. }));
    }

    #[tokio::test]
    async fn delete_cascades_attributes_and_orphans_children() {
        let (service, _temp) = create_test_service().await;

        let rocket = service.create_entity("Rocket", None).await.unwrap();
        let stage = service
            .create_entity("Stage1", Some(rocket.id))
            .await
            .unwrap();
        let attr = service
            .set_attribute(rocket.id, "Mass", "540.5")
            .await
            .unwrap();

        service.delete_entity(rocket.id).await.unwrap();

        assert!(service.get_entity(rocket.id).await.unwrap().is_none());
        // The owned attribute went with it.
        let err = service.delete_attribute(attr.id).await.unwrap_err();
        assert!(matches!(err, EntityServiceError::AttributeNotFound { .. }));

        // The child is an orphaned root: parent nulled, stored path stale.
        let orphan = service.get_entity(stage.id).await.unwrap().unwrap();
        assert!(orphan.is_root());
        assert_eq!(orphan.path, "/Rocket/Stage1");

        // Its next save recomputes it as a true root.
        let repaired = service
            .rename_or_reparent(stage.id, "Stage1", ParentUpdate::Keep)
            .await
            .unwrap();
        assert_eq!(repaired.path, "/Stage1");
        assert_eq!(repaired.tree_id, stage.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_mutations_on_disjoint_subtrees_both_commit() {
        let (service, _temp) = create_test_service().await;

        let a = service.create_entity("RocketA", None).await.unwrap();
        let b = service.create_entity("RocketB", None).await.unwrap();
        let stage_a = service.create_entity("Stage", Some(a.id)).await.unwrap();
        let stage_b = service.create_entity("Stage", Some(b.id)).await.unwrap();

        // Concurrent writers on disjoint subtrees queue on the database write
        // lock (busy timeout) rather than failing.
        let task_a = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .rename_or_reparent(stage_a.id, "StageA", ParentUpdate::Keep)
                    .await
            }
        });
        let task_b = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .rename_or_reparent(stage_b.id, "StageB", ParentUpdate::Keep)
                    .await
            }
        });

        assert_eq!(task_a.await.unwrap().unwrap().path, "/RocketA/StageA");
        assert_eq!(task_b.await.unwrap().unwrap().path, "/RocketB/StageB");
    }

    #[tokio::test]
    async fn large_subtree_assembles_in_one_scan() {
        let (service, _temp) = create_test_service().await;

        let root = service.create_entity("Fleet", None).await.unwrap();
        for i in 0..50 {
            let ship = service
                .create_entity(&format!("Ship{i:02}"), Some(root.id))
                .await
                .unwrap();
            for j in 0..10 {
                service
                    .create_entity(&format!("Deck{j}"), Some(ship.id))
                    .await
                    .unwrap();
            }
        }

        let tree = service.get_subtree(root.id).await.unwrap().unwrap();
        assert_eq!(tree.len(), 1 + 50 + 500);
        assert_eq!(tree.descendants.len(), 50);
        assert_eq!(tree.descendants[0].descendants.len(), 10);
    }
}
