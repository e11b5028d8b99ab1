//! Integration tests for the migration engine
//!
//! Runs full migrations against an in-memory store and checks the graph
//! properties the engine guarantees: idempotency, inverse pairs, registry
//! conformance, legacy preservation and rollback.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use relgraph::entities::{EntityCollections, HasRelationships, Note, Session, Task};
use relgraph::migration::{
    migrate_entities, IssueCategory, IssueSeverity, MigrationEngine, MigrationOptions,
    MigrationValidator,
};
use relgraph::relationships::{
    is_bidirectional, validate_relationship_types, EntityType, RelationshipSource,
    RelationshipType,
};
use relgraph::storage::{load_typed, save_typed, KeyValueStore, MemoryStore, StorageKeys};

fn engine(store: &Arc<MemoryStore>) -> MigrationEngine<MemoryStore> {
    MigrationEngine::new(store.clone(), StorageKeys::default())
}

/// A small workspace exercising every legacy field.
fn sample_collections() -> EntityCollections {
    let tasks = vec![
        Task {
            source_note_id: Some("n1".to_string()),
            source_session_id: Some("s1".to_string()),
            ..Task::new("t1")
        },
        Task {
            note_id: Some("n2".to_string()),
            source_note_id: Some("n2".to_string()),
            ..Task::new("t2")
        },
        Task::new("t3"),
    ];
    let notes = vec![
        Note {
            topic_ids: Some(vec!["topic-a".to_string()]),
            company_ids: Some(vec!["acme".to_string()]),
            contact_ids: Some(vec!["alice".to_string()]),
            source_session_id: Some("s1".to_string()),
            ..Note::new("n1")
        },
        Note {
            topic_id: Some("topic-a".to_string()),
            parent_note_id: Some("n1".to_string()),
            ..Note::new("n2")
        },
    ];
    let sessions = vec![Session {
        extracted_task_ids: Some(vec!["t1".to_string()]),
        extracted_note_ids: Some(vec!["n1".to_string(), "n2".to_string()]),
        ..Session::new("s1")
    }];
    EntityCollections::new(tasks, notes, sessions)
}

fn all_relationships(
    collections: &EntityCollections,
) -> Vec<&relgraph::relationships::Relationship> {
    collections
        .iter()
        .flat_map(|e| e.relationships().iter())
        .collect()
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_task_with_source_note_gets_pair() {
        let task = Task {
            source_note_id: Some("n1".to_string()),
            ..Task::new("t1")
        };
        let mut collections = EntityCollections::new(vec![task], vec![Note::new("n1")], vec![]);

        let summary = migrate_entities(&mut collections, &MigrationOptions::default());
        assert!(summary.errors.is_empty());
        assert_eq!(summary.relationships_created, 2);

        let task_rels = &collections.tasks[0].relationships;
        assert_eq!(task_rels.len(), 1);
        assert_eq!(task_rels[0].relationship_type, RelationshipType::TaskNote);
        assert_eq!(task_rels[0].source_id, "t1");
        assert_eq!(task_rels[0].target_id, "n1");
        assert!(task_rels[0].canonical);
        assert_eq!(task_rels[0].metadata.source, RelationshipSource::Migration);

        let note_rels = &collections.notes[0].relationships;
        assert_eq!(note_rels.len(), 1);
        assert_eq!(note_rels[0].relationship_type, RelationshipType::TaskNote);
        assert_eq!(note_rels[0].source_id, "n1");
        assert_eq!(note_rels[0].target_id, "t1");
        assert!(!note_rels[0].canonical);
        assert_eq!(note_rels[0].metadata.source, RelationshipSource::Migration);

        assert_eq!(collections.tasks[0].relationship_version, Some(1));
        assert_eq!(collections.notes[0].relationship_version, Some(1));
    }

    #[test]
    fn test_unidirectional_types_get_no_inverse() {
        let note = Note {
            topic_ids: Some(vec!["topic-a".to_string()]),
            parent_note_id: Some("n0".to_string()),
            ..Note::new("n1")
        };
        let mut collections =
            EntityCollections::new(vec![], vec![Note::new("n0"), note], vec![]);

        migrate_entities(&mut collections, &MigrationOptions::default());

        assert!(collections.notes[0].relationships.is_empty());
        assert_eq!(collections.notes[1].relationships.len(), 2);
        assert!(collections.notes[1].relationships.iter().all(|r| r.canonical));
    }

    #[test]
    fn test_link_recorded_on_both_sides_yields_one_pair() {
        let mut collections = sample_collections();
        migrate_entities(&mut collections, &MigrationOptions::default());

        let t1_session: Vec<_> = collections.tasks[0]
            .relationships
            .iter()
            .filter(|r| r.relationship_type == RelationshipType::TaskSession)
            .collect();
        assert_eq!(t1_session.len(), 1);
        assert!(t1_session[0].canonical);

        let s1_to_t1: Vec<_> = collections.sessions[0]
            .relationships
            .iter()
            .filter(|r| r.target_id == "t1")
            .collect();
        assert_eq!(s1_to_t1.len(), 1);
        assert!(!s1_to_t1[0].canonical);
    }

    #[test]
    fn test_missing_target_keeps_edge_and_warns() {
        let task = Task {
            source_note_id: Some("n-deleted".to_string()),
            ..Task::new("t1")
        };
        let mut collections = EntityCollections::new(vec![task], vec![], vec![]);

        let summary = migrate_entities(&mut collections, &MigrationOptions::default());

        assert!(summary.errors.is_empty());
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("n-deleted"));
        assert_eq!(collections.tasks[0].relationships.len(), 1);
    }

    #[test]
    fn test_failed_entity_is_kept_unchanged() {
        let broken = Task {
            note_id: Some(String::new()),
            source_session_id: Some("s1".to_string()),
            ..Task::new("t-broken")
        };
        let fine = Task {
            source_session_id: Some("s1".to_string()),
            ..Task::new("t-fine")
        };
        let mut collections = EntityCollections::new(
            vec![broken.clone(), fine],
            vec![],
            vec![Session::new("s1")],
        );

        let summary = migrate_entities(&mut collections, &MigrationOptions::default());

        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("task:t-broken"));
        assert_eq!(collections.tasks[0], broken);
        assert!(collections.tasks[1].is_migrated());
        assert_eq!(summary.migrated_count, 2);
        assert_eq!(collections.sessions[0].relationships.len(), 1);
    }

    #[test]
    fn test_failed_target_receives_no_inverse() {
        let task = Task {
            note_id: Some("n1".to_string()),
            ..Task::new("t1")
        };
        let broken = Note {
            parent_note_id: Some(String::new()),
            ..Note::new("n1")
        };
        let mut collections =
            EntityCollections::new(vec![task], vec![broken.clone()], vec![]);

        let summary = migrate_entities(&mut collections, &MigrationOptions::default());

        assert_eq!(collections.notes[0], broken);
        assert!(!collections.notes[0].is_migrated());
        assert!(collections.tasks[0].is_migrated());
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("note:n1"));
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("failed to migrate"));
    }

    #[test]
    fn test_progress_reported_at_stage_boundaries() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = MigrationOptions::default().with_progress(move |message, percent| {
            sink.lock().unwrap().push((message.to_string(), percent));
        });

        let mut collections = sample_collections();
        migrate_entities(&mut collections, &options);

        let percents: Vec<u8> = seen.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(percents, vec![20, 45, 70]);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_second_run_skips_everything() {
        let mut collections = sample_collections();
        let first = migrate_entities(&mut collections, &MigrationOptions::default());
        assert_eq!(first.migrated_count, collections.len());

        let snapshot = collections.clone();
        let second = migrate_entities(&mut collections, &MigrationOptions::default());

        assert_eq!(second.skipped_count, collections.len());
        assert_eq!(second.migrated_count, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(collections, snapshot);
    }

    #[test]
    fn test_every_canonical_bidirectional_edge_has_one_inverse() {
        let mut collections = sample_collections();
        migrate_entities(&mut collections, &MigrationOptions::default());
        let relationships = all_relationships(&collections);

        let mut checked = 0;
        for r in relationships
            .iter()
            .filter(|r| r.canonical && is_bidirectional(r.relationship_type))
        {
            let inverses = relationships
                .iter()
                .filter(|other| {
                    other.source_id == r.target_id
                        && other.target_id == r.source_id
                        && other.relationship_type == r.relationship_type
                        && !other.canonical
                })
                .count();
            assert_eq!(inverses, 1, "relationship {:?}", r);
            checked += 1;
        }
        assert!(checked >= 5);
    }

    #[test]
    fn test_every_edge_conforms_to_registry() {
        let mut collections = sample_collections();
        migrate_entities(&mut collections, &MigrationOptions::default());

        for r in all_relationships(&collections) {
            assert!(validate_relationship_types(
                r.relationship_type,
                r.source_type,
                r.target_type
            ));
        }
    }

    #[test]
    fn test_legacy_fields_are_preserved() {
        let original = sample_collections();
        let mut collections = original.clone();
        migrate_entities(&mut collections, &MigrationOptions::default());

        for (before, after) in original.tasks.iter().zip(&collections.tasks) {
            assert_eq!(before.note_id, after.note_id);
            assert_eq!(before.source_note_id, after.source_note_id);
            assert_eq!(before.source_session_id, after.source_session_id);
        }
        for (before, after) in original.notes.iter().zip(&collections.notes) {
            assert_eq!(before.topic_id, after.topic_id);
            assert_eq!(before.topic_ids, after.topic_ids);
            assert_eq!(before.company_ids, after.company_ids);
            assert_eq!(before.contact_ids, after.contact_ids);
            assert_eq!(before.source_session_id, after.source_session_id);
            assert_eq!(before.parent_note_id, after.parent_note_id);
        }
        for (before, after) in original.sessions.iter().zip(&collections.sessions) {
            assert_eq!(before.extracted_task_ids, after.extracted_task_ids);
            assert_eq!(before.extracted_note_ids, after.extracted_note_ids);
        }
    }

    #[test]
    fn test_migrated_graph_passes_post_validation() {
        let mut collections = sample_collections();
        migrate_entities(&mut collections, &MigrationOptions::default());

        let report = MigrationValidator::new()
            .with_known_entities(EntityType::Topic, ["topic-a"])
            .with_known_entities(EntityType::Company, ["acme"])
            .with_known_entities(EntityType::Contact, ["alice"])
            .post_validate(&collections);

        assert!(report.data_preserved);
        assert!(report.relationships_valid);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.statistics.migrated_entities, collections.len());
        assert_eq!(report.statistics.orphaned_references_removed, 0);
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_migrate_persists_backup_collections_and_status() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let mut collections = sample_collections();

        let result = engine
            .migrate(&mut collections, &MigrationOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert!(!result.dry_run);
        assert_eq!(result.migrated_count, 6);
        let backup_key = result.backup_path.clone().unwrap();
        assert!(backup_key.starts_with("relationship-backup-"));
        assert!(!backup_key.contains(':'));

        let stored: Vec<Task> = load_typed(store.as_ref(), "tasks").await.unwrap().unwrap();
        assert_eq!(stored, collections.tasks);

        let status = engine.status().await.unwrap().unwrap();
        assert!(status.completed);
        assert_eq!(status.version, 1);
        assert_eq!(status.backup_key, Some(backup_key));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let mut collections = sample_collections();
        let original = collections.clone();

        let result = engine
            .migrate(&mut collections, &MigrationOptions::dry_run())
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.migrated_count, 6);
        assert!(result.relationships_created > 0);
        assert_eq!(collections, original);
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_wet_run_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let mut collections = sample_collections();

        engine
            .migrate(&mut collections, &MigrationOptions::default())
            .await
            .unwrap();
        let after_first = collections.clone();

        let second = engine
            .migrate(&mut collections, &MigrationOptions::default())
            .await
            .unwrap();

        assert_eq!(second.skipped_count, after_first.len());
        assert_eq!(second.migrated_count, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(collections, after_first);
    }

    #[tokio::test]
    async fn test_rollback_restores_original_collections() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let original = sample_collections();
        original.save(store.as_ref(), engine.keys()).await.unwrap();

        let result = engine
            .migrate_from_store(&MigrationOptions::default())
            .await
            .unwrap();
        let backup_key = result.backup_path.unwrap();
        assert!(engine.status().await.unwrap().is_some());

        assert!(engine.rollback(&backup_key).await.unwrap());

        let restored = engine.load_collections().await.unwrap();
        assert_eq!(restored, original);
        assert!(restored.iter().all(|e| e.relationships().is_empty()));
        assert!(restored.iter().all(|e| e.relationship_version().is_none()));
        assert!(engine.status().await.unwrap().is_none());

        let raw = store.load("tasks").await.unwrap().unwrap();
        assert!(raw[0].get("relationships").is_none());
        assert!(raw[0].get("relationshipVersion").is_none());
    }

    #[tokio::test]
    async fn test_rollback_unknown_key() {
        let store = Arc::new(MemoryStore::new());
        assert!(!engine(&store)
            .rollback("relationship-backup-missing")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_migrate_from_store_preserves_unknown_fields() {
        let store = Arc::new(MemoryStore::new());
        save_typed(
            store.as_ref(),
            "tasks",
            &json!([{ "id": "t1", "title": "Ship it", "sourceNoteId": "n1", "priority": 2 }]),
        )
        .await
        .unwrap();
        save_typed(store.as_ref(), "notes", &json!([{ "id": "n1", "content": "draft" }]))
            .await
            .unwrap();

        let result = engine(&store)
            .migrate_from_store(&MigrationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.migrated_count, 2);

        let raw = store.load("tasks").await.unwrap().unwrap();
        assert_eq!(raw[0]["title"], "Ship it");
        assert_eq!(raw[0]["priority"], 2);
        assert_eq!(raw[0]["sourceNoteId"], "n1");
        assert_eq!(raw[0]["relationshipVersion"], 1);
        assert_eq!(raw[0]["relationships"][0]["type"], "task-note");

        let sessions = store.load("sessions").await.unwrap().unwrap();
        assert_eq!(sessions, json!([]));
    }

    #[tokio::test]
    async fn test_explicit_nulls_survive_migration_and_rollback() {
        let store = Arc::new(MemoryStore::new());
        let tasks = json!([{ "id": "t1", "noteId": null, "relationships": [], "sourceNoteId": "n1" }]);
        let notes = json!([{ "id": "n1", "topicId": null }]);
        store.save("tasks", &tasks).await.unwrap();
        store.save("notes", &notes).await.unwrap();
        let engine = engine(&store);

        let result = engine
            .migrate_from_store(&MigrationOptions::default())
            .await
            .unwrap();
        let backup_key = result.backup_path.unwrap();

        let migrated = store.load("tasks").await.unwrap().unwrap();
        assert_eq!(migrated[0]["noteId"], serde_json::Value::Null);
        assert!(migrated[0].as_object().unwrap().contains_key("noteId"));
        assert_eq!(migrated[0]["relationshipVersion"], 1);
        assert_eq!(migrated[0]["relationships"][0]["type"], "task-note");
        let migrated_notes = store.load("notes").await.unwrap().unwrap();
        assert!(migrated_notes[0].as_object().unwrap().contains_key("topicId"));

        let backup = store.load(&backup_key).await.unwrap().unwrap();
        assert_eq!(backup["tasks"], tasks);
        assert_eq!(backup["notes"], notes);
        assert!(backup.get("sessions").is_none());

        assert!(engine.rollback(&backup_key).await.unwrap());
        assert_eq!(store.load("tasks").await.unwrap(), Some(tasks));
        assert_eq!(store.load("notes").await.unwrap(), Some(notes));
        assert_eq!(store.load("sessions").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_string_ids_are_reported_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let tasks = json!([{ "id": 42, "sourceNoteId": "n1" }, { "id": "t2" }]);
        store.save("tasks", &tasks).await.unwrap();
        let engine = engine(&store);

        let collections = engine.load_collections().await.unwrap();
        assert_eq!(collections.tasks.len(), 2);
        assert_eq!(collections.tasks[0].id, "");

        let report = MigrationValidator::new().pre_validate(&collections);
        assert!(!report.can_proceed);
        let structural: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error && i.category == IssueCategory::Structure)
            .collect();
        assert_eq!(structural.len(), 1);
        assert!(structural[0].message.contains("index 0"));

        let result = engine
            .migrate_from_store(&MigrationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        let raw = store.load("tasks").await.unwrap().unwrap();
        assert_eq!(raw[0], tasks[0]);
        assert_eq!(raw[1]["relationshipVersion"], 1);
    }

    #[tokio::test]
    async fn test_progress_covers_full_run() {
        let store = Arc::new(MemoryStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = MigrationOptions::default()
            .with_progress(move |_, percent| sink.lock().unwrap().push(percent));

        let mut collections = sample_collections();
        engine(&store).migrate(&mut collections, &options).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 10, 20, 45, 70, 90, 100]);
    }
}
