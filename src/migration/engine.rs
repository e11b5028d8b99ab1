use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{MigrationBackup, MigrationOptions, MigrationResult, MigrationStatus};
use crate::entities::{
    EntityCollections, EntityKey, HasRelationships, StoredCollections,
    CURRENT_RELATIONSHIP_VERSION,
};
use crate::error::{AppError, AppResult, RelationshipError, RelationshipResult};
use crate::relationships::{is_bidirectional, EntityType, Relationship, RelationshipMetadata};
use crate::storage::{load_typed, save_typed, KeyValueStore, StorageKeys};

/// Counters and messages produced by the in-memory transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationSummary {
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MigrationSummary {
    fn into_result(self, backup_path: Option<String>, dry_run: bool) -> MigrationResult {
        MigrationResult {
            success: self.errors.is_empty(),
            migrated_count: self.migrated_count,
            skipped_count: self.skipped_count,
            relationships_created: self.relationships_created,
            errors: self.errors,
            warnings: self.warnings,
            backup_path,
            dry_run,
        }
    }
}

/// Turn legacy fields into relationships, in place.
///
/// Entities are visited tasks, notes, sessions, each in array order.
/// Already-migrated entities are skipped. An entity that fails is left
/// exactly as it was and the failure is recorded; the rest still migrate.
/// Inverses of bidirectional edges are queued and appended to their target
/// entity, which may live in another collection, once every entity's
/// outcome is known. Targets that failed never receive one.
pub fn migrate_entities(
    collections: &mut EntityCollections,
    options: &MigrationOptions,
) -> MigrationSummary {
    let now = Utc::now();
    let mut run = MigrationRun::default();

    let stages = [
        (EntityType::Task, "Migrating tasks", 20),
        (EntityType::Note, "Migrating notes", 45),
        (EntityType::Session, "Migrating sessions", 70),
    ];
    for (entity_type, message, percent) in stages {
        options.report(message, percent);
        migrate_collection(collections, entity_type, now, options.verbose, &mut run);
    }

    let MigrationRun {
        mut summary,
        pending_inverses,
        failed,
    } = run;
    for inverse in pending_inverses {
        attach_inverse(collections, inverse, &failed, &mut summary);
    }

    summary
}

#[derive(Default)]
struct MigrationRun {
    summary: MigrationSummary,
    pending_inverses: Vec<Relationship>,
    failed: HashSet<EntityKey>,
}

impl MigrationRun {
    /// Whether an inverse already queued for `owner` covers this edge.
    fn has_pending(&self, owner: &EntityKey, relationship: &Relationship) -> bool {
        self.pending_inverses.iter().any(|inverse| {
            inverse.source_type == owner.entity_type
                && inverse.source_id == owner.id
                && inverse.points_to(
                    relationship.relationship_type,
                    relationship.target_type,
                    &relationship.target_id,
                )
        })
    }
}

fn migrate_collection(
    collections: &mut EntityCollections,
    entity_type: EntityType,
    now: DateTime<Utc>,
    verbose: bool,
    run: &mut MigrationRun,
) {
    for position in 0..collections.len_of(entity_type) {
        let Some(entity) = collections.get(entity_type, position) else {
            continue;
        };
        if entity.is_migrated() {
            run.summary.skipped_count += 1;
            continue;
        }

        let key = entity.key();
        let planned = match plan_relationships(entity, now) {
            Ok(planned) => planned,
            Err(e) => {
                warn!(entity = %key, error = %e, "Entity migration failed, keeping original");
                run.summary
                    .errors
                    .push(format!("Failed to migrate {}: {}", key, e));
                run.failed.insert(key);
                continue;
            }
        };

        let planned: Vec<Relationship> = planned
            .into_iter()
            .filter(|relationship| !run.has_pending(&key, relationship))
            .collect();

        let mut created = Vec::new();
        if let Some(owner) = collections.get_mut(entity_type, position) {
            for relationship in planned {
                if owner.has_relationship_to(
                    relationship.relationship_type,
                    relationship.target_type,
                    &relationship.target_id,
                ) {
                    continue;
                }
                owner.relationships_mut().push(relationship.clone());
                created.push(relationship);
            }
            owner.set_relationship_version(Some(CURRENT_RELATIONSHIP_VERSION));
        }

        run.summary.migrated_count += 1;
        run.summary.relationships_created += created.len();

        for relationship in created {
            if verbose {
                info!(
                    entity = %key,
                    relationship_type = %relationship.relationship_type,
                    target = %relationship.target_id,
                    "Created relationship"
                );
            } else {
                debug!(
                    entity = %key,
                    relationship_type = %relationship.relationship_type,
                    target = %relationship.target_id,
                    "Created relationship"
                );
            }
            if is_bidirectional(relationship.relationship_type) {
                run.pending_inverses.push(relationship.inverse());
            }
        }
    }
}

/// Build the canonical edges for one entity without touching it.
fn plan_relationships(
    entity: &dyn HasRelationships,
    now: DateTime<Utc>,
) -> RelationshipResult<Vec<Relationship>> {
    if entity.id().trim().is_empty() {
        return Err(RelationshipError::validation(format!(
            "{} has no id",
            entity.entity_type()
        )));
    }

    let mut planned = Vec::new();
    for reference in entity.legacy_references() {
        if reference.target_id.trim().is_empty() {
            return Err(RelationshipError::validation(format!(
                "legacy field {} holds an empty id",
                reference.field
            )));
        }
        if reference.target_type == entity.entity_type() && reference.target_id == entity.id() {
            return Err(RelationshipError::validation(format!(
                "legacy field {} references the entity itself",
                reference.field
            )));
        }

        let metadata = RelationshipMetadata::migration(now)
            .with_extra(json!({ "legacyField": reference.field }));
        planned.push(Relationship::new(
            reference.relationship_type,
            entity.entity_type(),
            entity.id(),
            reference.target_type,
            reference.target_id.clone(),
            metadata,
        )?);
    }
    Ok(planned)
}

fn attach_inverse(
    collections: &mut EntityCollections,
    inverse: Relationship,
    failed: &HashSet<EntityKey>,
    summary: &mut MigrationSummary,
) {
    let target = EntityKey::new(inverse.source_type, inverse.source_id.clone());
    let edge = format!(
        "{} {}:{} -> {}",
        inverse.relationship_type, inverse.target_type, inverse.target_id, target
    );

    if failed.contains(&target) {
        summary.warnings.push(format!(
            "{} targets an entity that failed to migrate; inverse not created",
            edge
        ));
        return;
    }
    let Some(owner) = collections.find_mut(target.entity_type, &target.id) else {
        summary.warnings.push(format!(
            "{} targets a missing entity; inverse not created",
            edge
        ));
        return;
    };

    if owner.has_relationship_to(
        inverse.relationship_type,
        inverse.target_type,
        &inverse.target_id,
    ) {
        return;
    }
    owner.relationships_mut().push(inverse);
    summary.relationships_created += 1;
}

/// Runs migrations against a [`KeyValueStore`], with backup and rollback.
pub struct MigrationEngine<S: KeyValueStore> {
    store: Arc<S>,
    keys: StorageKeys,
}

impl<S: KeyValueStore> MigrationEngine<S> {
    pub fn new(store: Arc<S>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Load the three live collections.
    pub async fn load_collections(&self) -> AppResult<EntityCollections> {
        Ok(EntityCollections::load(self.store.as_ref(), &self.keys).await?)
    }

    /// Load the live collections, migrate them and persist the result.
    pub async fn migrate_from_store(&self, options: &MigrationOptions) -> AppResult<MigrationResult> {
        let mut collections = self.load_collections().await?;
        self.migrate(&mut collections, options).await
    }

    /// Migrate `collections`.
    ///
    /// Writes happen in a fixed order: backup, collections, status marker.
    /// A failed backup aborts before anything else is written. Dry runs
    /// leave both `collections` and the store untouched.
    pub async fn migrate(
        &self,
        collections: &mut EntityCollections,
        options: &MigrationOptions,
    ) -> AppResult<MigrationResult> {
        info!(
            entities = collections.len(),
            dry_run = options.dry_run,
            "Starting relationship migration"
        );
        options.report("Starting relationship migration", 0);

        let stored = if options.dry_run {
            None
        } else {
            options.report("Creating backup", 10);
            let stored = StoredCollections::load(self.store.as_ref(), &self.keys).await?;
            let backup_path = self.create_backup(&stored, Utc::now()).await?;
            Some((stored, backup_path))
        };
        let backup_path = stored.as_ref().map(|(_, key)| key.clone());

        let mut working = collections.clone();
        let summary = migrate_entities(&mut working, options);

        if let Some((stored, backup_path)) = &stored {
            options.report("Saving migrated data", 90);
            working
                .save_over(collections, stored, self.store.as_ref(), &self.keys)
                .await
                .map_err(|e| {
                    error!(error = %e, backup = %backup_path, "Failed to save migrated collections");
                    AppError::Migration {
                        message: format!(
                            "failed to save migrated collections ({}); roll back with backup {}",
                            e, backup_path
                        ),
                    }
                })?;

            let status = MigrationStatus {
                completed: true,
                version: CURRENT_RELATIONSHIP_VERSION,
                completed_at: Utc::now(),
                migrated_count: summary.migrated_count,
                backup_key: Some(backup_path.clone()),
            };
            save_typed(
                self.store.as_ref(),
                &self.keys.status_key(CURRENT_RELATIONSHIP_VERSION),
                &status,
            )
            .await?;

            *collections = working;
        }

        options.report("Migration complete", 100);
        let result = summary.into_result(backup_path, options.dry_run);
        info!(
            migrated = result.migrated_count,
            skipped = result.skipped_count,
            relationships = result.relationships_created,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            dry_run = result.dry_run,
            "Relationship migration finished"
        );
        Ok(result)
    }

    /// Write the stored collections, as raw JSON, under a fresh backup key.
    ///
    /// An existing key is never overwritten; a numeric suffix is added until
    /// the key is free.
    async fn create_backup(
        &self,
        stored: &StoredCollections,
        created_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let base = self.keys.backup_key(created_at);
        let mut key = base.clone();
        let mut attempt = 1;
        while self.store.load(&key).await?.is_some() {
            attempt += 1;
            key = format!("{}-{}", base, attempt);
        }

        let backup = MigrationBackup {
            created_at,
            version: CURRENT_RELATIONSHIP_VERSION,
            collections: stored.clone(),
        };

        save_typed(self.store.as_ref(), &key, &backup)
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "Backup failed, aborting migration");
                AppError::Migration {
                    message: format!("backup to '{}' failed, no data was modified: {}", key, e),
                }
            })?;

        info!(key = %key, "Backup created");
        Ok(key)
    }

    /// Put the collection keys back exactly as the backup captured them and
    /// clear the status marker.
    ///
    /// Returns `Ok(false)` when no backup exists under `backup_key`.
    pub async fn rollback(&self, backup_key: &str) -> AppResult<bool> {
        let Some(backup) =
            load_typed::<_, MigrationBackup>(self.store.as_ref(), backup_key).await?
        else {
            warn!(key = backup_key, "Backup not found, nothing rolled back");
            return Ok(false);
        };

        backup
            .collections
            .restore(self.store.as_ref(), &self.keys)
            .await?;
        self.store
            .delete(&self.keys.status_key(CURRENT_RELATIONSHIP_VERSION))
            .await?;

        info!(key = backup_key, "Rolled back relationship migration");
        Ok(true)
    }

    /// The persisted completion marker, if a migration has completed.
    pub async fn status(&self) -> AppResult<Option<MigrationStatus>> {
        Ok(load_typed(
            self.store.as_ref(),
            &self.keys.status_key(CURRENT_RELATIONSHIP_VERSION),
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Note, Task};
    use crate::error::StorageError;
    use crate::storage::{MemoryStore, MockKeyValueStore};

    fn linked_pair() -> EntityCollections {
        let task = Task {
            source_note_id: Some("n1".to_string()),
            ..Task::new("t1")
        };
        EntityCollections::new(vec![task], vec![Note::new("n1")], vec![])
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_before_any_write() {
        let mut store = MockKeyValueStore::new();
        store.expect_load().returning(|_| Ok(None));
        store
            .expect_save()
            .withf(|key, _| key.starts_with("relationship-backup-"))
            .times(1)
            .returning(|_, _| {
                Err(StorageError::Query {
                    message: "disk full".to_string(),
                })
            });

        let engine = MigrationEngine::new(Arc::new(store), StorageKeys::default());
        let mut collections = linked_pair();
        let original = collections.clone();

        let err = engine
            .migrate(&mut collections, &MigrationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Migration { .. }));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(collections, original);
    }

    #[tokio::test]
    async fn test_dry_run_touches_no_storage() {
        let store = MockKeyValueStore::new();
        let engine = MigrationEngine::new(Arc::new(store), StorageKeys::default());
        let mut collections = linked_pair();

        let result = engine
            .migrate(&mut collections, &MigrationOptions::dry_run())
            .await
            .unwrap();

        assert!(result.dry_run);
        assert!(result.backup_path.is_none());
        assert_eq!(result.migrated_count, 2);
        assert!(collections.tasks[0].relationships.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_missing_backup_returns_false() {
        let mut store = MockKeyValueStore::new();
        store.expect_load().times(1).returning(|_| Ok(None));
        store.expect_delete().never();

        let engine = MigrationEngine::new(Arc::new(store), StorageKeys::default());
        assert!(!engine.rollback("relationship-backup-unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_backup_never_overwrites_existing_key() {
        let store = Arc::new(MemoryStore::new());
        let engine = MigrationEngine::new(store.clone(), StorageKeys::default());
        let stored = StoredCollections {
            tasks: Some(json!([{ "id": "t1" }])),
            ..StoredCollections::default()
        };
        let at = Utc::now();

        let first = engine.create_backup(&stored, at).await.unwrap();
        let second = engine.create_backup(&stored, at).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(second, format!("{}-2", first));
        assert!(store.load(&first).await.unwrap().is_some());
        assert!(store.load(&second).await.unwrap().is_some());
    }

    #[test]
    fn test_inverse_skipped_for_failed_target() {
        let task = Task {
            note_id: Some("n1".to_string()),
            ..Task::new("t1")
        };
        let broken = Note {
            parent_note_id: Some(String::new()),
            ..Note::new("n1")
        };
        let mut collections = EntityCollections::new(vec![task], vec![broken.clone()], vec![]);

        let summary = migrate_entities(&mut collections, &MigrationOptions::default());

        assert_eq!(collections.notes[0], broken);
        assert_eq!(collections.tasks[0].relationships.len(), 1);
        assert_eq!(summary.migrated_count, 1);
        assert_eq!(summary.relationships_created, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary
            .warnings
            .iter()
            .any(|w| w.contains("failed to migrate") && w.contains("note:n1")));
    }

    #[test]
    fn test_plan_rejects_self_parent() {
        let note = Note {
            parent_note_id: Some("n1".to_string()),
            ..Note::new("n1")
        };
        let err = plan_relationships(&note, Utc::now()).unwrap_err();
        assert_eq!(err.code(), RelationshipError::VALIDATION_ERROR);
        assert!(err.message().contains("parentNoteId"));
    }

    #[test]
    fn test_plan_records_legacy_field() {
        let task = Task {
            source_session_id: Some("s1".to_string()),
            ..Task::new("t1")
        };
        let planned = plan_relationships(&task, Utc::now()).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(
            planned[0].metadata.extra,
            Some(json!({ "legacyField": "sourceSessionId" }))
        );
    }
}
