//! Read-only checks run before and after a migration.
//!
//! Neither pass fails: every finding becomes a [`ValidationIssue`] and the
//! caller acts on the boolean gates.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{has_error_in, IssueCategory, ValidationIssue};
use crate::entities::{EntityCollections, EntityKey, HasRelationships};
use crate::relationships::{config, EntityType, Relationship, RelationshipType};

/// Rough throughput used for duration estimates.
const ENTITIES_PER_SECOND: u64 = 100;
/// Fixed overhead of a run (backup and saves).
const BASE_DURATION_MS: u64 = 1000;
/// Above this many entities the caller should show progress.
const PROGRESS_UI_THRESHOLD: usize = 100;

/// Result of [`MigrationValidator::pre_validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreMigrationValidation {
    /// False when any issue is an error.
    pub can_proceed: bool,
    pub issues: Vec<ValidationIssue>,
    pub statistics: PreMigrationStatistics,
    pub performance: PerformanceEstimate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreMigrationStatistics {
    pub total_entities: usize,
    pub tasks: usize,
    pub notes: usize,
    pub sessions: usize,
    pub already_migrated: usize,
    /// Unmigrated entities with at least one legacy reference.
    pub eligible_for_migration: usize,
    /// One per distinct legacy reference; inverses are not counted.
    pub estimated_relationships: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEstimate {
    pub entity_count: usize,
    pub estimated_duration_ms: u64,
    pub show_progress_ui: bool,
}

impl PerformanceEstimate {
    /// Linear model: fixed overhead plus ~100 entities per second.
    pub fn for_entities(entity_count: usize) -> Self {
        Self {
            entity_count,
            estimated_duration_ms: BASE_DURATION_MS
                + entity_count as u64 * 1000 / ENTITIES_PER_SECOND,
            show_progress_ui: entity_count > PROGRESS_UI_THRESHOLD,
        }
    }
}

/// Result of [`MigrationValidator::post_validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMigrationValidation {
    /// False when any integrity issue is an error.
    pub data_preserved: bool,
    /// False when any consistency issue is an error.
    pub relationships_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub statistics: PostMigrationStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMigrationStatistics {
    pub total_entities: usize,
    pub migrated_entities: usize,
    pub total_relationships: usize,
    pub invalid_relationships: usize,
    /// Canonical bidirectional edges whose inverse was found.
    pub bidirectional_pairs_validated: usize,
    /// Orphaned edges found; the caller is expected to remove them.
    pub orphaned_references_removed: usize,
}

/// Pre- and post-migration checks over in-memory collections.
#[derive(Debug, Clone)]
pub struct MigrationValidator {
    known_entities: HashSet<EntityKey>,
    resolvable_types: HashSet<EntityType>,
}

impl Default for MigrationValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationValidator {
    pub fn new() -> Self {
        Self {
            known_entities: HashSet::new(),
            resolvable_types: EntityCollections::LOCAL_TYPES.into_iter().collect(),
        }
    }

    /// Register ids of an entity type stored outside the three collections
    /// (topics, companies, contacts) so orphan detection can check them.
    pub fn with_known_entities<I, T>(mut self, entity_type: EntityType, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resolvable_types.insert(entity_type);
        self.known_entities
            .extend(ids.into_iter().map(|id| EntityKey::new(entity_type, id)));
        self
    }

    /// Structural checks and estimates before migrating.
    pub fn pre_validate(&self, collections: &EntityCollections) -> PreMigrationValidation {
        let mut issues = Vec::new();

        for entity_type in EntityCollections::LOCAL_TYPES {
            check_ids(collections, entity_type, &mut issues);
        }

        let mut statistics = PreMigrationStatistics {
            total_entities: collections.len(),
            tasks: collections.tasks.len(),
            notes: collections.notes.len(),
            sessions: collections.sessions.len(),
            ..PreMigrationStatistics::default()
        };

        for entity in collections.iter() {
            if entity.is_migrated() {
                statistics.already_migrated += 1;
                continue;
            }
            let references = entity.legacy_references();
            if references.is_empty() {
                continue;
            }
            statistics.eligible_for_migration += 1;
            for reference in &references {
                if reference.target_id.trim().is_empty() {
                    issues.push(
                        ValidationIssue::warning(
                            IssueCategory::Structure,
                            format!(
                                "Legacy field {} on {} holds an empty id; the entity will stay unmigrated",
                                reference.field,
                                entity.key()
                            ),
                        )
                        .for_entity(&entity.key())
                        .suggest(format!("Clear or correct {}", reference.field)),
                    );
                } else {
                    statistics.estimated_relationships += 1;
                }
            }
        }

        if statistics.eligible_for_migration == 0 {
            issues.push(ValidationIssue::info(
                IssueCategory::Structure,
                "No entities need migration",
            ));
        }

        let performance = PerformanceEstimate::for_entities(statistics.total_entities);
        if performance.show_progress_ui {
            issues.push(
                ValidationIssue::info(
                    IssueCategory::Performance,
                    format!(
                        "Migrating {} entities takes about {} ms",
                        performance.entity_count, performance.estimated_duration_ms
                    ),
                )
                .suggest("Show a progress indicator while migrating"),
            );
        }

        PreMigrationValidation {
            can_proceed: !issues.iter().any(ValidationIssue::is_error),
            issues,
            statistics,
            performance,
        }
    }

    /// Certify a migrated graph: completeness, edge validity, bidirectional
    /// pairs and orphans.
    pub fn post_validate(&self, collections: &EntityCollections) -> PostMigrationValidation {
        let mut issues = Vec::new();
        let mut statistics = PostMigrationStatistics {
            total_entities: collections.len(),
            ..PostMigrationStatistics::default()
        };

        let mut existing = collections.entity_keys();
        existing.extend(self.known_entities.iter().cloned());

        let mut edge_index: HashMap<String, Vec<RelationshipType>> = HashMap::new();
        for entity in collections.iter() {
            for relationship in entity.relationships() {
                edge_index
                    .entry(edge_key(
                        relationship.source_type,
                        &relationship.source_id,
                        relationship.target_type,
                        &relationship.target_id,
                    ))
                    .or_default()
                    .push(relationship.relationship_type);
            }
        }

        for entity in collections.iter() {
            let owner = entity.key();
            if entity.is_migrated() {
                statistics.migrated_entities += 1;
            } else {
                issues.push(
                    ValidationIssue::error(
                        IssueCategory::Integrity,
                        format!(
                            "{} has not been migrated (relationshipVersion {:?})",
                            owner,
                            entity.relationship_version()
                        ),
                    )
                    .for_entity(&owner)
                    .suggest("Re-run the migration or roll back from the backup"),
                );
            }

            for relationship in entity.relationships() {
                statistics.total_relationships += 1;

                if !check_relationship(entity, relationship, &mut issues) {
                    statistics.invalid_relationships += 1;
                    continue;
                }

                if config(relationship.relationship_type).bidirectional {
                    let inverse = edge_key(
                        relationship.target_type,
                        &relationship.target_id,
                        relationship.source_type,
                        &relationship.source_id,
                    );
                    let found = edge_index
                        .get(&inverse)
                        .is_some_and(|types| types.contains(&relationship.relationship_type));
                    if found {
                        if relationship.canonical {
                            statistics.bidirectional_pairs_validated += 1;
                        }
                    } else {
                        issues.push(
                            ValidationIssue::warning(
                                IssueCategory::Consistency,
                                format!(
                                    "{} relationship {} on {} has no inverse on {}:{}",
                                    relationship.relationship_type,
                                    relationship.id,
                                    owner,
                                    relationship.target_type,
                                    relationship.target_id
                                ),
                            )
                            .for_entity(&owner)
                            .suggest("Recreate the inverse relationship on the target"),
                        );
                    }
                }

                let target = EntityKey::new(relationship.target_type, relationship.target_id.clone());
                if self.resolvable_types.contains(&target.entity_type) && !existing.contains(&target)
                {
                    statistics.orphaned_references_removed += 1;
                    issues.push(
                        ValidationIssue::warning(
                            IssueCategory::Integrity,
                            format!(
                                "Relationship {} on {} points to missing {}",
                                relationship.id, owner, target
                            ),
                        )
                        .for_entity(&owner)
                        .suggest("Remove the orphaned relationship"),
                    );
                }
            }
        }

        PostMigrationValidation {
            data_preserved: !has_error_in(&issues, IssueCategory::Integrity),
            relationships_valid: !has_error_in(&issues, IssueCategory::Consistency),
            issues,
            statistics,
        }
    }
}

/// Missing ids and duplicate ids within one collection.
fn check_ids(
    collections: &EntityCollections,
    entity_type: EntityType,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for position in 0..collections.len_of(entity_type) {
        let Some(entity) = collections.get(entity_type, position) else {
            continue;
        };
        if entity.id().trim().is_empty() {
            issues.push(
                ValidationIssue::error(
                    IssueCategory::Structure,
                    format!("{} at index {} is missing a valid id", entity_type, position),
                )
                .suggest("Assign an id or remove the record before migrating"),
            );
        } else {
            *counts.entry(entity.id()).or_default() += 1;
        }
    }

    for (id, count) in counts.into_iter().filter(|(_, count)| *count > 1) {
        issues.push(
            ValidationIssue::error(
                IssueCategory::Integrity,
                format!("Duplicate {} id '{}' appears {} times", entity_type, id, count),
            )
            .for_entity(&EntityKey::new(entity_type, id))
            .suggest("Remove or re-key the duplicates before migrating"),
        );
    }
}

/// Field presence, registry conformance and ownership of one edge.
fn check_relationship(
    owner: &dyn HasRelationships,
    relationship: &Relationship,
    issues: &mut Vec<ValidationIssue>,
) -> bool {
    let owner_key = owner.key();

    let missing: Vec<&str> = [
        ("id", &relationship.id),
        ("sourceId", &relationship.source_id),
        ("targetId", &relationship.target_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        issues.push(
            ValidationIssue::error(
                IssueCategory::Consistency,
                format!(
                    "Relationship on {} is missing required fields: {}",
                    owner_key,
                    missing.join(", ")
                ),
            )
            .for_entity(&owner_key)
            .suggest("Remove the malformed relationship"),
        );
        return false;
    }

    let type_config = config(relationship.relationship_type);
    let mut valid = true;

    if !type_config.source_types.contains(&relationship.source_type) {
        valid = false;
        issues.push(
            ValidationIssue::error(
                IssueCategory::Consistency,
                format!(
                    "Relationship {} ({}) has invalid source type {}; expected one of {:?}",
                    relationship.id,
                    relationship.relationship_type,
                    relationship.source_type,
                    type_config.source_types
                ),
            )
            .for_entity(&owner_key),
        );
    }
    if !type_config.target_types.contains(&relationship.target_type) {
        valid = false;
        issues.push(
            ValidationIssue::error(
                IssueCategory::Consistency,
                format!(
                    "Relationship {} ({}) has invalid target type {}; expected one of {:?}",
                    relationship.id,
                    relationship.relationship_type,
                    relationship.target_type,
                    type_config.target_types
                ),
            )
            .for_entity(&owner_key),
        );
    }
    if relationship.source_type != owner.entity_type() || relationship.source_id != owner.id() {
        valid = false;
        issues.push(
            ValidationIssue::error(
                IssueCategory::Consistency,
                format!(
                    "Relationship {} is stored on {} but its source is {}:{}",
                    relationship.id, owner_key, relationship.source_type, relationship.source_id
                ),
            )
            .for_entity(&owner_key)
            .suggest("Move the relationship to its source entity"),
        );
    }

    valid
}

fn edge_key(
    source_type: EntityType,
    source_id: &str,
    target_type: EntityType,
    target_id: &str,
) -> String {
    format!("{}:{}:{}:{}", source_type, source_id, target_type, target_id)
}
