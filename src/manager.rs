//! Single-relationship create/remove over migrated collections.
//!
//! Unlike the bulk migration path, every operation here either succeeds
//! or returns a typed [`RelationshipError`]. Bidirectional types keep
//! their canonical/inverse pair in step.

use serde_json::json;
use tracing::{debug, info};

use crate::entities::{EntityCollections, EntityKey, HasRelationships};
use crate::error::{RelationshipError, RelationshipResult};
use crate::relationships::{
    is_bidirectional, EntityType, Relationship, RelationshipMetadata, RelationshipType,
};
use crate::storage::{KeyValueStore, StorageKeys};

/// Parameters for [`RelationshipManager::add_relationship`].
#[derive(Debug, Clone)]
pub struct AddRelationship {
    pub relationship_type: RelationshipType,
    pub source_type: EntityType,
    pub source_id: String,
    pub target_type: EntityType,
    pub target_id: String,
    pub metadata: RelationshipMetadata,
}

impl AddRelationship {
    pub fn new(
        relationship_type: RelationshipType,
        source: (EntityType, &str),
        target: (EntityType, &str),
        metadata: RelationshipMetadata,
    ) -> Self {
        Self {
            relationship_type,
            source_type: source.0,
            source_id: source.1.to_string(),
            target_type: target.0,
            target_id: target.1.to_string(),
            metadata,
        }
    }
}

/// Owns a set of collections and edits their relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipManager {
    collections: EntityCollections,
}

impl RelationshipManager {
    pub fn new(collections: EntityCollections) -> Self {
        Self { collections }
    }

    /// Load the collections from `store`.
    pub async fn load<S: KeyValueStore + ?Sized>(
        store: &S,
        keys: &StorageKeys,
    ) -> RelationshipResult<Self> {
        let collections = EntityCollections::load(store, keys).await.map_err(|e| {
            RelationshipError::transaction(format!("Failed to load collections: {}", e))
        })?;
        Ok(Self::new(collections))
    }

    pub fn collections(&self) -> &EntityCollections {
        &self.collections
    }

    pub fn into_collections(self) -> EntityCollections {
        self.collections
    }

    /// Create a relationship, plus its inverse for bidirectional types.
    pub fn add_relationship(&mut self, request: AddRelationship) -> RelationshipResult<Relationship> {
        request.metadata.validate()?;
        let relationship = Relationship::new(
            request.relationship_type,
            request.source_type,
            request.source_id,
            request.target_type,
            request.target_id,
            request.metadata,
        )?;

        if relationship.source_type == relationship.target_type
            && relationship.source_id == relationship.target_id
        {
            return Err(RelationshipError::validation(format!(
                "{} cannot relate {}:{} to itself",
                relationship.relationship_type, relationship.source_type, relationship.source_id
            )));
        }

        let source_key = EntityKey::new(relationship.source_type, relationship.source_id.clone());
        let target_key = EntityKey::new(relationship.target_type, relationship.target_id.clone());

        let Some(source) = self
            .collections
            .find(source_key.entity_type, &source_key.id)
        else {
            return Err(
                RelationshipError::entity_not_found(format!("Source {} not found", source_key))
                    .with_details(json!({ "entity": source_key.to_string() })),
            );
        };
        if source.has_relationship_to(
            relationship.relationship_type,
            relationship.target_type,
            &relationship.target_id,
        ) {
            return Err(RelationshipError::duplicate(format!(
                "{} already has a {} relationship to {}",
                source_key, relationship.relationship_type, target_key
            )));
        }

        let needs_inverse = is_bidirectional(relationship.relationship_type);
        let target_is_local = EntityCollections::is_local(target_key.entity_type);
        if target_is_local
            && self
                .collections
                .find(target_key.entity_type, &target_key.id)
                .is_none()
        {
            return Err(
                RelationshipError::entity_not_found(format!("Target {} not found", target_key))
                    .with_details(json!({ "entity": target_key.to_string() })),
            );
        }
        if needs_inverse && !target_is_local {
            return Err(RelationshipError::validation(format!(
                "{} is bidirectional but {} entities do not store relationships",
                relationship.relationship_type, target_key.entity_type
            )));
        }

        if let Some(source) = self
            .collections
            .find_mut(source_key.entity_type, &source_key.id)
        {
            source.relationships_mut().push(relationship.clone());
        }
        if needs_inverse {
            if let Some(target) = self
                .collections
                .find_mut(target_key.entity_type, &target_key.id)
            {
                if !target.has_relationship_to(
                    relationship.relationship_type,
                    source_key.entity_type,
                    &source_key.id,
                ) {
                    target.relationships_mut().push(relationship.inverse());
                }
            }
        }

        info!(
            relationship_id = %relationship.id,
            relationship_type = %relationship.relationship_type,
            source = %source_key,
            target = %target_key,
            "Relationship added"
        );
        Ok(relationship)
    }

    /// Remove a relationship by id from its owning entity, and its mirror.
    pub fn remove_relationship(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        relationship_id: &str,
    ) -> RelationshipResult<Relationship> {
        let owner_key = EntityKey::new(entity_type, entity_id);
        let owner = self
            .collections
            .find_mut(entity_type, entity_id)
            .ok_or_else(|| {
                RelationshipError::entity_not_found(format!("{} not found", owner_key))
            })?;

        let position = owner
            .relationships()
            .iter()
            .position(|r| r.id == relationship_id)
            .ok_or_else(|| {
                RelationshipError::not_found(format!(
                    "Relationship {} not found on {}",
                    relationship_id, owner_key
                ))
                .with_details(json!({ "relationshipId": relationship_id }))
            })?;
        let removed = owner.relationships_mut().remove(position);

        if is_bidirectional(removed.relationship_type) {
            if let Some(other) = self
                .collections
                .find_mut(removed.target_type, &removed.target_id)
            {
                let before = other.relationships().len();
                other.relationships_mut().retain(|r| !r.is_inverse_of(&removed));
                debug!(
                    mirrored = before - other.relationships().len(),
                    "Removed mirrored relationships"
                );
            }
        }

        info!(
            relationship_id = %removed.id,
            relationship_type = %removed.relationship_type,
            owner = %owner_key,
            "Relationship removed"
        );
        Ok(removed)
    }

    /// Outgoing edges stored on an entity.
    pub fn relationships_of(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> RelationshipResult<&[Relationship]> {
        self.collections
            .find(entity_type, entity_id)
            .map(|e| e.relationships())
            .ok_or_else(|| {
                RelationshipError::entity_not_found(format!(
                    "{} not found",
                    EntityKey::new(entity_type, entity_id)
                ))
            })
    }

    /// Edges pointing at an entity, found by scanning every entity.
    pub fn incoming(&self, entity_type: EntityType, entity_id: &str) -> Vec<&Relationship> {
        self.collections
            .iter()
            .flat_map(|e| e.relationships().iter())
            .filter(|r| r.target_type == entity_type && r.target_id == entity_id)
            .collect()
    }

    /// Persist the three collections.
    ///
    /// Writes are per key; a failure part way leaves earlier keys written.
    pub async fn commit<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        keys: &StorageKeys,
    ) -> RelationshipResult<()> {
        self.collections.save(store, keys).await?;
        debug!(entities = self.collections.len(), "Relationship changes committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Note, Task};
    use crate::error::StorageError;
    use crate::relationships::RelationshipSource;
    use crate::storage::MockKeyValueStore;

    #[tokio::test]
    async fn test_commit_failure_is_transaction_error() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(StorageError::Connection {
                message: "disk full".to_string(),
            }));

        let manager = RelationshipManager::new(EntityCollections::new(
            vec![Task::new("t1")],
            vec![Note::new("n1")],
            vec![],
        ));
        let err = manager
            .commit(&store, &StorageKeys::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), RelationshipError::TRANSACTION_ERROR);
        assert!(err.message().contains("disk full"));
    }

    #[tokio::test]
    async fn test_load_failure_is_transaction_error() {
        let mut store = MockKeyValueStore::new();
        store.expect_load().returning(|_| {
            Err(StorageError::Query {
                message: "locked".to_string(),
            })
        });

        let err = RelationshipManager::load(&store, &StorageKeys::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), RelationshipError::TRANSACTION_ERROR);
    }

    #[test]
    fn test_add_records_metadata() {
        let mut manager = RelationshipManager::new(EntityCollections::new(
            vec![Task::new("t1")],
            vec![],
            vec![],
        ));

        let created = manager
            .add_relationship(AddRelationship::new(
                RelationshipType::TaskContact,
                (EntityType::Task, "t1"),
                (EntityType::Contact, "c1"),
                RelationshipMetadata::new(RelationshipSource::System),
            ))
            .unwrap();

        assert_eq!(created.metadata.source, RelationshipSource::System);
        assert_eq!(manager.incoming(EntityType::Contact, "c1")[0].id, created.id);
    }
}
