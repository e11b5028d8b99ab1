//! Entities that own relationships: tasks, notes and sessions.
//!
//! Each entity keeps its legacy foreign-key fields forever and gains an
//! inline `relationships` list plus a `relationshipVersion` marker once
//! migrated. Unknown application fields are carried through untouched in
//! `extra`, so a load/save round trip never loses data.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};
use crate::relationships::{EntityType, Relationship, RelationshipType};
use crate::storage::{load_typed, save_typed, KeyValueStore, StorageKeys};

/// Relationship schema version written by the migration engine.
pub const CURRENT_RELATIONSHIP_VERSION: u32 = 1;

/// A `(type, id)` pair identifying one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// A link recorded in a legacy field, not yet a [`Relationship`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyReference {
    /// Name of the legacy JSON field.
    pub field: &'static str,
    pub relationship_type: RelationshipType,
    pub target_type: EntityType,
    pub target_id: String,
}

impl LegacyReference {
    fn new(
        field: &'static str,
        relationship_type: RelationshipType,
        target_type: EntityType,
        target_id: &str,
    ) -> Self {
        Self {
            field,
            relationship_type,
            target_type,
            target_id: target_id.to_string(),
        }
    }
}

/// Shared surface of every entity that stores relationships inline.
pub trait HasRelationships {
    fn entity_type(&self) -> EntityType;

    fn id(&self) -> &str;

    fn relationships(&self) -> &[Relationship];

    fn relationships_mut(&mut self) -> &mut Vec<Relationship>;

    fn relationship_version(&self) -> Option<u32>;

    fn set_relationship_version(&mut self, version: Option<u32>);

    /// Links recorded in legacy fields, deduplicated, in field order.
    fn legacy_references(&self) -> Vec<LegacyReference>;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type(), self.id())
    }

    fn is_migrated(&self) -> bool {
        self.relationship_version() == Some(CURRENT_RELATIONSHIP_VERSION)
    }

    /// Whether an edge of this type to this target is already stored.
    fn has_relationship_to(
        &self,
        relationship_type: RelationshipType,
        target_type: EntityType,
        target_id: &str,
    ) -> bool {
        self.relationships()
            .iter()
            .any(|r| r.points_to(relationship_type, target_type, target_id))
    }
}

macro_rules! impl_has_relationships {
    ($entity:ty, $entity_type:expr) => {
        impl HasRelationships for $entity {
            fn entity_type(&self) -> EntityType {
                $entity_type
            }

            fn id(&self) -> &str {
                &self.id
            }

            fn relationships(&self) -> &[Relationship] {
                &self.relationships
            }

            fn relationships_mut(&mut self) -> &mut Vec<Relationship> {
                &mut self.relationships
            }

            fn relationship_version(&self) -> Option<u32> {
                self.relationship_version
            }

            fn set_relationship_version(&mut self, version: Option<u32>) {
                self.relationship_version = version;
            }

            fn legacy_references(&self) -> Vec<LegacyReference> {
                dedup_references(self.collect_legacy_references())
            }
        }
    };
}

/// Accept any JSON for `id`; anything but a string becomes empty so the
/// validator reports it instead of the whole collection failing to load.
fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_of(&Value::deserialize(deserializer)?))
}

fn id_of(value: &Value) -> String {
    match value {
        Value::String(id) => id.clone(),
        _ => String::new(),
    }
}

fn dedup_references(references: Vec<LegacyReference>) -> Vec<LegacyReference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|r| seen.insert((r.relationship_type, r.target_type, r.target_id.clone())))
        .collect()
}

/// A task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    /// Legacy: linked note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Legacy: note the task was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_note_id: Option<String>,
    /// Legacy: session the task was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_version: Option<u32>,
    /// Every other application field, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn collect_legacy_references(&self) -> Vec<LegacyReference> {
        let mut references = Vec::new();
        if let Some(id) = &self.note_id {
            references.push(LegacyReference::new(
                "noteId",
                RelationshipType::TaskNote,
                EntityType::Note,
                id,
            ));
        }
        if let Some(id) = &self.source_note_id {
            references.push(LegacyReference::new(
                "sourceNoteId",
                RelationshipType::TaskNote,
                EntityType::Note,
                id,
            ));
        }
        if let Some(id) = &self.source_session_id {
            references.push(LegacyReference::new(
                "sourceSessionId",
                RelationshipType::TaskSession,
                EntityType::Session,
                id,
            ));
        }
        references
    }
}

impl_has_relationships!(Task, EntityType::Task);

/// A note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    /// Legacy: single topic, superseded by `topic_ids`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_version: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn collect_legacy_references(&self) -> Vec<LegacyReference> {
        let mut references = Vec::new();
        if let Some(id) = &self.topic_id {
            references.push(LegacyReference::new(
                "topicId",
                RelationshipType::NoteTopic,
                EntityType::Topic,
                id,
            ));
        }
        let lists: [(&'static str, &Option<Vec<String>>, RelationshipType, EntityType); 3] = [
            (
                "topicIds",
                &self.topic_ids,
                RelationshipType::NoteTopic,
                EntityType::Topic,
            ),
            (
                "companyIds",
                &self.company_ids,
                RelationshipType::NoteCompany,
                EntityType::Company,
            ),
            (
                "contactIds",
                &self.contact_ids,
                RelationshipType::NoteContact,
                EntityType::Contact,
            ),
        ];
        for (field, ids, relationship_type, target_type) in lists {
            for id in ids.iter().flatten() {
                references.push(LegacyReference::new(field, relationship_type, target_type, id));
            }
        }
        if let Some(id) = &self.source_session_id {
            references.push(LegacyReference::new(
                "sourceSessionId",
                RelationshipType::NoteSession,
                EntityType::Session,
                id,
            ));
        }
        if let Some(id) = &self.parent_note_id {
            references.push(LegacyReference::new(
                "parentNoteId",
                RelationshipType::NoteParent,
                EntityType::Note,
                id,
            ));
        }
        references
    }
}

impl_has_relationships!(Note, EntityType::Note);

/// A recorded work session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_task_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_note_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_version: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn collect_legacy_references(&self) -> Vec<LegacyReference> {
        let mut references = Vec::new();
        for id in self.extracted_task_ids.iter().flatten() {
            references.push(LegacyReference::new(
                "extractedTaskIds",
                RelationshipType::TaskSession,
                EntityType::Task,
                id,
            ));
        }
        for id in self.extracted_note_ids.iter().flatten() {
            references.push(LegacyReference::new(
                "extractedNoteIds",
                RelationshipType::NoteSession,
                EntityType::Note,
                id,
            ));
        }
        references
    }
}

impl_has_relationships!(Session, EntityType::Session);

/// The three entity collections, always migrated and validated together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCollections {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl EntityCollections {
    /// Entity types stored in these collections.
    pub const LOCAL_TYPES: [EntityType; 3] =
        [EntityType::Task, EntityType::Note, EntityType::Session];

    pub fn new(tasks: Vec<Task>, notes: Vec<Note>, sessions: Vec<Session>) -> Self {
        Self {
            tasks,
            notes,
            sessions,
        }
    }

    pub fn is_local(entity_type: EntityType) -> bool {
        Self::LOCAL_TYPES.contains(&entity_type)
    }

    /// Total number of entities across the three collections.
    pub fn len(&self) -> usize {
        self.tasks.len() + self.notes.len() + self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entities of one local type.
    pub fn len_of(&self, entity_type: EntityType) -> usize {
        match entity_type {
            EntityType::Task => self.tasks.len(),
            EntityType::Note => self.notes.len(),
            EntityType::Session => self.sessions.len(),
            _ => 0,
        }
    }

    /// Entity at `position` in the collection for `entity_type`.
    pub fn get(&self, entity_type: EntityType, position: usize) -> Option<&dyn HasRelationships> {
        match entity_type {
            EntityType::Task => self.tasks.get(position).map(|e| e as &dyn HasRelationships),
            EntityType::Note => self.notes.get(position).map(|e| e as &dyn HasRelationships),
            EntityType::Session => self
                .sessions
                .get(position)
                .map(|e| e as &dyn HasRelationships),
            _ => None,
        }
    }

    pub fn get_mut(
        &mut self,
        entity_type: EntityType,
        position: usize,
    ) -> Option<&mut dyn HasRelationships> {
        match entity_type {
            EntityType::Task => self
                .tasks
                .get_mut(position)
                .map(|e| e as &mut dyn HasRelationships),
            EntityType::Note => self
                .notes
                .get_mut(position)
                .map(|e| e as &mut dyn HasRelationships),
            EntityType::Session => self
                .sessions
                .get_mut(position)
                .map(|e| e as &mut dyn HasRelationships),
            _ => None,
        }
    }

    /// Position of the first entity with this key.
    pub fn position_of(&self, entity_type: EntityType, id: &str) -> Option<usize> {
        match entity_type {
            EntityType::Task => self.tasks.iter().position(|e| e.id == id),
            EntityType::Note => self.notes.iter().position(|e| e.id == id),
            EntityType::Session => self.sessions.iter().position(|e| e.id == id),
            _ => None,
        }
    }

    pub fn find(&self, entity_type: EntityType, id: &str) -> Option<&dyn HasRelationships> {
        self.position_of(entity_type, id)
            .and_then(|position| self.get(entity_type, position))
    }

    pub fn find_mut(
        &mut self,
        entity_type: EntityType,
        id: &str,
    ) -> Option<&mut dyn HasRelationships> {
        let position = self.position_of(entity_type, id)?;
        self.get_mut(entity_type, position)
    }

    /// Every entity, tasks then notes then sessions, in array order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn HasRelationships> {
        self.tasks
            .iter()
            .map(|e| e as &dyn HasRelationships)
            .chain(self.notes.iter().map(|e| e as &dyn HasRelationships))
            .chain(self.sessions.iter().map(|e| e as &dyn HasRelationships))
    }

    /// Keys of every entity with a non-empty id.
    pub fn entity_keys(&self) -> HashSet<EntityKey> {
        self.iter()
            .filter(|e| !e.id().is_empty())
            .map(|e| e.key())
            .collect()
    }

    /// Load the three collections; a missing key yields an empty collection.
    pub async fn load<S: KeyValueStore + ?Sized>(
        store: &S,
        keys: &StorageKeys,
    ) -> StorageResult<Self> {
        Ok(Self {
            tasks: load_typed(store, &keys.tasks).await?.unwrap_or_default(),
            notes: load_typed(store, &keys.notes).await?.unwrap_or_default(),
            sessions: load_typed(store, &keys.sessions).await?.unwrap_or_default(),
        })
    }

    /// Save the three collections, one key at a time.
    pub async fn save<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        keys: &StorageKeys,
    ) -> StorageResult<()> {
        save_typed(store, &keys.tasks, &self.tasks).await?;
        save_typed(store, &keys.notes, &self.notes).await?;
        save_typed(store, &keys.sessions, &self.sessions).await?;
        Ok(())
    }

    /// Save the collections on top of the JSON they were loaded from.
    ///
    /// A stored item counts as the origin of an entity only when it decodes
    /// to the matching `before` entity. Unchanged entities are written back
    /// as that stored JSON, byte for byte. Changed entities keep their stored object
    /// with only `relationships` and `relationshipVersion` replaced. Entities
    /// with no stored counterpart are serialized.
    pub async fn save_over<S: KeyValueStore + ?Sized>(
        &self,
        before: &EntityCollections,
        stored: &StoredCollections,
        store: &S,
        keys: &StorageKeys,
    ) -> StorageResult<()> {
        let tasks = patch_collection(&self.tasks, &before.tasks, stored.tasks.as_ref(), &keys.tasks)?;
        let notes = patch_collection(&self.notes, &before.notes, stored.notes.as_ref(), &keys.notes)?;
        let sessions = patch_collection(
            &self.sessions,
            &before.sessions,
            stored.sessions.as_ref(),
            &keys.sessions,
        )?;
        store.save(&keys.tasks, &tasks).await?;
        store.save(&keys.notes, &notes).await?;
        store.save(&keys.sessions, &sessions).await?;
        Ok(())
    }
}

/// The raw JSON under each collection key; `None` when the key is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCollections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Value>,
}

impl StoredCollections {
    pub async fn load<S: KeyValueStore + ?Sized>(
        store: &S,
        keys: &StorageKeys,
    ) -> StorageResult<Self> {
        Ok(Self {
            tasks: store.load(&keys.tasks).await?,
            notes: store.load(&keys.notes).await?,
            sessions: store.load(&keys.sessions).await?,
        })
    }

    /// Put every key back exactly as captured, deleting keys that were absent.
    pub async fn restore<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        keys: &StorageKeys,
    ) -> StorageResult<()> {
        for (key, value) in [
            (&keys.tasks, &self.tasks),
            (&keys.notes, &self.notes),
            (&keys.sessions, &self.sessions),
        ] {
            match value {
                Some(value) => store.save(key, value).await?,
                None => store.delete(key).await?,
            }
        }
        Ok(())
    }
}

fn patch_collection<E>(
    after: &[E],
    before: &[E],
    stored: Option<&Value>,
    key: &str,
) -> StorageResult<Value>
where
    E: HasRelationships + Serialize + DeserializeOwned + PartialEq,
{
    let serialization_error = |e: serde_json::Error| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    };
    let stored = stored.and_then(Value::as_array);

    let mut values = Vec::with_capacity(after.len());
    for (position, entity) in after.iter().enumerate() {
        let previous = before.get(position);
        let original = stored.and_then(|items| items.get(position)).filter(|raw| {
            raw.get("id").map(id_of).unwrap_or_default() == entity.id()
                && serde_json::from_value::<E>((*raw).clone()).ok().as_ref() == previous
        });

        let value = match original {
            Some(raw) if previous == Some(entity) => raw.clone(),
            Some(Value::Object(raw)) => {
                let mut object = raw.clone();
                if !entity.relationships().is_empty() {
                    object.insert(
                        "relationships".to_string(),
                        serde_json::to_value(entity.relationships())
                            .map_err(serialization_error)?,
                    );
                }
                if let Some(version) = entity.relationship_version() {
                    object.insert("relationshipVersion".to_string(), Value::from(version));
                }
                Value::Object(object)
            }
            _ => serde_json::to_value(entity).map_err(serialization_error)?,
        };
        values.push(value);
    }
    Ok(Value::Array(values))
}
