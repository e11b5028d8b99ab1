//! Relationship data model.
//!
//! Entities reference each other through typed, directed [`Relationship`]
//! edges stored inline on the source entity. The allowed shape of every
//! edge kind lives in the constant [`registry`].

pub mod registry;


pub use registry::{
    config, get_display_config, is_bidirectional, supports_cascade_delete,
    validate_relationship_types, DisplayConfig, RelationshipTypeConfig, RELATIONSHIP_CONFIGS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelationshipError, RelationshipResult};

/// Kind of record an id belongs to. Every reference is a `(type, id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A task.
    Task,
    /// A note.
    Note,
    /// A recorded work session.
    Session,
    /// A topic.
    Topic,
    /// A company.
    Company,
    /// A contact.
    Contact,
    /// Reserved: an attached file.
    File,
    /// Reserved: a project.
    Project,
    /// Reserved: a goal.
    Goal,
}

impl EntityType {
    /// All entity types, current first.
    pub const ALL: [EntityType; 9] = [
        EntityType::Task,
        EntityType::Note,
        EntityType::Session,
        EntityType::Topic,
        EntityType::Company,
        EntityType::Contact,
        EntityType::File,
        EntityType::Project,
        EntityType::Goal,
    ];

    /// Whether this type is reserved for future use.
    pub fn is_reserved(self) -> bool {
        matches!(self, EntityType::File | EntityType::Project | EntityType::Goal)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Note => "note",
            EntityType::Session => "session",
            EntityType::Topic => "topic",
            EntityType::Company => "company",
            EntityType::Contact => "contact",
            EntityType::File => "file",
            EntityType::Project => "project",
            EntityType::Goal => "goal",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// Semantic edge kind. Several kinds may connect the same two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    TaskNote,
    TaskSession,
    NoteSession,
    TaskTask,
    TaskTopic,
    NoteTopic,
    SessionTopic,
    TaskCompany,
    NoteCompany,
    TaskContact,
    NoteContact,
    SessionContact,
    NoteParent,
    /// Reserved for file attachments.
    TaskFile,
    /// Reserved for file attachments.
    NoteFile,
}

impl RelationshipType {
    /// Every relationship type, current first then reserved.
    pub const ALL: [RelationshipType; 15] = [
        RelationshipType::TaskNote,
        RelationshipType::TaskSession,
        RelationshipType::NoteSession,
        RelationshipType::TaskTask,
        RelationshipType::TaskTopic,
        RelationshipType::NoteTopic,
        RelationshipType::SessionTopic,
        RelationshipType::TaskCompany,
        RelationshipType::NoteCompany,
        RelationshipType::TaskContact,
        RelationshipType::NoteContact,
        RelationshipType::SessionContact,
        RelationshipType::NoteParent,
        RelationshipType::TaskFile,
        RelationshipType::NoteFile,
    ];

    pub fn is_reserved(self) -> bool {
        matches!(self, RelationshipType::TaskFile | RelationshipType::NoteFile)
    }

    /// Kebab-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::TaskNote => "task-note",
            RelationshipType::TaskSession => "task-session",
            RelationshipType::NoteSession => "note-session",
            RelationshipType::TaskTask => "task-task",
            RelationshipType::TaskTopic => "task-topic",
            RelationshipType::NoteTopic => "note-topic",
            RelationshipType::SessionTopic => "session-topic",
            RelationshipType::TaskCompany => "task-company",
            RelationshipType::NoteCompany => "note-company",
            RelationshipType::TaskContact => "task-contact",
            RelationshipType::NoteContact => "note-contact",
            RelationshipType::SessionContact => "session-contact",
            RelationshipType::NoteParent => "note-parent",
            RelationshipType::TaskFile => "task-file",
            RelationshipType::NoteFile => "note-file",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown relationship type: {}", s))
    }
}

/// How a relationship came to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipSource {
    /// Suggested by an AI model.
    Ai,
    /// Created by the user.
    #[default]
    Manual,
    /// Synthesized from a legacy field.
    Migration,
    /// Created by the application itself.
    System,
}

impl std::fmt::Display for RelationshipSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipSource::Ai => write!(f, "ai"),
            RelationshipSource::Manual => write!(f, "manual"),
            RelationshipSource::Migration => write!(f, "migration"),
            RelationshipSource::System => write!(f, "system"),
        }
    }
}

/// Provenance of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    /// Where the relationship came from.
    pub source: RelationshipSource,
    /// Model confidence (0.0-1.0), only for AI relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Model explanation, only for AI relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Open bag for type-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl RelationshipMetadata {
    pub fn new(source: RelationshipSource) -> Self {
        Self {
            source,
            confidence: None,
            reasoning: None,
            created_at: Utc::now(),
            created_by: None,
            extra: None,
        }
    }

    /// Metadata for an edge synthesized from a legacy field.
    pub fn migration(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            ..Self::new(RelationshipSource::Migration)
        }
    }

    /// Metadata for an AI-suggested edge.
    pub fn ai(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            confidence: Some(confidence),
            reasoning: Some(reasoning.into()),
            ..Self::new(RelationshipSource::Ai)
        }
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Check the AI-only fields are used consistently.
    pub fn validate(&self) -> RelationshipResult<()> {
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(RelationshipError::validation(format!(
                    "confidence must be between 0 and 1, got {}",
                    confidence
                )));
            }
        }
        if self.source != RelationshipSource::Ai
            && (self.confidence.is_some() || self.reasoning.is_some())
        {
            return Err(RelationshipError::validation(format!(
                "confidence and reasoning are only allowed on ai relationships, not {}",
                self.source
            )));
        }
        Ok(())
    }
}

/// A typed, directed edge owned by its source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub source_type: EntityType,
    pub source_id: String,
    pub target_type: EntityType,
    pub target_id: String,
    pub metadata: RelationshipMetadata,
    /// False only for the auto-generated inverse of a bidirectional edge.
    pub canonical: bool,
}

impl Relationship {
    /// Create a canonical relationship after checking it against the registry.
    pub fn new(
        relationship_type: RelationshipType,
        source_type: EntityType,
        source_id: impl Into<String>,
        target_type: EntityType,
        target_id: impl Into<String>,
        metadata: RelationshipMetadata,
    ) -> RelationshipResult<Self> {
        let source_id = source_id.into();
        let target_id = target_id.into();

        if !validate_relationship_types(relationship_type, source_type, target_type) {
            return Err(RelationshipError::validation(format!(
                "{} cannot connect {} to {}",
                relationship_type, source_type, target_type
            ))
            .with_details(serde_json::json!({
                "type": relationship_type,
                "sourceType": source_type,
                "targetType": target_type,
            })));
        }
        if source_id.trim().is_empty() || target_id.trim().is_empty() {
            return Err(RelationshipError::validation(format!(
                "{} relationship requires non-empty source and target ids",
                relationship_type
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            relationship_type,
            source_type,
            source_id,
            target_type,
            target_id,
            metadata,
            canonical: true,
        })
    }

    /// Build the mirrored, non-canonical edge stored on the target entity.
    pub fn inverse(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            relationship_type: self.relationship_type,
            source_type: self.target_type,
            source_id: self.target_id.clone(),
            target_type: self.source_type,
            target_id: self.source_id.clone(),
            metadata: self.metadata.clone(),
            canonical: false,
        }
    }

    /// Whether this edge connects to the given target under the same type.
    pub fn points_to(
        &self,
        relationship_type: RelationshipType,
        target_type: EntityType,
        target_id: &str,
    ) -> bool {
        self.relationship_type == relationship_type
            && self.target_type == target_type
            && self.target_id == target_id
    }

    /// Whether `other` is the mirror image of this edge.
    pub fn is_inverse_of(&self, other: &Relationship) -> bool {
        self.relationship_type == other.relationship_type
            && self.source_type == other.target_type
            && self.source_id == other.target_id
            && self.target_type == other.source_type
            && self.target_id == other.source_id
    }
}
