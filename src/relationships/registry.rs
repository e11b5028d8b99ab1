//! Constant registry describing every relationship type.

use serde::Serialize;

use super::{EntityType, RelationshipType};

/// Shape and presentation of one relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipTypeConfig {
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Entity types allowed as the source.
    pub source_types: &'static [EntityType],
    /// Entity types allowed as the target.
    pub target_types: &'static [EntityType],
    /// Whether every edge needs a mirrored, non-canonical inverse.
    pub bidirectional: bool,
    /// Declared only; no algorithm reads it yet.
    pub cascade_delete: bool,
    pub display_name: &'static str,
    pub icon: Option<&'static str>,
    pub color: Option<&'static str>,
}

/// Presentation subset of a [`RelationshipTypeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    pub display_name: &'static str,
    pub icon: Option<&'static str>,
    pub color: Option<&'static str>,
}

use EntityType::{Company, Contact, File, Note, Session, Task, Topic};

const TASK_NOTE: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskNote,
    source_types: &[Task, Note],
    target_types: &[Note, Task],
    bidirectional: true,
    cascade_delete: false,
    display_name: "Related Note",
    icon: Some("FileText"),
    color: Some("#3B82F6"),
};

const TASK_SESSION: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskSession,
    source_types: &[Task, Session],
    target_types: &[Session, Task],
    bidirectional: true,
    cascade_delete: false,
    display_name: "Session",
    icon: Some("Video"),
    color: Some("#8B5CF6"),
};

const NOTE_SESSION: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteSession,
    source_types: &[Note, Session],
    target_types: &[Session, Note],
    bidirectional: true,
    cascade_delete: false,
    display_name: "Session",
    icon: Some("Video"),
    color: Some("#8B5CF6"),
};

const TASK_TASK: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskTask,
    source_types: &[Task],
    target_types: &[Task],
    bidirectional: true,
    cascade_delete: false,
    display_name: "Related Task",
    icon: Some("CheckSquare"),
    color: Some("#10B981"),
};

const TASK_TOPIC: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskTopic,
    source_types: &[Task],
    target_types: &[Topic],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Topic",
    icon: Some("Tag"),
    color: Some("#F59E0B"),
};

const NOTE_TOPIC: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteTopic,
    source_types: &[Note],
    target_types: &[Topic],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Topic",
    icon: Some("Tag"),
    color: Some("#F59E0B"),
};

const SESSION_TOPIC: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::SessionTopic,
    source_types: &[Session],
    target_types: &[Topic],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Topic",
    icon: Some("Tag"),
    color: Some("#F59E0B"),
};

const TASK_COMPANY: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskCompany,
    source_types: &[Task],
    target_types: &[Company],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Company",
    icon: Some("Building2"),
    color: Some("#6366F1"),
};

const NOTE_COMPANY: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteCompany,
    source_types: &[Note],
    target_types: &[Company],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Company",
    icon: Some("Building2"),
    color: Some("#6366F1"),
};

const TASK_CONTACT: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskContact,
    source_types: &[Task],
    target_types: &[Contact],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Contact",
    icon: Some("User"),
    color: Some("#EC4899"),
};

const NOTE_CONTACT: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteContact,
    source_types: &[Note],
    target_types: &[Contact],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Contact",
    icon: Some("User"),
    color: Some("#EC4899"),
};

const SESSION_CONTACT: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::SessionContact,
    source_types: &[Session],
    target_types: &[Contact],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Participant",
    icon: Some("Users"),
    color: Some("#EC4899"),
};

const NOTE_PARENT: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteParent,
    source_types: &[Note],
    target_types: &[Note],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Parent Note",
    icon: Some("GitBranch"),
    color: Some("#64748B"),
};

const TASK_FILE: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::TaskFile,
    source_types: &[Task],
    target_types: &[File],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Attachment",
    icon: Some("Paperclip"),
    color: None,
};

const NOTE_FILE: RelationshipTypeConfig = RelationshipTypeConfig {
    relationship_type: RelationshipType::NoteFile,
    source_types: &[Note],
    target_types: &[File],
    bidirectional: false,
    cascade_delete: false,
    display_name: "Attachment",
    icon: Some("Paperclip"),
    color: None,
};

/// Every config, in [`RelationshipType::ALL`] order.
pub static RELATIONSHIP_CONFIGS: [&RelationshipTypeConfig; 15] = [
    &TASK_NOTE,
    &TASK_SESSION,
    &NOTE_SESSION,
    &TASK_TASK,
    &TASK_TOPIC,
    &NOTE_TOPIC,
    &SESSION_TOPIC,
    &TASK_COMPANY,
    &NOTE_COMPANY,
    &TASK_CONTACT,
    &NOTE_CONTACT,
    &SESSION_CONTACT,
    &NOTE_PARENT,
    &TASK_FILE,
    &NOTE_FILE,
];

/// Config for a relationship type.
pub fn config(relationship_type: RelationshipType) -> &'static RelationshipTypeConfig {
    match relationship_type {
        RelationshipType::TaskNote => &TASK_NOTE,
        RelationshipType::TaskSession => &TASK_SESSION,
        RelationshipType::NoteSession => &NOTE_SESSION,
        RelationshipType::TaskTask => &TASK_TASK,
        RelationshipType::TaskTopic => &TASK_TOPIC,
        RelationshipType::NoteTopic => &NOTE_TOPIC,
        RelationshipType::SessionTopic => &SESSION_TOPIC,
        RelationshipType::TaskCompany => &TASK_COMPANY,
        RelationshipType::NoteCompany => &NOTE_COMPANY,
        RelationshipType::TaskContact => &TASK_CONTACT,
        RelationshipType::NoteContact => &NOTE_CONTACT,
        RelationshipType::SessionContact => &SESSION_CONTACT,
        RelationshipType::NoteParent => &NOTE_PARENT,
        RelationshipType::TaskFile => &TASK_FILE,
        RelationshipType::NoteFile => &NOTE_FILE,
    }
}

pub fn is_bidirectional(relationship_type: RelationshipType) -> bool {
    config(relationship_type).bidirectional
}

pub fn supports_cascade_delete(relationship_type: RelationshipType) -> bool {
    config(relationship_type).cascade_delete
}

pub fn get_display_config(relationship_type: RelationshipType) -> DisplayConfig {
    let config = config(relationship_type);
    DisplayConfig {
        display_name: config.display_name,
        icon: config.icon,
        color: config.color,
    }
}

/// True iff both participants are allowed for this relationship type.
///
/// This is the single authority on edge shape; every other component
/// defers to it.
pub fn validate_relationship_types(
    relationship_type: RelationshipType,
    source_type: EntityType,
    target_type: EntityType,
) -> bool {
    let config = config(relationship_type);
    config.source_types.contains(&source_type) && config.target_types.contains(&target_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_exactly_one_config() {
        for (expected, config) in RelationshipType::ALL.iter().zip(RELATIONSHIP_CONFIGS.iter()) {
            assert_eq!(config.relationship_type, *expected);
            assert_eq!(super::config(*expected).relationship_type, *expected);
        }
        assert_eq!(RELATIONSHIP_CONFIGS.len(), RelationshipType::ALL.len());
    }

    #[test]
    fn test_validate_is_membership_not_equality() {
        assert!(validate_relationship_types(RelationshipType::TaskNote, Task, Note));
        assert!(validate_relationship_types(RelationshipType::TaskNote, Note, Task));
        assert!(!validate_relationship_types(RelationshipType::TaskNote, Task, Session));
        assert!(!validate_relationship_types(RelationshipType::NoteTopic, Topic, Note));
        assert!(validate_relationship_types(RelationshipType::NoteParent, Note, Note));
    }

    #[test]
    fn test_company_and_contact_are_distinct_types() {
        assert!(validate_relationship_types(RelationshipType::TaskCompany, Task, Company));
        assert!(!validate_relationship_types(RelationshipType::TaskCompany, Task, Contact));
        assert!(validate_relationship_types(RelationshipType::TaskContact, Task, Contact));
    }

    #[test]
    fn test_bidirectional_types() {
        let bidirectional: Vec<_> = RelationshipType::ALL
            .into_iter()
            .filter(|t| is_bidirectional(*t))
            .collect();
        assert_eq!(
            bidirectional,
            vec![
                RelationshipType::TaskNote,
                RelationshipType::TaskSession,
                RelationshipType::NoteSession,
                RelationshipType::TaskTask,
            ]
        );
    }

    #[test]
    fn test_no_type_cascades() {
        assert!(RelationshipType::ALL
            .into_iter()
            .all(|t| !supports_cascade_delete(t)));
    }

    #[test]
    fn test_display_config() {
        let display = get_display_config(RelationshipType::NoteParent);
        assert_eq!(display.display_name, "Parent Note");
        assert_eq!(display.icon, Some("GitBranch"));

        let reserved = get_display_config(RelationshipType::TaskFile);
        assert!(reserved.color.is_none());
    }

    #[test]
    fn test_config_serializes_with_wire_names() {
        let value = serde_json::to_value(config(RelationshipType::TaskSession)).unwrap();
        assert_eq!(value["type"], "task-session");
        assert_eq!(value["sourceTypes"], serde_json::json!(["task", "session"]));
        assert_eq!(value["cascadeDelete"], false);
    }
}
