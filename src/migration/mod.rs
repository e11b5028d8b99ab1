//! Migration of legacy foreign-key fields into the relationship graph.
//!
//! The flow is: [`MigrationValidator::pre_validate`] gates the run,
//! [`MigrationEngine::migrate`] backs up, transforms and persists the
//! collections, and [`MigrationValidator::post_validate`] certifies the
//! result or drives a [`MigrationEngine::rollback`].

mod engine;
mod validator;

pub use engine::{migrate_entities, MigrationEngine, MigrationSummary};
pub use validator::{
    MigrationValidator, PerformanceEstimate, PostMigrationStatistics, PostMigrationValidation,
    PreMigrationStatistics, PreMigrationValidation,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{EntityKey, StoredCollections};

/// Progress callback: stage message and percent complete (0-100).
pub type ProgressCallback = Box<dyn Fn(&str, u8) + Send + Sync>;

/// Options for a migration run.
#[derive(Default)]
pub struct MigrationOptions {
    /// Compute everything but write nothing.
    pub dry_run: bool,
    /// Log every synthesized relationship at info level.
    pub verbose: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl MigrationOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, callback: impl Fn(&str, u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub(crate) fn report(&self, message: &str, percent: u8) {
        if let Some(callback) = &self.on_progress {
            callback(message, percent.min(100));
        }
    }
}

impl std::fmt::Debug for MigrationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Outcome of a migration run, returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// True when no entity failed to migrate.
    pub success: bool,
    pub migrated_count: usize,
    /// Entities that were already migrated before this run.
    pub skipped_count: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Storage key of the pre-migration backup; `None` for dry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    pub dry_run: bool,
}

/// Persisted marker recording a completed migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub completed: bool,
    pub version: u32,
    pub completed_at: DateTime<Utc>,
    pub migrated_count: usize,
    pub backup_key: Option<String>,
}

/// Snapshot of the stored collections taken before a migration writes
/// anything. Holds the JSON as stored, not a re-serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationBackup {
    pub created_at: DateTime<Utc>,
    pub version: u32,
    #[serde(flatten)]
    pub collections: StoredCollections,
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Error => write!(f, "error"),
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Info => write!(f, "info"),
        }
    }
}

/// What part of the data a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Structure,
    Integrity,
    Consistency,
    Performance,
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueCategory::Structure => write!(f, "structure"),
            IssueCategory::Integrity => write!(f, "integrity"),
            IssueCategory::Consistency => write!(f, "consistency"),
            IssueCategory::Performance => write!(f, "performance"),
        }
    }
}

/// One finding from a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: IssueSeverity, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            entity: None,
            suggested_action: None,
        }
    }

    pub fn error(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, category, message)
    }

    pub fn warning(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, category, message)
    }

    pub fn info(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Info, category, message)
    }

    pub fn for_entity(mut self, key: &EntityKey) -> Self {
        self.entity = Some(key.to_string());
        self
    }

    pub fn suggest(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.severity, self.category, self.message)?;
        if let Some(action) = &self.suggested_action {
            write!(f, " ({})", action)?;
        }
        Ok(())
    }
}

/// True when any issue is an error in `category`.
pub(crate) fn has_error_in(issues: &[ValidationIssue], category: IssueCategory) -> bool {
    issues
        .iter()
        .any(|i| i.is_error() && i.category == category)
}
