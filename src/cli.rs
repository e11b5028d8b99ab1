//! CLI commands for inspecting, migrating and rolling back the graph.

use clap::Subcommand;

use crate::migration::{
    MigrationEngine, MigrationOptions, MigrationValidator, PostMigrationValidation,
    PreMigrationValidation, ValidationIssue,
};
use crate::relationships::RELATIONSHIP_CONFIGS;
use crate::storage::KeyValueStore;

const RULE: &str = "═══════════════════════════════════════════════════════════════════════════════\n";

/// Relationship graph subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List every relationship type and its rules
    Types,

    /// Check the stored collections before migrating
    PreValidate,

    /// Migrate legacy fields into relationships
    Migrate {
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Log every created relationship
        #[arg(long)]
        verbose: bool,
    },

    /// Certify the stored collections after migrating
    PostValidate,

    /// Restore the collections from a backup key
    Rollback {
        /// Backup key printed by `migrate`
        backup_key: String,
    },

    /// Show the persisted migration status
    Status,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a CLI command against `engine`'s store.
pub async fn execute_command<S: KeyValueStore>(
    command: Commands,
    engine: &MigrationEngine<S>,
) -> CliResult {
    match command {
        Commands::Types => execute_types(),
        Commands::PreValidate => execute_pre_validate(engine).await,
        Commands::Migrate { dry_run, verbose } => execute_migrate(engine, dry_run, verbose).await,
        Commands::PostValidate => execute_post_validate(engine).await,
        Commands::Rollback { backup_key } => execute_rollback(engine, &backup_key).await,
        Commands::Status => execute_status(engine).await,
    }
}

fn execute_types() -> CliResult {
    let mut output = String::new();
    output.push_str("\nRelationship Types\n");
    output.push_str(RULE);

    for config in RELATIONSHIP_CONFIGS.iter() {
        let join = |types: &[crate::relationships::EntityType]| {
            types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join("|")
        };
        output.push_str(&format!(
            "  {:<16} {:<16} -> {:<16} {}{}\n",
            config.relationship_type.as_str(),
            join(config.source_types),
            join(config.target_types),
            if config.bidirectional { "bidirectional" } else { "one-way" },
            if config.relationship_type.is_reserved() {
                " (reserved)"
            } else {
                ""
            }
        ));
    }

    CliResult::success(output)
}

async fn execute_pre_validate<S: KeyValueStore>(engine: &MigrationEngine<S>) -> CliResult {
    let collections = match engine.load_collections().await {
        Ok(c) => c,
        Err(e) => return CliResult::error(format!("Failed to load collections: {}", e)),
    };
    let report = MigrationValidator::new().pre_validate(&collections);
    let output = format_pre_validation(&report);

    if report.can_proceed {
        CliResult::success(output)
    } else {
        CliResult::error(output)
    }
}

async fn execute_migrate<S: KeyValueStore>(
    engine: &MigrationEngine<S>,
    dry_run: bool,
    verbose: bool,
) -> CliResult {
    let mut collections = match engine.load_collections().await {
        Ok(c) => c,
        Err(e) => return CliResult::error(format!("Failed to load collections: {}", e)),
    };

    let pre = MigrationValidator::new().pre_validate(&collections);
    if !pre.can_proceed {
        return CliResult::error(format!(
            "{}\nMigration blocked by pre-validation errors.\n",
            format_pre_validation(&pre)
        ));
    }

    let options = MigrationOptions {
        dry_run,
        verbose,
        on_progress: Some(Box::new(|message: &str, percent: u8| {
            tracing::info!(percent, "{}", message);
        })),
    };

    let result = match engine.migrate(&mut collections, &options).await {
        Ok(r) => r,
        Err(e) => return CliResult::error(format!("Migration failed: {}", e)),
    };

    let mut output = String::new();
    output.push_str(if dry_run {
        "\nRelationship Migration (dry run)\n"
    } else {
        "\nRelationship Migration\n"
    });
    output.push_str(RULE);
    output.push_str(&format!("Migrated:      {}\n", result.migrated_count));
    output.push_str(&format!("Skipped:       {}\n", result.skipped_count));
    output.push_str(&format!("Relationships: {}\n", result.relationships_created));
    if let Some(backup) = &result.backup_path {
        output.push_str(&format!("Backup:        {}\n", backup));
    }
    for error in &result.errors {
        output.push_str(&format!("  error: {}\n", error));
    }
    for warning in &result.warnings {
        output.push_str(&format!("  warning: {}\n", warning));
    }

    if dry_run {
        return if result.success {
            CliResult::success(output)
        } else {
            CliResult::error(output)
        };
    }

    let persisted = match engine.load_collections().await {
        Ok(c) => c,
        Err(e) => {
            output.push_str(&format!("Failed to reload migrated collections: {}\n", e));
            return CliResult::error(output);
        }
    };
    let post = MigrationValidator::new().post_validate(&persisted);
    output.push_str(&format_post_validation(&post));
    if post.data_preserved && post.relationships_valid && result.success {
        CliResult::success(output)
    } else {
        if let Some(backup) = &result.backup_path {
            output.push_str(&format!(
                "\nPost-validation failed. Roll back with: relgraph rollback {}\n",
                backup
            ));
        }
        CliResult::error(output)
    }
}

async fn execute_post_validate<S: KeyValueStore>(engine: &MigrationEngine<S>) -> CliResult {
    let collections = match engine.load_collections().await {
        Ok(c) => c,
        Err(e) => return CliResult::error(format!("Failed to load collections: {}", e)),
    };
    let report = MigrationValidator::new().post_validate(&collections);
    let output = format_post_validation(&report);

    if report.data_preserved && report.relationships_valid {
        CliResult::success(output)
    } else {
        CliResult::error(output)
    }
}

async fn execute_rollback<S: KeyValueStore>(
    engine: &MigrationEngine<S>,
    backup_key: &str,
) -> CliResult {
    match engine.rollback(backup_key).await {
        Ok(true) => CliResult::success(format!("Restored collections from {}\n", backup_key)),
        Ok(false) => CliResult::error(format!("No backup found under {}\n", backup_key)),
        Err(e) => CliResult::error(format!("Rollback failed: {}\n", e)),
    }
}

async fn execute_status<S: KeyValueStore>(engine: &MigrationEngine<S>) -> CliResult {
    match engine.status().await {
        Ok(Some(status)) => CliResult::success(format!(
            "Migration v{} completed at {} ({} entities migrated, backup {})\n",
            status.version,
            status.completed_at.to_rfc3339(),
            status.migrated_count,
            status.backup_key.as_deref().unwrap_or("-")
        )),
        Ok(None) => CliResult::success("No completed migration recorded\n"),
        Err(e) => CliResult::error(format!("Failed to read status: {}\n", e)),
    }
}

fn format_issues(output: &mut String, issues: &[ValidationIssue]) {
    if issues.is_empty() {
        output.push_str("No issues found ✓\n");
        return;
    }
    output.push_str(&format!("Issues ({}):\n", issues.len()));
    for issue in issues {
        output.push_str(&format!("  {}\n", issue));
    }
}

fn format_pre_validation(report: &PreMigrationValidation) -> String {
    let stats = &report.statistics;
    let mut output = String::new();
    output.push_str("\nPre-Migration Validation\n");
    output.push_str(RULE);
    output.push_str(&format!(
        "Entities: {} (tasks {}, notes {}, sessions {})\n",
        stats.total_entities, stats.tasks, stats.notes, stats.sessions
    ));
    output.push_str(&format!("Already migrated: {}\n", stats.already_migrated));
    output.push_str(&format!("Eligible: {}\n", stats.eligible_for_migration));
    output.push_str(&format!(
        "Estimated relationships: {}\n",
        stats.estimated_relationships
    ));
    output.push_str(&format!(
        "Estimated duration: {} ms\n\n",
        report.performance.estimated_duration_ms
    ));
    format_issues(&mut output, &report.issues);
    output.push_str(if report.can_proceed {
        "\nReady to migrate ✓\n"
    } else {
        "\nCannot proceed ✗\n"
    });
    output
}

fn format_post_validation(report: &PostMigrationValidation) -> String {
    let stats = &report.statistics;
    let mut output = String::new();
    output.push_str("\nPost-Migration Validation\n");
    output.push_str(RULE);
    output.push_str(&format!(
        "Migrated entities: {}/{}\n",
        stats.migrated_entities, stats.total_entities
    ));
    output.push_str(&format!(
        "Relationships: {} ({} invalid)\n",
        stats.total_relationships, stats.invalid_relationships
    ));
    output.push_str(&format!(
        "Bidirectional pairs validated: {}\n",
        stats.bidirectional_pairs_validated
    ));
    output.push_str(&format!(
        "Orphaned references: {}\n\n",
        stats.orphaned_references_removed
    ));
    format_issues(&mut output, &report.issues);
    output.push_str(&format!(
        "\nData preserved: {}  Relationships valid: {}\n",
        if report.data_preserved { "yes" } else { "no" },
        if report.relationships_valid { "yes" } else { "no" }
    ));
    output
}
