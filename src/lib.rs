//! # relgraph
//!
//! A typed, bidirectional relationship graph for work-session entities
//! (tasks, notes and sessions), together with the machinery that moves
//! legacy foreign-key fields (`noteId`, `sourceSessionId`, `topicIds`, ...)
//! into that graph safely.
//!
//! ## Features
//!
//! - **Relationship registry**: constant rules for every relationship type
//! - **Inline edges**: each entity owns its outgoing [`Relationship`]s
//! - **Migration**: idempotent, backup-first, best-effort per entity
//! - **Validation**: pre-migration gating and post-migration certification
//! - **Rollback**: full restore from a timestamped backup
//! - **Relationship CRUD**: typed errors for single-edge operations
//!
//! ## Architecture
//!
//! ```text
//! KeyValueStore → MigrationValidator::pre_validate → MigrationEngine::migrate
//!                                                          ↓
//!                  rollback ← MigrationValidator::post_validate
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relgraph::migration::{MigrationEngine, MigrationOptions, MigrationValidator};
//! use relgraph::storage::{MemoryStore, StorageKeys};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = MigrationEngine::new(Arc::new(MemoryStore::new()), StorageKeys::default());
//!     let mut collections = engine.load_collections().await?;
//!     if MigrationValidator::new().pre_validate(&collections).can_proceed {
//!         let result = engine.migrate(&mut collections, &MigrationOptions::default()).await?;
//!         let check = MigrationValidator::new().post_validate(&collections);
//!         if !check.data_preserved {
//!             engine.rollback(result.backup_path.as_deref().unwrap_or_default()).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// Command-line subcommands.
pub mod cli;
/// Configuration management.
pub mod config;
/// Entities that own relationships.
pub mod entities;
/// Error types and result aliases.
pub mod error;
/// Single-relationship create/remove operations.
pub mod manager;
/// Legacy field migration and validation.
pub mod migration;
/// Relationship model and type registry.
pub mod relationships;
/// Key-value storage collaborator.
pub mod storage;

pub use config::Config;
pub use entities::{EntityCollections, HasRelationships, Note, Session, Task};
pub use error::{AppError, AppResult, RelationshipError, RelationshipResult};
pub use manager::{AddRelationship, RelationshipManager};
pub use migration::{MigrationEngine, MigrationOptions, MigrationResult, MigrationValidator};
pub use relationships::{
    EntityType, Relationship, RelationshipMetadata, RelationshipSource, RelationshipType,
};
