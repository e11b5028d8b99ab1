use serde_json::Value;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Relationship error: {0}")]
    Relationship(#[from] RelationshipError),

    #[error("Migration aborted: {message}")]
    Migration { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Serialization failed for key '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Errors raised by single-relationship operations.
///
/// Every variant carries a human message and optional structured details;
/// [`RelationshipError::code`] returns the stable machine-readable code
/// callers branch on.
#[derive(Debug, Error)]
pub enum RelationshipError {
    /// Invalid type/entity combination or missing required metadata.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// The relationship already exists on the source entity.
    #[error("{message}")]
    Duplicate {
        message: String,
        details: Option<Value>,
    },

    /// A referenced relationship id does not exist.
    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<Value>,
    },

    /// The source or target entity does not exist.
    #[error("{message}")]
    EntityNotFound {
        message: String,
        details: Option<Value>,
    },

    /// A multi-step relationship operation failed to commit or roll back.
    #[error("{message}")]
    Transaction {
        message: String,
        details: Option<Value>,
    },
}

impl RelationshipError {
    pub const VALIDATION_ERROR: &'static str = "VALIDATION_ERROR";
    pub const DUPLICATE_RELATIONSHIP: &'static str = "DUPLICATE_RELATIONSHIP";
    pub const NOT_FOUND: &'static str = "NOT_FOUND";
    pub const ENTITY_NOT_FOUND: &'static str = "ENTITY_NOT_FOUND";
    pub const TRANSACTION_ERROR: &'static str = "TRANSACTION_ERROR";

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            details: None,
        }
    }

    pub fn entity_not_found(message: impl Into<String>) -> Self {
        Self::EntityNotFound {
            message: message.into(),
            details: None,
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details to the error.
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Duplicate { details, .. }
            | Self::NotFound { details, .. }
            | Self::EntityNotFound { details, .. }
            | Self::Transaction { details, .. } => *details = Some(value),
        }
        self
    }

    /// Stable error code for programmatic branching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => Self::VALIDATION_ERROR,
            Self::Duplicate { .. } => Self::DUPLICATE_RELATIONSHIP,
            Self::NotFound { .. } => Self::NOT_FOUND,
            Self::EntityNotFound { .. } => Self::ENTITY_NOT_FOUND,
            Self::Transaction { .. } => Self::TRANSACTION_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Duplicate { message, .. }
            | Self::NotFound { message, .. }
            | Self::EntityNotFound { message, .. }
            | Self::Transaction { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. }
            | Self::Duplicate { details, .. }
            | Self::NotFound { details, .. }
            | Self::EntityNotFound { details, .. }
            | Self::Transaction { details, .. } => details.as_ref(),
        }
    }
}

impl From<StorageError> for RelationshipError {
    fn from(err: StorageError) -> Self {
        RelationshipError::transaction(format!("Failed to persist relationships: {}", err))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for relationship operations
pub type RelationshipResult<T> = Result<T, RelationshipError>;
