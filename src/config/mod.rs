use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::storage::StorageKeys;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub keys: StorageKeys,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                AppError::Config {
                    message: format!(
                        "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{}'",
                        raw
                    ),
                }
            })?,
            Err(_) => 5,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/relgraph.db".to_string()),
            ),
            max_connections,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = StorageKeys::default();
        let keys = StorageKeys {
            domain: non_empty_var("RELGRAPH_DOMAIN").unwrap_or(defaults.domain),
            tasks: non_empty_var("RELGRAPH_TASKS_KEY").unwrap_or(defaults.tasks),
            notes: non_empty_var("RELGRAPH_NOTES_KEY").unwrap_or(defaults.notes),
            sessions: non_empty_var("RELGRAPH_SESSIONS_KEY").unwrap_or(defaults.sessions),
        };

        Ok(Config {
            database,
            logging,
            keys,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/relgraph.db"),
            max_connections: 5,
        }
    }
}
