use crate::domain::error::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("data service request failed: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("task tree rejected the change: {0}")]
    Tree(#[from] TreeError),
}
