use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("task tree has not finished loading")]
    NotLoaded,
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("title must not be empty")]
    InvalidTitle,
    #[error("node cannot be moved into itself or one of its descendants")]
    CycleDetected,
    #[error("invalid parent: {0}")]
    InvalidParent(String),
    #[error("folders cannot be nested deeper than {max} levels")]
    DepthExceeded { max: usize },
    #[error("node is not a task: {0}")]
    NotATask(String),
    #[error("node is not a folder: {0}")]
    NotAFolder(String),
}
