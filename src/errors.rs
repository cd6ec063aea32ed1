//! Typed error hierarchy for the task board.
//!
//! `BoardError` covers everything the library can fail with: store
//! failures, missing documents, and user actions that need a selected
//! project. Application code (CLI, config loading) wraps these in
//! `anyhow` at the boundary.

use thiserror::Error;

/// Errors from the board session and the document store.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: String },

    #[error("Task {id} not found")]
    TaskNotFound { id: String },

    #[error("Please select a project first")]
    NoProjectSelected,

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for BoardError {
    fn from(err: rusqlite::Error) -> Self {
        BoardError::Database(err.into())
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
