//! Document storage with optimistic concurrency.
//!
//! Two backends implement the same traits: [`Database`](crate::db::Database)
//! keeps documents in SQLite, [`FileStore`] keeps them in a project's
//! `.spec/` directory.

mod file;

use thiserror::Error;

use crate::models::{DocKind, TaskEvent, Version, Versioned};

pub use file::FileStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} document of project {project} not found")]
    NotFound { project: String, kind: DocKind },

    #[error("{kind} document of project {project} changed since it was read")]
    Conflict { project: String, kind: DocKind },

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value access to a project's named documents.
///
/// `write` is a compare-and-swap: `expected` is the version the caller last
/// read, or `None` when the caller expects the document not to exist yet.
/// Any mismatch fails with [`StoreError::Conflict`] and stores nothing.
pub trait DocumentStore {
    fn read(&self, project: &str, kind: DocKind) -> Result<Versioned, StoreError>;

    fn write(
        &self,
        project: &str,
        kind: DocKind,
        content: &str,
        expected: Option<&Version>,
    ) -> Result<Version, StoreError>;

    fn exists(&self, project: &str, kind: DocKind) -> Result<bool, StoreError> {
        match self.read(project, kind) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Append-only record of task changes.
pub trait AuditLog {
    fn record(&self, event: &TaskEvent) -> Result<(), StoreError>;

    /// Events of a project in the order they were recorded, optionally
    /// narrowed to one task.
    fn events(&self, project: &str, task: Option<&str>) -> Result<Vec<TaskEvent>, StoreError>;
}

/// Compare a stored version against what the writer expected.
pub(crate) fn version_matches(current: Option<&Version>, expected: Option<&Version>) -> bool {
    current == expected
}
