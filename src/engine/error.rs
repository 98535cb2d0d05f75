use serde::Serialize;
use thiserror::Error;

use super::checklist::ChecklistFailure;
use crate::markdown::ParseError;
use crate::models::{DocKind, RequirementId, TaskId, TaskStatus};
use crate::store::StoreError;

/// Errors raised by the workflow engine.
///
/// Construction errors (`CyclicDependency`, `UnknownDependency`,
/// `DuplicateTask`, `Malformed`) abort a whole scheduling run. `Rejected`
/// is the expected, user-facing refusal of a single operation and never
/// aborts other operations in a batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("cyclic dependency: {}", join_ids(.cycle, " -> "))]
    CyclicDependency { cycle: Vec<TaskId> },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("task {task} links unknown requirement {requirement}")]
    UnknownRequirement {
        task: TaskId,
        requirement: RequirementId,
    },

    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),

    #[error("malformed tasks document: {0}")]
    Malformed(#[from] ParseError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task {task} is unverifiable: {reason}")]
    Unverifiable { task: TaskId, reason: String },

    #[error("write conflict on {kind} of project {project} after {attempts} attempt(s)")]
    Conflict {
        project: String,
        kind: DocKind,
        attempts: u32,
    },

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("storage error: {0}")]
    Store(#[source] StoreError),
}

impl EngineError {
    /// Whether the error is scoped to a single task rather than the run.
    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_)
                | Self::NotFound(_)
                | Self::InvalidInput(_)
                | Self::CyclicDependency { .. }
                | Self::UnknownDependency { .. }
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { project, kind } => {
                Self::NotFound(format!("{} document of project {}", kind, project))
            }
            StoreError::ProjectNotFound(project) => {
                Self::NotFound(format!("project {}", project))
            }
            StoreError::Conflict { project, kind } => Self::Conflict {
                project,
                kind,
                attempts: 1,
            },
            other => Self::Store(other),
        }
    }
}

/// A refused status transition or checklist edit.
///
/// Carries the status the task kept so callers can report why nothing
/// changed.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("task {task} stays {previous}: {reason}")]
pub struct Rejection {
    pub task: TaskId,
    pub previous: TaskStatus,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("incomplete checklist ({failure})")]
    IncompleteChecklist {
        failure: ChecklistFailure,
        /// Text of every unchecked criterion.
        unchecked: Vec<String>,
    },

    #[error("unmet dependencies: {}", join_ids(.unmet, ", "))]
    UnmetDependency { unmet: Vec<TaskId> },

    #[error("no transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("checklist of a done task cannot gain unchecked criteria; reset the task first")]
    ChecklistLocked,
}

pub(crate) fn join_ids(ids: &[TaskId], separator: &str) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}
