use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{TaskId, TaskStatus};

/// An append-only audit record of a change made to a task.
///
/// Forward transitions and resets are recorded as different kinds so the
/// history of a task shows administrative re-opens apart from organic
/// progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEvent {
    pub id: Uuid,
    pub project_id: String,
    pub task_id: TaskId,
    pub kind: EventKind,
    pub from: Option<TaskStatus>,
    pub to: Option<TaskStatus>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    fn new(project_id: &str, task_id: &TaskId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            task_id: task_id.clone(),
            kind,
            from: None,
            to: None,
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn transition(project_id: &str, task_id: &TaskId, from: TaskStatus, to: TaskStatus) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::new(project_id, task_id, EventKind::Transition)
        }
    }

    pub fn reset(project_id: &str, task_id: &TaskId, from: TaskStatus) -> Self {
        Self {
            from: Some(from),
            to: Some(TaskStatus::NotStarted),
            ..Self::new(project_id, task_id, EventKind::Reset)
        }
    }

    pub fn edit(project_id: &str, task_id: &TaskId, kind: EventKind, detail: String) -> Self {
        Self {
            detail: Some(detail),
            ..Self::new(project_id, task_id, kind)
        }
    }
}

/// What kind of change an event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A forward status transition
    Transition,
    /// An explicit reset back to NotStarted
    Reset,
    CriterionToggled,
    CriterionAdded,
    DependenciesChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::Reset => "reset",
            Self::CriterionToggled => "criterion_toggled",
            Self::CriterionAdded => "criterion_added",
            Self::DependenciesChanged => "dependencies_changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transition" => Some(Self::Transition),
            "reset" => Some(Self::Reset),
            "criterion_toggled" => Some(Self::CriterionToggled),
            "criterion_added" => Some(Self::CriterionAdded),
            "dependencies_changed" => Some(Self::DependenciesChanged),
            _ => None,
        }
    }
}
