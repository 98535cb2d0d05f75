use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, TaskGraph, Transition};
use crate::models::{EventKind, TaskEvent, TaskId, TaskStatus};

/// A single mutation of the Tasks document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskOp {
    /// NotStarted → InProgress.
    Claim { task: TaskId },
    /// → Done, claiming first when the task was never started.
    Complete { task: TaskId },
    /// Any status back to NotStarted.
    Reset { task: TaskId },
    /// Flip one criterion; `index` is 0-based.
    ToggleCriterion { task: TaskId, index: usize },
    AddCriterion { task: TaskId, text: String },
    SetDependencies {
        task: TaskId,
        dependencies: Vec<TaskId>,
    },
}

impl TaskOp {
    pub fn task(&self) -> &TaskId {
        match self {
            Self::Claim { task }
            | Self::Complete { task }
            | Self::Reset { task }
            | Self::ToggleCriterion { task, .. }
            | Self::AddCriterion { task, .. }
            | Self::SetDependencies { task, .. } => task,
        }
    }
}

/// Apply one operation to the graph and return the audit events it produced.
///
/// The graph is left untouched when the operation fails.
pub fn apply_op(graph: &mut TaskGraph, project: &str, op: &TaskOp) -> Result<Vec<TaskEvent>, EngineError> {
    let id = op.task().as_str();
    match op {
        TaskOp::Claim { .. } => {
            let transition = graph.set_status(id, TaskStatus::InProgress)?;
            Ok(vec![forward(project, transition)])
        }
        TaskOp::Complete { .. } => {
            let transitions = graph.complete(id)?;
            Ok(transitions
                .into_iter()
                .map(|t| forward(project, t))
                .collect())
        }
        TaskOp::Reset { .. } => {
            let transition = graph.reset(id)?;
            tracing::warn!(
                event = "reset",
                project,
                task = %transition.task,
                from = transition.from.as_str(),
                "Task reset to not started"
            );
            Ok(vec![TaskEvent::reset(project, &transition.task, transition.from)])
        }
        TaskOp::ToggleCriterion { task, index } => {
            let checked = graph.toggle_criterion(id, *index)?;
            let detail = format!(
                "criterion {} {}",
                index + 1,
                if checked { "checked" } else { "unchecked" }
            );
            tracing::info!(project, task = %task, %detail, "Criterion toggled");
            Ok(vec![TaskEvent::edit(project, task, EventKind::CriterionToggled, detail)])
        }
        TaskOp::AddCriterion { task, text } => {
            let index = graph.add_criterion(id, text)?;
            tracing::info!(project, task = %task, index, "Criterion added");
            Ok(vec![TaskEvent::edit(
                project,
                task,
                EventKind::CriterionAdded,
                text.trim().to_string(),
            )])
        }
        TaskOp::SetDependencies { task, dependencies } => {
            graph.set_dependencies(id, dependencies.clone())?;
            let current = graph.dependencies_of(id)?;
            let detail = if current.is_empty() {
                "None".to_string()
            } else {
                crate::engine::join_ids(current, ", ")
            };
            tracing::info!(project, task = %task, dependencies = %detail, "Dependencies changed");
            Ok(vec![TaskEvent::edit(
                project,
                task,
                EventKind::DependenciesChanged,
                detail,
            )])
        }
    }
}

fn forward(project: &str, transition: Transition) -> TaskEvent {
    tracing::info!(
        project,
        task = %transition.task,
        from = transition.from.as_str(),
        to = transition.to.as_str(),
        "Task status changed"
    );
    TaskEvent::transition(project, &transition.task, transition.from, transition.to)
}
