//! The task status state machine.
//!
//! Forward moves only: NotStarted → InProgress (claim, unconditional) and
//! InProgress → Done (gated). Moving back to NotStarted is the separate
//! reset operation on [`TaskGraph`].

use serde::Serialize;

use super::checklist::{decide, Decision};
use super::error::{RejectReason, Rejection};
use super::graph::TaskGraph;
use crate::models::{Task, TaskId, TaskStatus};

/// A status change that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub task: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

pub fn check_transition(graph: &TaskGraph, task: &Task, to: TaskStatus) -> Result<(), Rejection> {
    match (task.status, to) {
        (TaskStatus::NotStarted, TaskStatus::InProgress) => Ok(()),
        (TaskStatus::InProgress, TaskStatus::Done) => check_completion(graph, task),
        (from, to) => Err(Rejection {
            task: task.id.clone(),
            previous: task.status,
            reason: RejectReason::InvalidTransition { from, to },
        }),
    }
}

/// Whether `task` may be marked Done: every dependency Done first, then a
/// passing checklist.
pub fn check_completion(graph: &TaskGraph, task: &Task) -> Result<(), Rejection> {
    match completion_problem(graph, task) {
        Some(reason) => Err(Rejection {
            task: task.id.clone(),
            previous: task.status,
            reason,
        }),
        None => Ok(()),
    }
}

fn completion_problem(graph: &TaskGraph, task: &Task) -> Option<RejectReason> {
    let unmet = unmet_dependencies(graph, task);
    if !unmet.is_empty() {
        return Some(RejectReason::UnmetDependency { unmet });
    }

    match decide(&task.criteria) {
        Decision::Pass => None,
        Decision::Fail(failure) => Some(RejectReason::IncompleteChecklist {
            failure,
            unchecked: task.unchecked_criteria().map(|c| c.text.clone()).collect(),
        }),
    }
}

/// Dependencies of `task` that are not Done yet, in declaration order.
pub fn unmet_dependencies(graph: &TaskGraph, task: &Task) -> Vec<TaskId> {
    task.dependencies
        .iter()
        .filter(|dep| graph.get(dep.as_str()).map(|t| t.status) != Some(TaskStatus::Done))
        .cloned()
        .collect()
}

/// A persisted status that breaks the completion contract, typically left
/// behind by a hand edit or by resetting a dependency of a Done task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusViolation {
    pub task: TaskId,
    pub status: TaskStatus,
    pub reason: RejectReason,
}

/// Report every Done task that would not be allowed to become Done now.
pub fn validate_statuses(graph: &TaskGraph) -> Vec<StatusViolation> {
    graph
        .tasks()
        .filter(|task| task.status == TaskStatus::Done)
        .filter_map(|task| {
            completion_problem(graph, task).map(|reason| StatusViolation {
                task: task.id.clone(),
                status: task.status,
                reason,
            })
        })
        .collect()
}
