//! Workflow handlers: stateless functions over an explicit store.
//!
//! Every mutating handler runs the same loop: read the Tasks document,
//! parse it, build the graph, apply the change, render the patched
//! document and write it back conditioned on the version that was read.
//! When another writer got there first the loop starts over from a fresh
//! read, up to [`RetryPolicy::max_attempts`] times.

mod ops;

use serde::Serialize;

use crate::engine::{
    self, validate_statuses, EngineError, Rejection, Schedule, StatusViolation, TaskGraph,
    TraceabilityReport, Verification,
};
use crate::markdown::{is_task_id, parse_plan, render_new, TasksDocument};
use crate::models::{DocKind, DocumentInfo, SteeringKind, TaskEvent, TaskId, TaskInput, TaskStatus, Version};
use crate::store::{AuditLog, DocumentStore, StoreError};

pub use ops::{apply_op, TaskOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Result of a mutation that was persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    /// Version of the Tasks document after the change.
    pub version: Version,
    pub events: Vec<TaskEvent>,
    /// How many read-modify-write rounds it took.
    pub attempts: u32,
}

/// The scheduling report for one project.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub project: String,
    pub version: Version,
    pub tasks: Vec<TaskSummary>,
    pub schedule: Schedule,
    /// PASS/FAIL per task, in declaration order.
    pub verification: Vec<Verification>,
    pub violations: Vec<StatusViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpOutcome {
    Applied { events: Vec<TaskEvent> },
    Rejected { rejection: Rejection },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub op: TaskOp,
    #[serde(flatten)]
    pub outcome: OpOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub version: Version,
    pub attempts: u32,
    pub results: Vec<OpResult>,
}

fn load(store: &impl DocumentStore, project: &str) -> Result<(Version, TasksDocument, TaskGraph), EngineError> {
    let current = store.read(project, DocKind::Tasks)?;
    let document = TasksDocument::parse(&current.content)?;
    let graph = TaskGraph::build(document.tasks().to_vec())?;
    Ok((current.version, document, graph))
}

/// Run `change` inside the bounded read-modify-write loop.
///
/// Events are recorded only once the write succeeded. An unchanged document
/// is not written at all.
fn mutate<S, T>(
    store: &S,
    project: &str,
    policy: RetryPolicy,
    mut change: impl FnMut(&mut TaskGraph) -> Result<(T, Vec<TaskEvent>), EngineError>,
) -> Result<(T, Applied), EngineError>
where
    S: DocumentStore + AuditLog,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let current = store.read(project, DocKind::Tasks)?;
        let document = TasksDocument::parse(&current.content)?;
        let mut graph = TaskGraph::build(document.tasks().to_vec())?;

        let (value, events) = change(&mut graph)?;

        let rendered = document.render(&graph);
        let version = if rendered == current.content {
            current.version
        } else {
            match store.write(project, DocKind::Tasks, &rendered, Some(&current.version)) {
                Ok(version) => version,
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(project, attempt, "Tasks document changed since read, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Committed; audit failures are logged, not returned.
        for event in &events {
            if let Err(e) = store.record(event) {
                tracing::warn!(project, task = %event.task_id, error = %e, "Failed to record task event");
            }
        }
        return Ok((
            value,
            Applied {
                version,
                events,
                attempts: attempt,
            },
        ));
    }

    tracing::warn!(project, attempts = max_attempts, "Giving up on conflicting writes");
    Err(EngineError::Conflict {
        project: project.to_string(),
        kind: DocKind::Tasks,
        attempts: max_attempts,
    })
}

/// Apply one operation with retry.
pub fn apply<S>(store: &S, project: &str, op: &TaskOp, policy: RetryPolicy) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    let ((), applied) = mutate(store, project, policy, |graph| {
        Ok(((), apply_op(graph, project, op)?))
    })?;
    Ok(applied)
}

pub fn claim_task<S>(store: &S, project: &str, task: &str, policy: RetryPolicy) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    apply(store, project, &TaskOp::Claim { task: task.into() }, policy)
}

pub fn complete_task<S>(store: &S, project: &str, task: &str, policy: RetryPolicy) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    apply(store, project, &TaskOp::Complete { task: task.into() }, policy)
}

pub fn reset_task<S>(store: &S, project: &str, task: &str, policy: RetryPolicy) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    apply(store, project, &TaskOp::Reset { task: task.into() }, policy)
}

pub fn toggle_criterion<S>(
    store: &S,
    project: &str,
    task: &str,
    index: usize,
    policy: RetryPolicy,
) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    let op = TaskOp::ToggleCriterion {
        task: task.into(),
        index,
    };
    apply(store, project, &op, policy)
}

pub fn add_criterion<S>(
    store: &S,
    project: &str,
    task: &str,
    text: &str,
    policy: RetryPolicy,
) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    let op = TaskOp::AddCriterion {
        task: task.into(),
        text: text.to_string(),
    };
    apply(store, project, &op, policy)
}

pub fn set_dependencies<S>(
    store: &S,
    project: &str,
    task: &str,
    dependencies: Vec<TaskId>,
    policy: RetryPolicy,
) -> Result<Applied, EngineError>
where
    S: DocumentStore + AuditLog,
{
    let op = TaskOp::SetDependencies {
        task: task.into(),
        dependencies,
    };
    apply(store, project, &op, policy)
}

/// Apply several operations against one snapshot and persist them with a
/// single write.
///
/// A rejected or failing operation is reported in its slot and does not
/// stop the others. Problems with the document itself abort the batch.
pub fn apply_batch<S>(store: &S, project: &str, ops: &[TaskOp], policy: RetryPolicy) -> Result<BatchOutcome, EngineError>
where
    S: DocumentStore + AuditLog,
{
    let (results, applied) = mutate(store, project, policy, |graph| {
        let mut results = Vec::with_capacity(ops.len());
        let mut events = Vec::new();
        for op in ops {
            let outcome = match apply_op(graph, project, op) {
                Ok(op_events) => {
                    events.extend(op_events.iter().cloned());
                    OpOutcome::Applied { events: op_events }
                }
                Err(EngineError::Rejected(rejection)) => {
                    tracing::info!(project, task = %rejection.task, reason = %rejection.reason, "Operation rejected");
                    OpOutcome::Rejected { rejection }
                }
                Err(e) if e.is_task_scoped() => OpOutcome::Failed {
                    error: e.to_string(),
                },
                Err(e) => return Err(e),
            };
            results.push(OpResult {
                op: op.clone(),
                outcome,
            });
        }
        Ok((results, events))
    })?;

    Ok(BatchOutcome {
        version: applied.version,
        attempts: applied.attempts,
        results,
    })
}

/// Compute the scheduling report for the project's current Tasks document.
pub fn schedule(store: &impl DocumentStore, project: &str) -> Result<ScheduleReport, EngineError> {
    let (version, _, graph) = load(store, project)?;
    let violations = validate_statuses(&graph);
    for violation in &violations {
        tracing::warn!(project, task = %violation.task, reason = %violation.reason, "Status violates completion contract");
    }

    Ok(ScheduleReport {
        project: project.to_string(),
        version,
        tasks: graph
            .tasks()
            .map(|t| TaskSummary {
                id: t.id.clone(),
                title: t.title.clone(),
                status: t.status,
            })
            .collect(),
        schedule: engine::schedule(&graph),
        verification: graph.tasks().map(engine::verify).collect(),
        violations,
    })
}

/// Verify one task straight from the stored text.
pub fn verify_task(store: &impl DocumentStore, project: &str, task: &str) -> Result<Verification, EngineError> {
    let current = store.read(project, DocKind::Tasks)?;
    engine::verify_in_document(&current.content, task)
}

/// Create the Tasks document from a decomposed plan.
///
/// Requires the Plan to exist and every requirement link to name one of its
/// requirements. New tasks always start NotStarted. Fails with `Conflict`
/// when a Tasks document already exists.
pub fn create_tasks<S>(store: &S, project: &str, tasks: Vec<TaskInput>) -> Result<Version, EngineError>
where
    S: DocumentStore,
{
    let plan = parse_plan(&store.read(project, DocKind::Plan)?.content);

    for task in &tasks {
        check_new_task(task)?;
        if let Some(status) = task.status.filter(|s| *s != TaskStatus::NotStarted) {
            return Err(EngineError::InvalidInput(format!(
                "new task {} must start not started, got {}",
                task.id,
                status.as_str()
            )));
        }
        if let Some(requirement) = task
            .requirements
            .iter()
            .find(|r| plan.requirement(r.as_str()).is_none())
        {
            return Err(EngineError::UnknownRequirement {
                task: task.id.clone(),
                requirement: requirement.clone(),
            });
        }
    }

    let graph = TaskGraph::build(tasks)?;
    let content = render_new(graph.tasks());
    let version = store.write(project, DocKind::Tasks, &content, None)?;
    tracing::info!(project, tasks = graph.len(), version = %version, "Tasks document created");
    Ok(version)
}

/// Reject input that `render_new` would not write back faithfully: ids that
/// are not `T-<n>` and text spanning several lines.
fn check_new_task(task: &TaskInput) -> Result<(), EngineError> {
    if let Some(id) = std::iter::once(&task.id)
        .chain(&task.dependencies)
        .find(|id| !is_task_id(id.as_str()))
    {
        return Err(EngineError::InvalidInput(format!(
            "task id {:?} is not of the form T-<n>",
            id.as_str()
        )));
    }
    if is_multiline(&task.title) {
        return Err(EngineError::InvalidInput(format!(
            "title of task {} must be a single line",
            task.id
        )));
    }
    if task
        .criteria
        .iter()
        .any(|c| c.text.trim().is_empty() || is_multiline(&c.text))
    {
        return Err(EngineError::InvalidInput(format!(
            "criteria of task {} must be single non-empty lines",
            task.id
        )));
    }
    Ok(())
}

fn is_multiline(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

/// Existence and version of every document the project can hold.
pub fn steering_status(store: &impl DocumentStore, project: &str) -> Result<Vec<DocumentInfo>, EngineError> {
    let kinds = SteeringKind::ALL
        .into_iter()
        .map(DocKind::Steering)
        .chain([DocKind::Plan, DocKind::Tasks]);

    let mut documents = Vec::new();
    for kind in kinds {
        let info = match store.read(project, kind) {
            Ok(doc) => DocumentInfo {
                kind,
                exists: true,
                version: Some(doc.version),
            },
            Err(StoreError::NotFound { .. }) => DocumentInfo {
                kind,
                exists: false,
                version: None,
            },
            Err(e) => return Err(e.into()),
        };
        documents.push(info);
    }
    Ok(documents)
}

/// Requirement coverage and EARS lint over the Plan and Tasks documents.
pub fn traceability(store: &impl DocumentStore, project: &str) -> Result<TraceabilityReport, EngineError> {
    let plan = parse_plan(&store.read(project, DocKind::Plan)?.content);
    let (_, _, graph) = load(store, project)?;
    Ok(engine::traceability(&plan, &graph))
}

pub fn history(store: &impl AuditLog, project: &str, task: Option<&str>) -> Result<Vec<TaskEvent>, EngineError> {
    Ok(store.events(project, task)?)
}
