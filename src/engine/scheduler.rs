//! Scheduling over an immutable graph snapshot.
//!
//! Everything here is a pure function of the graph. Running it twice on
//! the same snapshot gives the same answer, and nothing is mutated, so any
//! number of threads may schedule the same graph at once.

use std::collections::HashSet;

use serde::Serialize;

use super::graph::TaskGraph;
use crate::models::{TaskId, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// NotStarted tasks whose dependencies are all Done, in declaration order.
    pub ready: Vec<TaskId>,
    /// Sets of ready tasks that may run concurrently.
    pub parallel_groups: Vec<Vec<TaskId>>,
    /// Pairs of ready tasks that together gate the same dependent.
    pub contention: Vec<Contention>,
    /// Longest dependency chain, source first.
    pub critical_path: Vec<TaskId>,
    pub phases: Vec<Vec<TaskId>>,
    pub progress: Progress,
}

/// Two ready tasks that are the last pending dependencies of `dependent`.
///
/// Informational only: they can still run in parallel, but `dependent`
/// waits for both, so finishing them together matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contention {
    pub first: TaskId,
    pub second: TaskId,
    pub dependent: TaskId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub done: usize,
}

pub fn schedule(graph: &TaskGraph) -> Schedule {
    let ready = ready_tasks(graph);
    Schedule {
        parallel_groups: parallel_groups(&ready),
        contention: contention(graph, &ready),
        critical_path: critical_path(graph),
        phases: graph.phases(),
        progress: progress(graph),
        ready,
    }
}

pub fn ready_tasks(graph: &TaskGraph) -> Vec<TaskId> {
    graph
        .tasks()
        .filter(|task| task.status == TaskStatus::NotStarted)
        .filter(|task| {
            task.dependencies
                .iter()
                .all(|dep| graph.get(dep.as_str()).map(|t| t.status) == Some(TaskStatus::Done))
        })
        .map(|task| task.id.clone())
        .collect()
}

/// Ready tasks never depend on each other (each one's dependencies are
/// all Done already), so the whole ready set forms a single group.
pub fn parallel_groups(ready: &[TaskId]) -> Vec<Vec<TaskId>> {
    if ready.is_empty() {
        Vec::new()
    } else {
        vec![ready.to_vec()]
    }
}

pub fn contention(graph: &TaskGraph, ready: &[TaskId]) -> Vec<Contention> {
    let ready: HashSet<&TaskId> = ready.iter().collect();
    let mut pairs = Vec::new();

    for dependent in graph.tasks().filter(|t| t.status != TaskStatus::Done) {
        let pending: Vec<&TaskId> = dependent
            .dependencies
            .iter()
            .filter(|dep| graph.get(dep.as_str()).map(|t| t.status) != Some(TaskStatus::Done))
            .collect();
        if pending.len() < 2 || !pending.iter().all(|dep| ready.contains(dep)) {
            continue;
        }

        let mut pending = pending;
        pending.sort_by_key(|dep| graph.position(dep.as_str()));
        for (i, first) in pending.iter().enumerate() {
            for second in &pending[i + 1..] {
                pairs.push(Contention {
                    first: (*first).clone(),
                    second: (*second).clone(),
                    dependent: dependent.id.clone(),
                });
            }
        }
    }
    pairs
}

/// Longest chain by node count, computed over a topological order.
///
/// Ties go to the chain whose source was declared first, then to the
/// earlier declared sink.
pub fn critical_path(graph: &TaskGraph) -> Vec<TaskId> {
    struct Best {
        len: usize,
        source: usize,
        pred: Option<usize>,
    }

    let order = graph.topological_order();
    let mut best: Vec<Option<Best>> = (0..graph.len()).map(|_| None).collect();

    for task in &order {
        let Some(pos) = graph.position(task.id.as_str()) else {
            continue;
        };
        let mut entry = Best {
            len: 1,
            source: pos,
            pred: None,
        };
        for dep in &task.dependencies {
            let Some(dep_pos) = graph.position(dep.as_str()) else {
                continue;
            };
            let Some(candidate) = &best[dep_pos] else {
                continue;
            };
            let better = candidate.len + 1 > entry.len
                || (candidate.len + 1 == entry.len && candidate.source < entry.source);
            if better {
                entry = Best {
                    len: candidate.len + 1,
                    source: candidate.source,
                    pred: Some(dep_pos),
                };
            }
        }
        best[pos] = Some(entry);
    }

    let sink = best
        .iter()
        .enumerate()
        .filter_map(|(pos, b)| b.as_ref().map(|b| (pos, b)))
        .min_by_key(|(pos, b)| (std::cmp::Reverse(b.len), b.source, *pos))
        .map(|(pos, _)| pos);

    let tasks: Vec<_> = graph.tasks().collect();
    let mut path = Vec::new();
    let mut cursor = sink;
    while let Some(pos) = cursor {
        path.push(tasks[pos].id.clone());
        cursor = best[pos].as_ref().and_then(|b| b.pred);
    }
    path.reverse();
    path
}

pub fn progress(graph: &TaskGraph) -> Progress {
    graph.tasks().fold(Progress::default(), |mut p, task| {
        p.total += 1;
        match task.status {
            TaskStatus::NotStarted => p.not_started += 1,
            TaskStatus::InProgress => p.in_progress += 1,
            TaskStatus::Done => p.done += 1,
        }
        p
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskInput;

    fn ids(values: &[&str]) -> Vec<TaskId> {
        values.iter().map(|v| TaskId::new(*v)).collect()
    }

    #[test]
    fn empty_graph_schedules_nothing() {
        let schedule = schedule(&TaskGraph::default());
        assert_eq!(schedule, Schedule::default());
    }

    #[test]
    fn critical_path_prefers_the_earlier_source() {
        // Two chains of equal length: T-3 -> T-4 and T-1 -> T-2.
        let graph = TaskGraph::build(vec![
            TaskInput::new("T-3", "c"),
            TaskInput::new("T-4", "d").depends_on("T-3"),
            TaskInput::new("T-1", "a"),
            TaskInput::new("T-2", "b").depends_on("T-1"),
        ])
        .unwrap();
        assert_eq!(critical_path(&graph), ids(&["T-3", "T-4"]));
    }

    #[test]
    fn critical_path_follows_the_longest_branch() {
        let graph = TaskGraph::build(vec![
            TaskInput::new("T-1", "root"),
            TaskInput::new("T-2", "short").depends_on("T-1"),
            TaskInput::new("T-3", "long").depends_on("T-1"),
            TaskInput::new("T-4", "longer").depends_on("T-3"),
            TaskInput::new("T-5", "join").depends_on("T-2").depends_on("T-4"),
        ])
        .unwrap();
        assert_eq!(critical_path(&graph), ids(&["T-1", "T-3", "T-4", "T-5"]));
    }

    #[test]
    fn contention_needs_every_pending_dependency_ready() {
        let graph = TaskGraph::build(vec![
            TaskInput::new("T-1", "a"),
            TaskInput::new("T-2", "b"),
            TaskInput::new("T-3", "c").depends_on("T-1").depends_on("T-2"),
            TaskInput::new("T-4", "d").depends_on("T-1").depends_on("T-3"),
        ])
        .unwrap();
        let ready = ready_tasks(&graph);
        assert_eq!(
            contention(&graph, &ready),
            vec![Contention {
                first: TaskId::new("T-1"),
                second: TaskId::new("T-2"),
                dependent: TaskId::new("T-3"),
            }]
        );
    }

    #[test]
    fn progress_counts_each_status() {
        let graph = TaskGraph::build(vec![
            TaskInput::new("T-1", "a").status(TaskStatus::Done),
            TaskInput::new("T-2", "b").status(TaskStatus::InProgress),
            TaskInput::new("T-3", "c"),
        ])
        .unwrap();
        assert_eq!(
            progress(&graph),
            Progress {
                total: 3,
                not_started: 1,
                in_progress: 1,
                done: 1
            }
        );
    }
}
