use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::error::{EngineError, RejectReason, Rejection};
use super::status::{self, Transition};
use crate::models::{Criterion, Task, TaskId, TaskInput, TaskStatus};

/// Task dependency graph (DAG) for one project.
///
/// Tasks keep the order they were declared in. That order breaks every tie
/// in scheduling, so the same document always yields the same answers.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Construct the graph and validate it.
    ///
    /// Fails on a repeated identifier, a dependency naming an unknown task,
    /// or any cycle (a task depending on itself included).
    pub fn build(inputs: impl IntoIterator<Item = TaskInput>) -> Result<Self, EngineError> {
        let mut tasks = Vec::new();
        let mut index = HashMap::new();

        for input in inputs {
            if index.contains_key(&input.id) {
                return Err(EngineError::DuplicateTask(input.id));
            }
            index.insert(input.id.clone(), tasks.len());
            tasks.push(Task {
                id: input.id,
                title: input.title,
                status: input.status.unwrap_or(TaskStatus::NotStarted),
                criteria: input.criteria,
                dependencies: dedup(input.dependencies),
                dependents: Vec::new(),
                evidence: input.evidence,
                requirements: input.requirements,
            });
        }

        let mut graph = Self { tasks, index };
        graph.validate()?;
        graph.rebuild_dependents();
        Ok(graph)
    }

    fn validate(&self) -> Result<(), EngineError> {
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(EngineError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(EngineError::CyclicDependency { cycle });
        }
        Ok(())
    }

    fn rebuild_dependents(&mut self) {
        let index = &self.index;
        let edges: Vec<(usize, TaskId)> = self
            .tasks
            .iter()
            .flat_map(|task| {
                task.dependencies
                    .iter()
                    .filter_map(move |dep| index.get(dep).map(|&pos| (pos, task.id.clone())))
            })
            .collect();

        for task in &mut self.tasks {
            task.dependents.clear();
        }
        for (pos, dependent) in edges {
            self.tasks[pos].dependents.push(dependent);
        }
    }

    /// Detect circular dependencies using DFS.
    ///
    /// Returns the closed path, e.g. `[T-1, T-2, T-1]`.
    fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for start in 0..self.tasks.len() {
            if !visited.contains(&start) && self.dfs_cycle(start, &mut visited, &mut stack) {
                return Some(stack.iter().map(|&i| self.tasks[i].id.clone()).collect());
            }
        }
        None
    }

    fn dfs_cycle(&self, node: usize, visited: &mut HashSet<usize>, stack: &mut Vec<usize>) -> bool {
        visited.insert(node);
        stack.push(node);

        for dep in &self.tasks[node].dependencies {
            let Some(&next) = self.index.get(dep) else {
                continue;
            };
            if let Some(pos) = stack.iter().position(|&i| i == next) {
                stack.push(next);
                *stack = stack[pos..].to_vec();
                return true;
            }
            if !visited.contains(&next) && self.dfs_cycle(next, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&pos| &self.tasks[pos])
    }

    pub fn task(&self, id: &str) -> Result<&Task, EngineError> {
        self.get(id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))
    }

    /// Declaration order of a task, used to break ties.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All tasks in declaration order. Each call starts a fresh iterator.
    pub fn tasks(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn dependencies_of(&self, id: &str) -> Result<&[TaskId], EngineError> {
        Ok(&self.task(id)?.dependencies)
    }

    pub fn dependents_of(&self, id: &str) -> Result<&[TaskId], EngineError> {
        Ok(&self.task(id)?.dependents)
    }

    /// Topological order using Kahn's algorithm; among tasks that are free
    /// at the same time the earlier declared one comes first.
    pub fn topological_order(&self) -> Vec<&Task> {
        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.dependencies.len()).collect();
        let mut heap: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(pos, _)| Reverse(pos))
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(Reverse(pos)) = heap.pop() {
            order.push(&self.tasks[pos]);
            for dependent in &self.tasks[pos].dependents {
                let Some(&next) = self.index.get(dependent) else {
                    continue;
                };
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    heap.push(Reverse(next));
                }
            }
        }
        order
    }

    /// Execution phases: each phase holds the tasks whose dependencies all
    /// sit in earlier phases.
    pub fn phases(&self) -> Vec<Vec<TaskId>> {
        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.dependencies.len()).collect();
        let mut current: Vec<usize> = (0..self.tasks.len())
            .filter(|&pos| in_degree[pos] == 0)
            .collect();

        let mut phases = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &pos in &current {
                for dependent in &self.tasks[pos].dependents {
                    let Some(&d) = self.index.get(dependent) else {
                        continue;
                    };
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            next.sort_unstable();
            phases.push(current.iter().map(|&pos| self.tasks[pos].id.clone()).collect());
            current = next;
        }
        phases
    }

    // ============================================================
    // Mutations
    // ============================================================

    fn locate(&self, id: &str) -> Result<usize, EngineError> {
        self.position(id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))
    }

    /// Apply a forward status transition after checking it is legal.
    ///
    /// Moving a task back to NotStarted is not a transition; use
    /// [`reset`](Self::reset).
    pub fn set_status(&mut self, id: &str, to: TaskStatus) -> Result<Transition, EngineError> {
        let pos = self.locate(id)?;
        let task = &self.tasks[pos];
        status::check_transition(self, task, to)?;

        let transition = Transition {
            task: task.id.clone(),
            from: task.status,
            to,
        };
        self.tasks[pos].status = to;
        Ok(transition)
    }

    /// Move a task to Done.
    ///
    /// A NotStarted task is claimed and completed in two recorded steps, and
    /// only if the completion would be accepted; otherwise nothing changes.
    pub fn complete(&mut self, id: &str) -> Result<Vec<Transition>, EngineError> {
        let pos = self.locate(id)?;
        let task = &self.tasks[pos];
        if task.status != TaskStatus::NotStarted {
            return Ok(vec![self.set_status(id, TaskStatus::Done)?]);
        }

        status::check_completion(self, task)?;
        let claim = self.set_status(id, TaskStatus::InProgress)?;
        let done = self.set_status(id, TaskStatus::Done)?;
        Ok(vec![claim, done])
    }

    /// Put a task back to NotStarted. Criteria keep their state.
    pub fn reset(&mut self, id: &str) -> Result<Transition, EngineError> {
        let pos = self.locate(id)?;
        let task = &mut self.tasks[pos];
        if task.status == TaskStatus::NotStarted {
            return Err(Rejection {
                task: task.id.clone(),
                previous: task.status,
                reason: RejectReason::InvalidTransition {
                    from: TaskStatus::NotStarted,
                    to: TaskStatus::NotStarted,
                },
            }
            .into());
        }

        let transition = Transition {
            task: task.id.clone(),
            from: task.status,
            to: TaskStatus::NotStarted,
        };
        task.status = TaskStatus::NotStarted;
        Ok(transition)
    }

    /// Flip one criterion (0-based) and return its new checked state.
    ///
    /// Criteria of a Done task cannot be unchecked.
    pub fn toggle_criterion(&mut self, id: &str, index: usize) -> Result<bool, EngineError> {
        let pos = self.locate(id)?;
        let task = &mut self.tasks[pos];
        let checked = task
            .criteria
            .get(index)
            .map(|c| c.checked)
            .ok_or_else(|| EngineError::NotFound(format!("criterion {} of task {}", index, id)))?;

        if task.status == TaskStatus::Done && checked {
            return Err(locked(task).into());
        }
        task.criteria[index].checked = !checked;
        Ok(!checked)
    }

    /// Append an unchecked criterion and return its index.
    pub fn add_criterion(&mut self, id: &str, text: &str) -> Result<usize, EngineError> {
        let text = text.trim();
        if text.is_empty() || text.contains('\n') {
            return Err(EngineError::InvalidInput(
                "criterion text must be a single non-empty line".to_string(),
            ));
        }

        let pos = self.locate(id)?;
        let task = &mut self.tasks[pos];
        if task.status == TaskStatus::Done {
            return Err(locked(task).into());
        }
        task.criteria.push(Criterion::new(text, false));
        Ok(task.criteria.len() - 1)
    }

    /// Replace the dependency list of a task.
    ///
    /// Leaves the graph untouched when a dependency is unknown, when the new
    /// edges would close a cycle, or when a Done task would gain a
    /// dependency that is not Done.
    pub fn set_dependencies(&mut self, id: &str, dependencies: Vec<TaskId>) -> Result<(), EngineError> {
        let pos = self.locate(id)?;
        let dependencies = dedup(dependencies);

        for dep in &dependencies {
            if !self.index.contains_key(dep) {
                return Err(EngineError::UnknownDependency {
                    task: self.tasks[pos].id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let task = &self.tasks[pos];
        if task.status == TaskStatus::Done {
            let unmet: Vec<TaskId> = dependencies
                .iter()
                .filter(|dep| self.get(dep.as_str()).map(|t| t.status) != Some(TaskStatus::Done))
                .cloned()
                .collect();
            if !unmet.is_empty() {
                return Err(Rejection {
                    task: task.id.clone(),
                    previous: task.status,
                    reason: RejectReason::UnmetDependency { unmet },
                }
                .into());
            }
        }

        let previous = std::mem::replace(&mut self.tasks[pos].dependencies, dependencies);
        if let Some(cycle) = self.detect_cycle() {
            self.tasks[pos].dependencies = previous;
            return Err(EngineError::CyclicDependency { cycle });
        }
        self.rebuild_dependents();
        Ok(())
    }
}

fn locked(task: &Task) -> Rejection {
    Rejection {
        task: task.id.clone(),
        previous: task.status,
        reason: RejectReason::ChecklistLocked,
    }
}

fn dedup(ids: Vec<TaskId>) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
