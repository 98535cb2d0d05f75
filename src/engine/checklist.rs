//! Checklist verification: decides whether a task's acceptance criteria
//! allow it to be marked Done.

use std::fmt;

use serde::Serialize;

use super::error::EngineError;
use crate::markdown::tasks::scan_blocks;
use crate::models::{Criterion, Task, TaskId};

/// Outcome of verifying one task's checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Pass,
    Fail(ChecklistFailure),
}

impl Decision {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail(_) => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistFailure {
    /// The task declares no criteria at all.
    NoCriteria,
    /// This many criteria are still unchecked.
    Unchecked(usize),
}

impl fmt::Display for ChecklistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCriteria => f.write_str("no acceptance criteria declared"),
            Self::Unchecked(n) => write!(f, "{} unchecked", n),
        }
    }
}

/// A checklist line quoted as evidence for a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceLine {
    pub line: Option<usize>,
    pub text: String,
}

/// Full verification result with counts and quoted evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub task: TaskId,
    pub decision: Decision,
    pub checked: usize,
    pub total: usize,
    pub evidence: Vec<EvidenceLine>,
}

/// PASS iff there is at least one criterion and none is unchecked.
pub fn decide(criteria: &[Criterion]) -> Decision {
    let total = criteria.len();
    let unchecked = criteria.iter().filter(|c| !c.checked).count();
    if total == 0 {
        Decision::Fail(ChecklistFailure::NoCriteria)
    } else if unchecked > 0 {
        Decision::Fail(ChecklistFailure::Unchecked(unchecked))
    } else {
        Decision::Pass
    }
}

pub fn verify(task: &Task) -> Verification {
    verification(task.id.clone(), &task.criteria)
}

fn verification(task: TaskId, criteria: &[Criterion]) -> Verification {
    Verification {
        task,
        decision: decide(criteria),
        checked: criteria.iter().filter(|c| c.checked).count(),
        total: criteria.len(),
        evidence: criteria
            .iter()
            .map(|c| EvidenceLine {
                line: c.line,
                text: format!("{} {}", c.prefix(), c.text),
            })
            .collect(),
    }
}

/// Verify a task directly against raw document text.
///
/// Fails with [`EngineError::Unverifiable`] when the task header is missing
/// or repeated, or when its block holds more than one acceptance criteria
/// section. Nothing else about the document has to be well formed.
pub fn verify_in_document(content: &str, task: &str) -> Result<Verification, EngineError> {
    let unverifiable = |reason: String| EngineError::Unverifiable {
        task: TaskId::new(task),
        reason,
    };

    let blocks: Vec<_> = scan_blocks(content)
        .into_iter()
        .filter(|b| b.id == task)
        .collect();

    let block = match blocks.as_slice() {
        [] => return Err(unverifiable("task header not found".to_string())),
        [block] => block,
        many => {
            return Err(unverifiable(format!(
                "task header appears {} times",
                many.len()
            )))
        }
    };

    if block.criteria_headings.len() > 1 {
        let lines = block
            .criteria_headings
            .iter()
            .map(|i| (i + 1).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(unverifiable(format!(
            "several acceptance criteria sections (lines {})",
            lines
        )));
    }

    Ok(verification(TaskId::new(task), &block.criteria()))
}
