use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::requirement::RequirementId;

/// Stable identifier of a task within a project, e.g. `T-4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A discrete unit of work in the implementation plan.
///
/// Tasks are created in bulk when a plan is decomposed and live for as long
/// as the project's Tasks document. Their checklist and dependency lists are
/// only amended through explicit edit operations on the
/// [`TaskGraph`](crate::engine::TaskGraph), which also keeps `dependents`
/// the exact inverse of `dependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    /// Acceptance criteria in document order. Criteria are never removed.
    pub criteria: Vec<Criterion>,
    /// Tasks that must be Done before this one ("blocked by").
    pub dependencies: Vec<TaskId>,
    /// Tasks that list this one as a dependency ("blocks"). Derived.
    pub dependents: Vec<TaskId>,
    pub evidence: Option<Evidence>,
    /// Requirements this task traces back to.
    pub requirements: Vec<RequirementId>,
}

impl Task {
    pub fn unchecked_criteria(&self) -> impl Iterator<Item = &Criterion> + '_ {
        self.criteria.iter().filter(|c| !c.checked)
    }
}

/// The execution status of a task.
///
/// - `NotStarted`: Nobody has claimed the task yet
/// - `InProgress`: An agent claimed the task and is working on it
/// - `Done`: Checklist complete and every dependency done
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// The literal marker written after `**Status**:` in a Tasks document.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::NotStarted => "⚪ Not Started",
            Self::InProgress => "🟡 In Progress",
            Self::Done => "✅ Done",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NotStarted => "⚪",
            Self::InProgress => "🟡",
            Self::Done => "✅",
        }
    }

    /// Parse the value of a status line. Accepts the full marker, the bare
    /// symbol with any trailing label, or the bare label.
    pub fn from_marker(value: &str) -> Option<Self> {
        let value = value.trim();
        [Self::NotStarted, Self::InProgress, Self::Done]
            .into_iter()
            .find(|status| {
                value == status.marker()
                    || value.starts_with(status.symbol())
                    || value.eq_ignore_ascii_case(status.marker()[status.symbol().len()..].trim())
            })
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One checklist line of a task's acceptance criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub text: String,
    pub checked: bool,
    /// 1-based line in the document the criterion was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Criterion {
    pub fn new(text: impl Into<String>, checked: bool) -> Self {
        Self {
            text: text.into(),
            checked,
            line: None,
        }
    }

    /// The checklist prefix, bit-exact as it appears in documents.
    pub fn prefix(&self) -> &'static str {
        if self.checked {
            CHECKED_PREFIX
        } else {
            UNCHECKED_PREFIX
        }
    }
}

pub const CHECKED_PREFIX: &str = "- [x]";
pub const UNCHECKED_PREFIX: &str = "- [ ]";

/// Classification of the evidence behind a task's technical claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// Found in the current codebase
    Exists,
    /// Backed by an external reference
    Example,
    /// Still to be created or decided
    Needed,
}

impl Evidence {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Exists => "[EXISTS]",
            Self::Example => "[EXAMPLE]",
            Self::Needed => "[NEEDED]",
        }
    }

    pub fn from_tag(s: &str) -> Option<Self> {
        match s.trim().trim_matches(|c| c == '[' || c == ']').to_ascii_uppercase().as_str() {
            "EXISTS" => Some(Self::Exists),
            "EXAMPLE" => Some(Self::Example),
            "NEEDED" => Some(Self::Needed),
            _ => None,
        }
    }
}

/// Input for creating a task, either from a parsed document or when a plan
/// is decomposed in bulk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub id: TaskId,
    pub title: String,
    /// Defaults to `NotStarted` when omitted.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub evidence: Option<Evidence>,
    #[serde(default)]
    pub requirements: Vec<RequirementId>,
}

impl TaskInput {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: None,
            criteria: Vec::new(),
            dependencies: Vec::new(),
            evidence: None,
            requirements: Vec::new(),
        }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn criterion(mut self, text: impl Into<String>, checked: bool) -> Self {
        self.criteria.push(Criterion::new(text, checked));
        self
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn requirement(mut self, id: impl Into<RequirementId>) -> Self {
        self.requirements.push(id.into());
        self
    }
}
