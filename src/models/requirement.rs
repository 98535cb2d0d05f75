use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a requirement in the Plan document, e.g. `R-2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementId(String);

impl RequirementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RequirementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequirementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequirementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A numbered requirement from the Plan document.
///
/// Requirements are referenced by tasks, never owned by them: one task may
/// trace to several requirements and one requirement may be covered by
/// several tasks. The prose is opaque payload produced by the content
/// generator; the engine only looks at identifiers and criterion form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub title: String,
    /// "As a [role], I want [goal] so that [benefit]".
    pub story: Option<String>,
    /// Acceptance criteria, expected in EARS form.
    pub criteria: Vec<String>,
}

/// A parsed Plan document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub requirements: Vec<Requirement>,
}

impl Plan {
    pub fn requirement(&self, id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id.as_str() == id)
    }
}
