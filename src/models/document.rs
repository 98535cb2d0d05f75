use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The steering documents consumed, but never mutated, by the workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SteeringKind {
    Product,
    Tech,
    Structure,
}

impl SteeringKind {
    pub const ALL: [SteeringKind; 3] = [Self::Product, Self::Tech, Self::Structure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Tech => "tech",
            Self::Structure => "structure",
        }
    }
}

/// Named artifacts kept per project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "steering")]
pub enum DocKind {
    Steering(SteeringKind),
    Plan,
    Tasks,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Steering(SteeringKind::Product) => "steering/product",
            Self::Steering(SteeringKind::Tech) => "steering/tech",
            Self::Steering(SteeringKind::Structure) => "steering/structure",
            Self::Plan => "plan",
            Self::Tasks => "tasks",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "steering/product" | "product" => Some(Self::Steering(SteeringKind::Product)),
            "steering/tech" | "tech" => Some(Self::Steering(SteeringKind::Tech)),
            "steering/structure" | "structure" => Some(Self::Steering(SteeringKind::Structure)),
            "plan" => Some(Self::Plan),
            "tasks" => Some(Self::Tasks),
            _ => None,
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimistic-concurrency token for a stored document: the hex SHA-256 of
/// its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a version previously produced by [`Version::of`].
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell versions apart in logs.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Document content together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub content: String,
    pub version: Version,
}

impl Versioned {
    pub fn new(content: String) -> Self {
        let version = Version::of(&content);
        Self { content, version }
    }
}

/// Existence and version of one document, used for status overviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub kind: DocKind,
    pub exists: bool,
    pub version: Option<Version>,
}
