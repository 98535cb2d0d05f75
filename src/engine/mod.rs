//! The task workflow engine: dependency graph, status state machine,
//! checklist verification and scheduling.
//!
//! All of it operates on an in-memory [`TaskGraph`] built from a parsed
//! Tasks document. Nothing here touches storage; see
//! [`workflow`](crate::workflow) for the read-decide-write loop.

pub mod checklist;
mod error;
pub mod graph;
pub mod scheduler;
pub mod status;
pub mod trace;

pub use checklist::{decide, verify, verify_in_document, ChecklistFailure, Decision, Verification};
pub(crate) use error::join_ids;
pub use error::{EngineError, RejectReason, Rejection};
pub use graph::TaskGraph;
pub use scheduler::{schedule, Contention, Progress, Schedule};
pub use status::{validate_statuses, StatusViolation, Transition};
pub use trace::{traceability, TraceabilityReport};
