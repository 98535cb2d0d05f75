//! Domain models for specflow.
//!
//! # Core Concepts
//!
//! - [`Task`]: A unit of work with a status, an acceptance-criteria checklist
//!   and "blocked by" dependencies on other tasks.
//! - [`Requirement`]: A numbered requirement from the Plan, referenced by tasks.
//! - [`DocKind`] / [`Version`]: The named artifacts a project keeps and the
//!   content-hash version used for optimistic writes.
//! - [`Project`]: Container for documents in the SQLite store.
//! - [`TaskEvent`]: Append-only audit record of task changes.

mod document;
mod event;
mod project;
mod requirement;
mod task;

pub use document::*;
pub use event::*;
pub use project::*;
pub use requirement::*;
pub use task::*;
