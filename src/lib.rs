//! specflow: task workflow engine for spec-driven development.
//!
//! A project keeps three steering documents, a Plan of numbered
//! requirements and a Tasks document. The engine parses the Tasks document
//! into a dependency graph, gates every status change on the task's
//! acceptance checklist and its dependencies, and schedules the work that
//! is ready. Documents live either in SQLite ([`db::Database`]) or as
//! markdown files ([`store::FileStore`]).

pub mod config;
pub mod db;
pub mod engine;
pub mod markdown;
pub mod models;
pub mod report;
pub mod store;
pub mod workflow;
