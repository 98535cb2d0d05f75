//! Markdown codec for the Plan and Tasks documents.
//!
//! Parsing is line based. Rendering never regenerates a document from
//! scratch: it patches status markers, checkbox prefixes, appended criteria
//! and dependency lines in place so every other byte survives untouched.

pub mod plan;
pub mod tasks;

use thiserror::Error;

pub use plan::parse_plan;
pub use tasks::{is_task_id, render_new, TasksDocument};

/// Structural problems found while parsing a Tasks document. Line numbers
/// are 1-based.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("task {task} (line {line}) has no status line")]
    MissingStatus { task: String, line: usize },

    #[error("task {task} (line {line}) has unrecognised status {value:?}")]
    UnknownStatus {
        task: String,
        line: usize,
        value: String,
    },

    #[error("task {task} has several acceptance criteria sections (line {line})")]
    AmbiguousCriteria { task: String, line: usize },

    #[error("task {task} references unknown task {reference} (line {line})")]
    UnknownReference {
        task: String,
        line: usize,
        reference: String,
    },
}

/// One physical line split into its text and its terminator (`\n`, `\r\n`
/// or nothing for a final unterminated line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub body: String,
    pub ending: String,
}

pub(crate) fn split_lines(content: &str) -> Vec<Line> {
    content
        .split_inclusive('\n')
        .map(|raw| {
            let body = raw.trim_end_matches('\n').trim_end_matches('\r');
            Line {
                body: body.to_string(),
                ending: raw[body.len()..].to_string(),
            }
        })
        .collect()
}

pub(crate) fn join_lines(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.body);
        out.push_str(&line.ending);
    }
    out
}

/// True for lines opening or closing a fenced code block.
pub(crate) fn is_fence(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_preserve_bytes() {
        for content in ["", "a", "a\n", "a\r\nb\n", "a\n\n\nb", "x\r\n"] {
            assert_eq!(join_lines(&split_lines(content)), content);
        }
    }

    #[test]
    fn crlf_is_kept_out_of_the_body() {
        let lines = split_lines("one\r\ntwo");
        assert_eq!(lines[0].body, "one");
        assert_eq!(lines[0].ending, "\r\n");
        assert_eq!(lines[1].ending, "");
    }
}
