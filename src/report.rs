//! Plain-text rendering of schedules and verification results.

use std::collections::HashMap;
use std::fmt::Write;

use crate::engine::{join_ids, Decision, Verification};
use crate::workflow::{ScheduleReport, TaskSummary};

/// A labelled node of a rendered tree.
struct Node {
    label: String,
    children: Vec<Node>,
}

impl Node {
    fn leaf(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }
}

/// Render a forest as ASCII art. Roots are printed bare, descendants get
/// branch characters.
///
/// ```text
/// Phases
/// ├── Phase 1
/// │   └── ✅ T-1 Setup
/// └── Phase 2
///     └── ⚪ T-2 Schema
/// ```
fn render_tree(output: &mut String, nodes: &[Node]) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        render_node(output, node, "", is_last, true);
    }
}

fn render_node(output: &mut String, node: &Node, prefix: &str, is_last: bool, is_root: bool) {
    if is_root {
        output.push_str(&node.label);
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push_str(&node.label);
    }
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

fn task_label(summaries: &HashMap<&str, &TaskSummary>, id: &str) -> String {
    match summaries.get(id) {
        Some(task) => format!("{} {} {}", task.status.symbol(), task.id, task.title),
        None => id.to_string(),
    }
}

/// Render the full scheduling report.
pub fn render_schedule(report: &ScheduleReport) -> String {
    let summaries: HashMap<&str, &TaskSummary> =
        report.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let schedule = &report.schedule;
    let progress = schedule.progress;

    let mut output = String::new();
    let _ = writeln!(output, "Project {} @ {}", report.project, report.version);
    let _ = writeln!(
        output,
        "Progress: {}/{} done, {} in progress, {} not started",
        progress.done, progress.total, progress.in_progress, progress.not_started
    );

    if !schedule.phases.is_empty() {
        output.push('\n');
        let phases = Node {
            label: "Phases".to_string(),
            children: schedule
                .phases
                .iter()
                .enumerate()
                .map(|(i, phase)| Node {
                    label: format!("Phase {}", i + 1),
                    children: phase
                        .iter()
                        .map(|id| Node::leaf(task_label(&summaries, id.as_str())))
                        .collect(),
                })
                .collect(),
        };
        render_tree(&mut output, &[phases]);
    }

    output.push('\n');
    if schedule.ready.is_empty() {
        output.push_str("Ready: none\n");
    } else {
        let _ = writeln!(output, "Ready: {}", join_ids(&schedule.ready, ", "));
    }

    if !schedule.parallel_groups.is_empty() {
        output.push_str("Parallel groups:\n");
        for (i, group) in schedule.parallel_groups.iter().enumerate() {
            let _ = writeln!(output, "  {}. {}", i + 1, join_ids(group, ", "));
        }
    }

    if !schedule.contention.is_empty() {
        output.push_str("Contention:\n");
        for c in &schedule.contention {
            let _ = writeln!(output, "  {} + {} gate {}", c.first, c.second, c.dependent);
        }
    }

    if !schedule.critical_path.is_empty() {
        let _ = writeln!(
            output,
            "Critical path: {}",
            join_ids(&schedule.critical_path, " → ")
        );
    }

    if !report.verification.is_empty() {
        output.push('\n');
        let verification = Node {
            label: "Verification".to_string(),
            children: report
                .verification
                .iter()
                .map(|v| Node::leaf(verification_label(v)))
                .collect(),
        };
        render_tree(&mut output, &[verification]);
    }

    if !report.violations.is_empty() {
        output.push('\n');
        let violations = Node {
            label: "Violations".to_string(),
            children: report
                .violations
                .iter()
                .map(|v| Node::leaf(format!("{} {}: {}", v.status.symbol(), v.task, v.reason)))
                .collect(),
        };
        render_tree(&mut output, &[violations]);
    }

    output
}

fn verification_label(v: &Verification) -> String {
    match v.decision {
        Decision::Pass => format!("PASS {} ({}/{})", v.task, v.checked, v.total),
        Decision::Fail(failure) => {
            format!("FAIL {} ({}/{}): {}", v.task, v.checked, v.total, failure)
        }
    }
}

fn reason(v: &Verification) -> String {
    match v.decision {
        Decision::Pass if v.total == 1 => "the only criterion is checked".to_string(),
        Decision::Pass => format!("all {} criteria checked", v.total),
        Decision::Fail(failure) => failure.to_string(),
    }
}

/// Render one verification as a checker transcript quoting every criterion
/// line of `file`.
///
/// ```text
/// File: .spec/specs/tasks.md
/// Quoted lines:
///   .spec/specs/tasks.md:16: - [x] WHEN run THEN THE SYSTEM SHALL start
/// Counts: Checked 1/1
/// Decision: PASS
/// Reason: the only criterion is checked
/// ```
pub fn render_verification(v: &Verification, file: &str) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "File: {}", file);
    output.push_str("Quoted lines:\n");
    if v.evidence.is_empty() {
        output.push_str("  (none)\n");
    }
    for quote in &v.evidence {
        match quote.line {
            Some(line) => {
                let _ = writeln!(output, "  {}:{}: {}", file, line, quote.text);
            }
            None => {
                let _ = writeln!(output, "  {}: {}", file, quote.text);
            }
        }
    }
    let _ = writeln!(output, "Counts: Checked {}/{}", v.checked, v.total);
    let _ = writeln!(output, "Decision: {}", v.decision);
    let _ = writeln!(output, "Reason: {}", reason(v));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{verify, Schedule, TaskGraph};
    use crate::engine::schedule as compute_schedule;
    use crate::models::{TaskInput, TaskStatus, Version};

    fn report() -> ScheduleReport {
        let graph = TaskGraph::build(vec![
            TaskInput::new("T-1", "Setup")
                .status(TaskStatus::Done)
                .criterion("WHEN run THEN THE SYSTEM SHALL start", true),
            TaskInput::new("T-2", "Schema")
                .depends_on("T-1")
                .criterion("WHEN migrated THEN THE SYSTEM SHALL keep data", false),
            TaskInput::new("T-3", "Api").depends_on("T-1"),
        ])
        .unwrap();

        ScheduleReport {
            project: "demo".to_string(),
            version: Version::from_hash("0123456789abcdef"),
            tasks: graph
                .tasks()
                .map(|t| TaskSummary {
                    id: t.id.clone(),
                    title: t.title.clone(),
                    status: t.status,
                })
                .collect(),
            schedule: compute_schedule(&graph),
            verification: graph.tasks().map(verify).collect(),
            violations: Vec::new(),
        }
    }

    #[test]
    fn test_single_root() {
        let mut output = String::new();
        render_tree(&mut output, &[Node::leaf("Phases".to_string())]);
        assert_eq!(output, "Phases\n");
    }

    #[test]
    fn test_nested_children() {
        let tree = Node {
            label: "Phases".to_string(),
            children: vec![
                Node {
                    label: "Phase 1".to_string(),
                    children: vec![Node::leaf("a".to_string()), Node::leaf("b".to_string())],
                },
                Node {
                    label: "Phase 2".to_string(),
                    children: vec![Node::leaf("c".to_string())],
                },
            ],
        };
        let mut output = String::new();
        render_tree(&mut output, &[tree]);
        assert_eq!(
            output,
            "Phases\n├── Phase 1\n│   ├── a\n│   └── b\n└── Phase 2\n    └── c\n"
        );
    }

    #[test]
    fn test_schedule_report() {
        let output = render_schedule(&report());
        assert_eq!(
            output,
            "Project demo @ 0123456789ab\n\
             Progress: 1/3 done, 0 in progress, 2 not started\n\
             \n\
             Phases\n\
             ├── Phase 1\n\
             │   └── ✅ T-1 Setup\n\
             └── Phase 2\n    \
             ├── ⚪ T-2 Schema\n    \
             └── ⚪ T-3 Api\n\
             \n\
             Ready: T-2, T-3\n\
             Parallel groups:\n  \
             1. T-2, T-3\n\
             Critical path: T-1 → T-2\n\
             \n\
             Verification\n\
             ├── PASS T-1 (1/1)\n\
             ├── FAIL T-2 (0/1): 1 unchecked\n\
             └── FAIL T-3 (0/0): no acceptance criteria declared\n"
        );
    }

    #[test]
    fn test_empty_schedule() {
        let report = ScheduleReport {
            project: "empty".to_string(),
            version: Version::of(""),
            tasks: Vec::new(),
            schedule: Schedule::default(),
            verification: Vec::new(),
            violations: Vec::new(),
        };
        let output = render_schedule(&report);
        assert_eq!(
            output,
            "Project empty @ e3b0c44298fc\n\
             Progress: 0/0 done, 0 in progress, 0 not started\n\
             \n\
             Ready: none\n"
        );
    }

    #[test]
    fn test_verification_transcript() {
        let report = report();
        let output = render_verification(&report.verification[1], "tasks.md");
        assert_eq!(
            output,
            "File: tasks.md\n\
             Quoted lines:\n  \
             tasks.md: - [ ] WHEN migrated THEN THE SYSTEM SHALL keep data\n\
             Counts: Checked 0/1\n\
             Decision: FAIL\n\
             Reason: 1 unchecked\n"
        );
    }

    #[test]
    fn test_verification_without_criteria() {
        let report = report();
        let output = render_verification(&report.verification[2], "tasks.md");
        assert!(output.contains("Quoted lines:\n  (none)\n"));
        assert!(output.ends_with("Reason: no acceptance criteria declared\n"));
    }
}
