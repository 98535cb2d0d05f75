use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::graph::TaskGraph;
use crate::models::{Plan, RequirementId, TaskId};

static EARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*WHEN\s+.+\s+THEN\s+THE\s+SYSTEM\s+SHALL\s+.+$")
        .expect("EARS regex should be valid")
});

/// Whether a criterion reads "WHEN <condition> THEN THE SYSTEM SHALL <behavior>".
pub fn is_ears(text: &str) -> bool {
    EARS.is_match(text)
}

/// Where a criterion that is not in EARS form was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "owner", content = "id", rename_all = "snake_case")]
pub enum CriterionOwner {
    Requirement(RequirementId),
    Task(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonEarsCriterion {
    pub owner: CriterionOwner,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownLink {
    pub task: TaskId,
    pub requirement: RequirementId,
}

/// Coverage between the Plan's requirements and the Tasks document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceabilityReport {
    /// Requirements no task links to.
    pub uncovered: Vec<RequirementId>,
    /// Task links naming requirements the Plan does not define.
    pub unknown_links: Vec<UnknownLink>,
    pub non_ears: Vec<NonEarsCriterion>,
}

impl TraceabilityReport {
    pub fn is_clean(&self) -> bool {
        self.uncovered.is_empty() && self.unknown_links.is_empty() && self.non_ears.is_empty()
    }
}

pub fn traceability(plan: &Plan, graph: &TaskGraph) -> TraceabilityReport {
    let defined: HashSet<&RequirementId> = plan.requirements.iter().map(|r| &r.id).collect();
    let linked: HashSet<&RequirementId> = graph.tasks().flat_map(|t| &t.requirements).collect();

    let uncovered = plan
        .requirements
        .iter()
        .filter(|r| !linked.contains(&r.id))
        .map(|r| r.id.clone())
        .collect();

    let mut unknown_links = Vec::new();
    for task in graph.tasks() {
        for requirement in &task.requirements {
            if !defined.contains(requirement) {
                unknown_links.push(UnknownLink {
                    task: task.id.clone(),
                    requirement: requirement.clone(),
                });
            }
        }
    }

    let mut non_ears = Vec::new();
    for requirement in &plan.requirements {
        for text in requirement.criteria.iter().filter(|c| !is_ears(c)) {
            non_ears.push(NonEarsCriterion {
                owner: CriterionOwner::Requirement(requirement.id.clone()),
                text: text.clone(),
            });
        }
    }
    for task in graph.tasks() {
        for criterion in task.criteria.iter().filter(|c| !is_ears(&c.text)) {
            non_ears.push(NonEarsCriterion {
                owner: CriterionOwner::Task(task.id.clone()),
                text: criterion.text.clone(),
            });
        }
    }

    TraceabilityReport {
        uncovered,
        unknown_links,
        non_ears,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Requirement, TaskInput};

    #[test]
    fn recognises_ears_form() {
        assert!(is_ears("WHEN a user logs in THEN THE SYSTEM SHALL show the dashboard"));
        assert!(is_ears("when x then the system shall y"));
        assert!(!is_ears("The dashboard loads quickly"));
        assert!(!is_ears("WHEN x THEN it works"));
    }

    #[test]
    fn reports_coverage_gaps_and_bad_links() {
        let plan = Plan {
            requirements: vec![
                Requirement {
                    id: RequirementId::new("R-1"),
                    title: "one".into(),
                    story: None,
                    criteria: vec!["WHEN a THEN THE SYSTEM SHALL b".into()],
                },
                Requirement {
                    id: RequirementId::new("R-2"),
                    title: "two".into(),
                    story: None,
                    criteria: vec!["fast".into()],
                },
            ],
        };
        let graph = TaskGraph::build(vec![TaskInput::new("T-1", "a")
            .requirement("R-1")
            .requirement("R-9")
            .criterion("WHEN c THEN THE SYSTEM SHALL d", false)])
        .unwrap();

        let report = traceability(&plan, &graph);
        assert_eq!(report.uncovered, vec![RequirementId::new("R-2")]);
        assert_eq!(
            report.unknown_links,
            vec![UnknownLink {
                task: TaskId::new("T-1"),
                requirement: RequirementId::new("R-9"),
            }]
        );
        assert_eq!(report.non_ears.len(), 1);
        assert_eq!(
            report.non_ears[0].owner,
            CriterionOwner::Requirement(RequirementId::new("R-2"))
        );
        assert!(!report.is_clean());
    }
}
