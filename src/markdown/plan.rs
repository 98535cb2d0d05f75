use once_cell::sync::Lazy;
use regex::Regex;

use super::{is_fence, split_lines};
use crate::models::{Plan, Requirement, RequirementId};

static REQUIREMENT_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#{2,4}\s+(R-[0-9]+(?:\.[0-9]+)*)\s*[:\-—]?\s*(.*)$")
        .expect("requirement header regex should be valid")
});

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s").expect("heading regex should be valid"));

static USER_STORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*[-*]?\s*\**user\s+story\**\s*:?\**\s*:?\s*(.*)$")
        .expect("user story regex should be valid")
});

static CRITERIA_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:#{1,6}\s+|[-*]\s+)?\**acceptance\s+criteria\b[^:]*(?::\**\s*(.*))?$")
        .expect("criteria marker regex should be valid")
});

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:[-*+]|[0-9]+[.)])\s+(?:\[[ xX]\]\s+)?(.+)$")
        .expect("list item regex should be valid")
});

/// Parse the requirements out of a Plan document.
///
/// A requirement starts at an `R-<n>` heading and runs to the next heading
/// of the same or a higher level. Criteria are the list items following an
/// "Acceptance Criteria" marker, which may be a heading or a list item of
/// its own; in the latter case only items nested deeper than the marker
/// belong to it.
pub fn parse_plan(content: &str) -> Plan {
    let mut requirements: Vec<Requirement> = Vec::new();
    let mut level = 0usize;
    let mut in_fence = false;
    // `Some(indent)` while collecting criteria; `None` for a heading marker.
    let mut criteria: Option<Option<usize>> = None;

    for line in split_lines(content) {
        let body = line.body.as_str();
        if is_fence(body) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = REQUIREMENT_HEADER.captures(body) {
            level = body.chars().take_while(|c| *c == '#').count();
            requirements.push(Requirement {
                id: RequirementId::new(&caps[1]),
                title: caps[2].trim().to_string(),
                story: None,
                criteria: Vec::new(),
            });
            criteria = None;
            continue;
        }

        let Some(current) = requirements.last_mut() else {
            continue;
        };

        if let Some(caps) = HEADING.captures(body) {
            if caps[1].len() <= level {
                // Leaving the requirement; nothing more attaches to it.
                level = 0;
                criteria = None;
                continue;
            }
        }
        if level == 0 {
            continue;
        }

        if let Some(caps) = CRITERIA_MARKER.captures(body) {
            let indent = if HEADING.is_match(body) {
                None
            } else {
                Some(body.len() - body.trim_start().len())
            };
            criteria = Some(indent);
            if let Some(inline) = caps.get(1).map(|m| m.as_str().trim()) {
                if !inline.is_empty() {
                    current.criteria.push(inline.to_string());
                }
            }
            continue;
        }
        if HEADING.is_match(body) {
            criteria = None;
            continue;
        }

        if current.story.is_none() {
            if let Some(caps) = USER_STORY.captures(body) {
                let story = caps[1].trim();
                if !story.is_empty() {
                    current.story = Some(story.to_string());
                }
                criteria = None;
                continue;
            }
        }

        if let (Some(marker), Some(caps)) = (criteria, LIST_ITEM.captures(body)) {
            let indent = caps[1].len();
            match marker {
                Some(marker_indent) if indent <= marker_indent => criteria = None,
                _ => current.criteria.push(caps[2].trim().to_string()),
            }
        }
    }

    Plan { requirements }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
# Plan

## 1. Requirements (with EARS)

### R-1: Persist documents
- User Story: As an agent, I want documents stored, so that work survives restarts.
- Files Affected: src/store.rs
- Acceptance Criteria:
  - WHEN a document is written THEN THE SYSTEM SHALL return its new version
  - WHEN the version is stale THEN THE SYSTEM SHALL reject the write

### R-2: Schedule work
**User Story:** As a lead, I want ready tasks listed.

#### Acceptance Criteria
1. WHEN tasks are ready THEN THE SYSTEM SHALL list them
2. [ ] Ready tasks are shown quickly

#### Edge Cases and Errors
- [Edge case] → not a criterion

## 2. Design
- R-3 is mentioned but not defined here
";

    #[test]
    fn parses_requirements_with_stories_and_criteria() {
        let plan = parse_plan(PLAN);
        assert_eq!(plan.requirements.len(), 2);

        let r1 = &plan.requirements[0];
        assert_eq!(r1.id, RequirementId::new("R-1"));
        assert_eq!(r1.title, "Persist documents");
        assert_eq!(
            r1.story.as_deref(),
            Some("As an agent, I want documents stored, so that work survives restarts.")
        );
        assert_eq!(r1.criteria.len(), 2);

        let r2 = &plan.requirements[1];
        assert_eq!(r2.story.as_deref(), Some("As a lead, I want ready tasks listed."));
        assert_eq!(
            r2.criteria,
            vec![
                "WHEN tasks are ready THEN THE SYSTEM SHALL list them".to_string(),
                "Ready tasks are shown quickly".to_string(),
            ]
        );
    }

    #[test]
    fn sibling_list_items_end_nested_criteria() {
        let plan = parse_plan(
            "### R-1: A\n- Acceptance Criteria:\n  - WHEN x THEN THE SYSTEM SHALL y\n- Notes: later\n",
        );
        assert_eq!(plan.requirements[0].criteria.len(), 1);
    }

    #[test]
    fn empty_document_has_no_requirements() {
        assert!(parse_plan("").requirements.is_empty());
    }
}
