//! Tasks document parsing and in-place rendering.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{is_fence, join_lines, split_lines, Line, ParseError};
use crate::engine::TaskGraph;
use crate::models::{
    Criterion, Evidence, RequirementId, Task, TaskId, TaskInput, TaskStatus, CHECKED_PREFIX,
    UNCHECKED_PREFIX,
};

static TASK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^###\s+Task\s+(T-[0-9]+(?:\.[0-9]+)*)\s*[:\-—]?\s*(.*)$")
        .expect("task header regex should be valid")
});

static TASK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^T-[0-9]+(?:\.[0-9]+)*$").expect("task id regex should be valid"));

/// Whether `id` survives a round trip through a `### Task` header.
pub fn is_task_id(id: &str) -> bool {
    TASK_ID.is_match(id)
}

// Level 1 and 2 headings close the current task block.
static BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,2}(?:\s|$)").expect("block end regex should be valid"));

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s").expect("heading regex should be valid"));

static CRITERIA_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#{3,6}\s+acceptance\s+criteria\b")
        .expect("criteria heading regex should be valid")
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*]\s+)?\*\*(?P<key>[^*:]+?)(?::\*\*|\*\*\s*:)\s*(?P<value>.*)$")
        .expect("field regex should be valid")
});

static TASK_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bT-[0-9]+(?:\.[0-9]+)*").expect("task ref regex should be valid"));

static REQUIREMENT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bR-[0-9]+(?:\.[0-9]+)*").expect("requirement ref regex should be valid")
});

static EVIDENCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*([A-Za-z]+)\s*\]").expect("evidence regex should be valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKey {
    Status,
    Evidence,
    Requirements,
    BlockedBy,
    Blocks,
}

impl FieldKey {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "evidence" => Some(Self::Evidence),
            "requirement traceability" | "requirements" | "traceability" => {
                Some(Self::Requirements)
            }
            "blocked by" | "depends on" | "dependencies" => Some(Self::BlockedBy),
            "blocks" => Some(Self::Blocks),
            _ => None,
        }
    }
}

/// A recognised `**Key**: value` line.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub key: FieldKey,
    /// 0-based line index.
    pub line: usize,
    /// Byte offset of the value within the line body.
    pub value_start: usize,
    pub value: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ChecklistLine {
    pub line: usize,
    pub checked: bool,
    pub text: String,
    /// Whether the line sits under an acceptance criteria heading.
    pub in_section: bool,
}

/// The raw extent of one `### Task` block, as found by a lenient scan.
#[derive(Debug, Clone)]
pub(crate) struct TaskBlock {
    pub id: String,
    pub title: String,
    pub header: usize,
    /// Exclusive end line index.
    pub end: usize,
    pub fields: Vec<Field>,
    pub criteria_headings: Vec<usize>,
    pub checklist: Vec<ChecklistLine>,
}

impl TaskBlock {
    fn new(id: &str, title: &str, header: usize) -> Self {
        Self {
            id: id.to_string(),
            title: title.trim().to_string(),
            header,
            end: header + 1,
            fields: Vec::new(),
            criteria_headings: Vec::new(),
            checklist: Vec::new(),
        }
    }

    fn field(&self, key: FieldKey) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Lines under the acceptance criteria heading, or every checklist line
    /// of the block when it has no such heading.
    fn criteria_lines(&self) -> impl Iterator<Item = &ChecklistLine> + '_ {
        let sectioned = !self.criteria_headings.is_empty();
        self.checklist
            .iter()
            .filter(move |c| !sectioned || c.in_section)
    }

    pub fn criteria(&self) -> Vec<Criterion> {
        self.criteria_lines()
            .map(|c| Criterion {
                text: c.text.clone(),
                checked: c.checked,
                line: Some(c.line + 1),
            })
            .collect()
    }
}

/// Scan raw text for task blocks without enforcing any structure beyond
/// the headers themselves.
pub(crate) fn scan_blocks(content: &str) -> Vec<TaskBlock> {
    scan(&split_lines(content))
}

fn scan(lines: &[Line]) -> Vec<TaskBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<TaskBlock> = None;
    let mut in_fence = false;
    let mut in_section = false;

    for (idx, line) in lines.iter().enumerate() {
        let body = line.body.as_str();
        if is_fence(body) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = TASK_HEADER.captures(body) {
            if let Some(mut block) = current.take() {
                block.end = idx;
                blocks.push(block);
            }
            current = Some(TaskBlock::new(&caps[1], &caps[2], idx));
            in_section = false;
            continue;
        }
        if BLOCK_END.is_match(body) {
            if let Some(mut block) = current.take() {
                block.end = idx;
                blocks.push(block);
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if HEADING.is_match(body) {
            in_section = CRITERIA_HEADING.is_match(body);
            if in_section {
                block.criteria_headings.push(idx);
            }
            continue;
        }

        let checkbox = body
            .strip_prefix(CHECKED_PREFIX)
            .map(|rest| (true, rest))
            .or_else(|| body.strip_prefix(UNCHECKED_PREFIX).map(|rest| (false, rest)));
        if let Some((checked, rest)) = checkbox {
            block.checklist.push(ChecklistLine {
                line: idx,
                checked,
                text: rest.trim().to_string(),
                in_section,
            });
            continue;
        }

        if let Some(caps) = FIELD.captures(body) {
            if let (Some(key), Some(value)) =
                (FieldKey::from_label(&caps["key"]), caps.name("value"))
            {
                block.fields.push(Field {
                    key,
                    line: idx,
                    value_start: value.start(),
                    value: value.as_str().trim().to_string(),
                });
            }
        }
    }

    if let Some(mut block) = current {
        block.end = lines.len();
        blocks.push(block);
    }
    blocks
}

fn task_refs(value: &str) -> Vec<TaskId> {
    let mut refs: Vec<TaskId> = Vec::new();
    for m in TASK_REF.find_iter(value) {
        let id = TaskId::new(m.as_str());
        if !refs.contains(&id) {
            refs.push(id);
        }
    }
    refs
}

fn requirement_refs(value: &str) -> Vec<RequirementId> {
    let mut refs: Vec<RequirementId> = Vec::new();
    for m in REQUIREMENT_REF.find_iter(value) {
        let id = RequirementId::new(m.as_str());
        if !refs.contains(&id) {
            refs.push(id);
        }
    }
    refs
}

fn parse_evidence(value: &str) -> Option<Evidence> {
    EVIDENCE_TAG
        .captures_iter(value)
        .find_map(|caps| Evidence::from_tag(&caps[1]))
        .or_else(|| value.split_whitespace().next().and_then(Evidence::from_tag))
}

fn id_list(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        "None".to_string()
    } else {
        crate::engine::join_ids(ids, ", ")
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    line: usize,
    value_start: usize,
}

impl From<&Field> for Slot {
    fn from(field: &Field) -> Self {
        Self {
            line: field.line,
            value_start: field.value_start,
        }
    }
}

/// Where each patchable piece of one task lives in the source text.
#[derive(Debug, Clone)]
struct TaskLayout {
    id: TaskId,
    header: usize,
    end: usize,
    status: Slot,
    parsed_status: TaskStatus,
    /// (line index, checked) per criterion, in order.
    criteria: Vec<(usize, bool)>,
    criteria_heading: Option<usize>,
    blocked_by: Option<Slot>,
    blocks: Option<Slot>,
    dependencies: BTreeSet<TaskId>,
    dependents: BTreeSet<TaskId>,
}

/// A parsed Tasks document that remembers its source text so it can be
/// rendered back with minimal edits.
#[derive(Debug, Clone)]
pub struct TasksDocument {
    lines: Vec<Line>,
    layouts: Vec<TaskLayout>,
    inputs: Vec<TaskInput>,
}

impl TasksDocument {
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        let lines = split_lines(content);
        let blocks = scan(&lines);

        let mut inputs: Vec<TaskInput> = Vec::with_capacity(blocks.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for block in &blocks {
            if let Some(second) = block.criteria_headings.get(1) {
                return Err(ParseError::AmbiguousCriteria {
                    task: block.id.clone(),
                    line: second + 1,
                });
            }
            let field = block
                .field(FieldKey::Status)
                .ok_or_else(|| ParseError::MissingStatus {
                    task: block.id.clone(),
                    line: block.header + 1,
                })?;
            let status =
                TaskStatus::from_marker(&field.value).ok_or_else(|| ParseError::UnknownStatus {
                    task: block.id.clone(),
                    line: field.line + 1,
                    value: field.value.clone(),
                })?;

            let mut input = TaskInput::new(block.id.as_str(), block.title.clone()).status(status);
            input.criteria = block.criteria();
            input.evidence = block
                .field(FieldKey::Evidence)
                .and_then(|f| parse_evidence(&f.value));
            input.requirements = block
                .field(FieldKey::Requirements)
                .map(|f| requirement_refs(&f.value))
                .unwrap_or_default();
            input.dependencies = block
                .field(FieldKey::BlockedBy)
                .map(|f| task_refs(&f.value))
                .unwrap_or_default();

            index.entry(block.id.clone()).or_insert(inputs.len());
            inputs.push(input);
        }

        // X blocks Y is the same edge as Y blocked by X.
        for block in &blocks {
            let Some(field) = block.field(FieldKey::Blocks) else {
                continue;
            };
            for target in task_refs(&field.value) {
                let pos = *index.get(target.as_str()).ok_or_else(|| {
                    ParseError::UnknownReference {
                        task: block.id.clone(),
                        line: field.line + 1,
                        reference: target.to_string(),
                    }
                })?;
                let source = TaskId::new(block.id.as_str());
                let dependencies = &mut inputs[pos].dependencies;
                if !dependencies.contains(&source) {
                    dependencies.push(source);
                }
            }
        }

        let mut dependents: HashMap<&TaskId, BTreeSet<TaskId>> = HashMap::new();
        for input in &inputs {
            for dep in &input.dependencies {
                dependents.entry(dep).or_default().insert(input.id.clone());
            }
        }

        let mut layouts = Vec::with_capacity(blocks.len());
        for (block, input) in blocks.iter().zip(&inputs) {
            let status = block
                .field(FieldKey::Status)
                .map(Slot::from)
                .ok_or_else(|| ParseError::MissingStatus {
                    task: block.id.clone(),
                    line: block.header + 1,
                })?;
            layouts.push(TaskLayout {
                id: input.id.clone(),
                header: block.header,
                end: block.end,
                status,
                parsed_status: input.status.unwrap_or(TaskStatus::NotStarted),
                criteria: block
                    .criteria_lines()
                    .map(|c| (c.line, c.checked))
                    .collect(),
                criteria_heading: block.criteria_headings.first().copied(),
                blocked_by: block.field(FieldKey::BlockedBy).map(Slot::from),
                blocks: block.field(FieldKey::Blocks).map(Slot::from),
                dependencies: input.dependencies.iter().cloned().collect(),
                dependents: dependents.get(&input.id).cloned().unwrap_or_default(),
            });
        }

        Ok(Self {
            lines,
            layouts,
            inputs,
        })
    }

    /// Tasks in document order, with "Blocks" declarations already folded
    /// into the dependencies of the blocked task.
    pub fn tasks(&self) -> &[TaskInput] {
        &self.inputs
    }

    pub fn into_tasks(self) -> Vec<TaskInput> {
        self.inputs
    }

    /// Render the document with the graph's current state patched in.
    ///
    /// Only status values, checkbox prefixes, appended criteria and
    /// dependency lines whose set changed are touched. Rendering against the
    /// graph built from this very document returns the source unchanged.
    pub fn render(&self, graph: &TaskGraph) -> String {
        let mut replacements: HashMap<usize, String> = HashMap::new();
        let mut inserts: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        for layout in &self.layouts {
            let Some(task) = graph.get(layout.id.as_str()) else {
                continue;
            };
            self.patch_task(layout, task, &mut replacements, &mut inserts);
        }

        let mut lines = self.lines.clone();
        for (idx, body) in replacements {
            lines[idx].body = body;
        }
        for (idx, new_lines) in inserts.into_iter().rev() {
            let ending = match lines[idx].ending.as_str() {
                "" => "\n".to_string(),
                other => other.to_string(),
            };
            lines[idx].ending = ending.clone();
            let at = idx + 1;
            lines.splice(
                at..at,
                new_lines.into_iter().map(|body| Line {
                    body,
                    ending: ending.clone(),
                }),
            );
        }
        join_lines(&lines)
    }

    fn patch_task(
        &self,
        layout: &TaskLayout,
        task: &Task,
        replacements: &mut HashMap<usize, String>,
        inserts: &mut BTreeMap<usize, Vec<String>>,
    ) {
        if task.status != layout.parsed_status {
            let slot = layout.status;
            replacements.insert(slot.line, self.with_value(slot, task.status.marker()));
        }

        for (criterion, &(line, checked)) in task.criteria.iter().zip(&layout.criteria) {
            if criterion.checked != checked {
                let body = &self.lines[line].body;
                let rest = &body[CHECKED_PREFIX.len()..];
                replacements.insert(line, format!("{}{}", criterion.prefix(), rest));
            }
        }

        let dependencies: BTreeSet<TaskId> = task.dependencies.iter().cloned().collect();
        if dependencies != layout.dependencies {
            let value = id_list(&task.dependencies);
            match layout.blocked_by {
                Some(slot) => {
                    replacements.insert(slot.line, self.with_value(slot, &value));
                }
                None => inserts
                    .entry(layout.status.line)
                    .or_default()
                    .push(format!("**Blocked By**: {}", value)),
            }
        }

        if let Some(slot) = layout.blocks {
            let dependents: BTreeSet<TaskId> = task.dependents.iter().cloned().collect();
            if dependents != layout.dependents {
                replacements.insert(slot.line, self.with_value(slot, &id_list(&task.dependents)));
            }
        }

        let appended = task.criteria.get(layout.criteria.len()..).unwrap_or_default();
        if appended.is_empty() {
            return;
        }
        let mut new_lines: Vec<String> = Vec::new();
        let anchor = match (layout.criteria.last(), layout.criteria_heading) {
            (Some(&(line, _)), _) => line,
            (None, Some(heading)) => heading,
            (None, None) => {
                new_lines.push(String::new());
                new_lines.push("#### Acceptance Criteria (EARS)".to_string());
                self.last_content_line(layout)
            }
        };
        new_lines.extend(
            appended
                .iter()
                .map(|c| format!("{} {}", c.prefix(), c.text)),
        );
        inserts.entry(anchor).or_default().extend(new_lines);
    }

    fn with_value(&self, slot: Slot, value: &str) -> String {
        let body = &self.lines[slot.line].body;
        format!("{}{}", &body[..slot.value_start], value)
    }

    fn last_content_line(&self, layout: &TaskLayout) -> usize {
        (layout.header..layout.end)
            .rev()
            .find(|&idx| {
                let body = self.lines[idx].body.trim();
                !body.is_empty() && body != "---"
            })
            .unwrap_or(layout.header)
    }
}

/// Render a fresh Tasks document for tasks created in bulk.
pub fn render_new<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> String {
    let mut out = String::from("# Implementation Tasks\n");
    for task in tasks {
        out.push('\n');
        out.push_str(&format!("### Task {}: {}\n", task.id, task.title));
        out.push_str(&format!("**Status**: {}\n", task.status.marker()));
        if let Some(evidence) = task.evidence {
            out.push_str(&format!("**Evidence**: {}\n", evidence.tag()));
        }
        let requirements = if task.requirements.is_empty() {
            "None".to_string()
        } else {
            task.requirements
                .iter()
                .map(RequirementId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        out.push_str(&format!("**Requirement Traceability**: {}\n", requirements));
        out.push_str(&format!("**Blocked By**: {}\n", id_list(&task.dependencies)));
        out.push_str(&format!("**Blocks**: {}\n", id_list(&task.dependents)));
        out.push_str("\n#### Acceptance Criteria (EARS)\n");
        for criterion in &task.criteria {
            out.push_str(&format!("{} {}\n", criterion.prefix(), criterion.text));
        }
    }
    out
}
