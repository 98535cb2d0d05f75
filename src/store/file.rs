use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use tempfile::NamedTempFile;

use super::{version_matches, AuditLog, DocumentStore, StoreError};
use crate::models::{DocKind, SteeringKind, TaskEvent, Version, Versioned};

/// Directory, relative to the project root, holding every document.
pub const SPEC_DIR: &str = ".spec";

/// Documents stored as markdown files under `<project>/.spec/`.
///
/// The project identifier is the path of the project root. Compare-and-write
/// holds an exclusive lock on `.spec/.lock` from the version check until the
/// rename, so separate processes (and separate stores in one process) never
/// interleave. Clones also share an in-process mutex.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_path(project: &str, kind: DocKind) -> PathBuf {
        let root = Path::new(project).join(SPEC_DIR);
        match kind {
            DocKind::Steering(steering) => root.join("steering").join(steering_file(steering)),
            DocKind::Plan => root.join("specs").join("plan.md"),
            DocKind::Tasks => root.join("specs").join("tasks.md"),
        }
    }

    fn events_path(project: &str) -> PathBuf {
        Path::new(project)
            .join(SPEC_DIR)
            .join("specs")
            .join("events.jsonl")
    }

    fn lock_path(project: &str) -> PathBuf {
        Path::new(project).join(SPEC_DIR).join(".lock")
    }

    /// Open and exclusively lock the project's lock file. The lock is
    /// released when the returned file is dropped.
    fn lock_project(project: &str) -> Result<File, StoreError> {
        let path = Self::lock_path(project);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_current(path: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn steering_file(kind: SteeringKind) -> &'static str {
    match kind {
        SteeringKind::Product => "product.md",
        SteeringKind::Tech => "tech.md",
        SteeringKind::Structure => "structure.md",
    }
}

impl DocumentStore for FileStore {
    fn read(&self, project: &str, kind: DocKind) -> Result<Versioned, StoreError> {
        Self::read_current(&Self::document_path(project, kind))?
            .map(Versioned::new)
            .ok_or_else(|| StoreError::NotFound {
                project: project.to_string(),
                kind,
            })
    }

    fn write(
        &self,
        project: &str,
        kind: DocKind,
        content: &str,
        expected: Option<&Version>,
    ) -> Result<Version, StoreError> {
        let path = Self::document_path(project, kind);
        let _guard = self.lock.lock().expect("file store lock poisoned");
        let _project_lock = Self::lock_project(project)?;

        let current = Self::read_current(&path)?.map(|c| Version::of(&c));
        if !version_matches(current.as_ref(), expected) {
            return Err(StoreError::Conflict {
                project: project.to_string(),
                kind,
            });
        }

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        // Uniquely named sibling, renamed over the target.
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        let version = Version::of(content);
        tracing::debug!(project, kind = %kind, version = %version, "Document written");
        Ok(version)
    }
}

impl AuditLog for FileStore {
    fn record(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let path = Self::events_path(&event.project_id);
        let _guard = self.lock.lock().expect("file store lock poisoned");
        let _project_lock = Self::lock_project(&event.project_id)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn events(&self, project: &str, task: Option<&str>) -> Result<Vec<TaskEvent>, StoreError> {
        let Some(content) = Self::read_current(&Self::events_path(project))? else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let event: TaskEvent = serde_json::from_str(line)?;
            if task.map_or(true, |t| event.task_id.as_str() == t) {
                events.push(event);
            }
        }
        Ok(events)
    }
}
