mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::*;
use crate::store::{AuditLog, DocumentStore, StoreError};

/// SQLite-backed document store and audit log.
///
/// One connection is shared behind a mutex; clones share it too, so worker
/// threads can each hold a `Database`.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "specflow")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("specflow.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE name = ?",
                [name],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// Look a project up by id, falling back to its name.
    pub fn resolve_project(&self, id_or_name: &str) -> Result<Option<Project>> {
        if let Ok(id) = Uuid::parse_str(id_or_name) {
            if let Some(project) = self.get_project(id)? {
                return Ok(Some(project));
            }
        }
        self.get_project_by_name(id_or_name)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::info!(project = %id, name = %input.name, "Project created");
        Ok(Project {
            id,
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    /// Delete a project together with its documents and events.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Document operations
    // ============================================================

    /// Remove a document. Removing the Tasks document destroys its tasks.
    pub fn delete_document(&self, project: &str, kind: DocKind) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM documents WHERE project_id = ? AND kind = ?",
            (project, kind.as_str()),
        )?;
        Ok(rows > 0)
    }

    pub fn list_documents(&self, project: &str) -> Result<Vec<DocumentInfo>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT kind, version FROM documents WHERE project_id = ? ORDER BY kind",
        )?;

        let documents = stmt
            .query_map([project], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(kind, version)| {
                DocKind::from_str(&kind).map(|kind| DocumentInfo {
                    kind,
                    exists: true,
                    version: Some(Version::from_hash(version)),
                })
            })
            .collect();

        Ok(documents)
    }
}

fn ensure_project(conn: &Connection, project: &str) -> Result<(), StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM projects WHERE id = ?",
        [project],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(StoreError::ProjectNotFound(project.to_string()));
    }
    Ok(())
}

impl DocumentStore for Database {
    fn read(&self, project: &str, kind: DocKind) -> Result<Versioned, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                "SELECT content, version FROM documents WHERE project_id = ? AND kind = ?",
                (project, kind.as_str()),
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((content, version)) => Ok(Versioned {
                content,
                version: Version::from_hash(version),
            }),
            None => Err(StoreError::NotFound {
                project: project.to_string(),
                kind,
            }),
        }
    }

    fn write(
        &self,
        project: &str,
        kind: DocKind,
        content: &str,
        expected: Option<&Version>,
    ) -> Result<Version, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        ensure_project(&conn, project)?;

        let version = Version::of(content);
        let now = Utc::now().to_rfc3339();

        // Both statements only touch the row when the stored version is the
        // one the caller read, so the check and the write are one step.
        let rows = match expected {
            Some(expected) => conn.execute(
                "UPDATE documents SET content = ?, version = ?, updated_at = ?
                 WHERE project_id = ? AND kind = ? AND version = ?",
                (
                    content,
                    version.as_str(),
                    &now,
                    project,
                    kind.as_str(),
                    expected.as_str(),
                ),
            )?,
            None => conn.execute(
                "INSERT INTO documents (project_id, kind, content, version, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (project_id, kind) DO NOTHING",
                (project, kind.as_str(), content, version.as_str(), &now),
            )?,
        };

        if rows == 0 {
            return Err(StoreError::Conflict {
                project: project.to_string(),
                kind,
            });
        }

        tracing::debug!(project, kind = %kind, version = %version, "Document written");
        Ok(version)
    }

    fn exists(&self, project: &str, kind: DocKind) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE project_id = ? AND kind = ?",
            (project, kind.as_str()),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl AuditLog for Database {
    fn record(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO task_events (id, project_id, task_id, kind, from_status, to_status, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                event.id.to_string(),
                &event.project_id,
                event.task_id.as_str(),
                event.kind.as_str(),
                event.from.map(|s| s.as_str()),
                event.to.map(|s| s.as_str()),
                &event.detail,
                event.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn events(&self, project: &str, task: Option<&str>) -> Result<Vec<TaskEvent>, StoreError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, task_id, kind, from_status, to_status, detail, created_at
             FROM task_events
             WHERE project_id = ?1 AND (?2 IS NULL OR task_id = ?2)
             ORDER BY rowid",
        )?;

        let events = stmt
            .query_map((project, task), |row| {
                Ok(TaskEvent {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    project_id: row.get(1)?,
                    task_id: TaskId::new(row.get::<_, String>(2)?),
                    kind: EventKind::from_str(&row.get::<_, String>(3)?)
                        .unwrap_or(EventKind::Transition),
                    from: row
                        .get::<_, Option<String>>(4)?
                        .and_then(|s| TaskStatus::from_str(&s)),
                    to: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|s| TaskStatus::from_str(&s)),
                    detail: row.get(6)?,
                    created_at: parse_datetime(row.get::<_, String>(7)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
