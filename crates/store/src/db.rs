use std::fs;
use std::path::{Path, PathBuf};

use protocol::{Annotation, AnnotationId, TaskStatus};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::{DbError, Result};

/// SQLite-backed annotation and task-status tables.
pub struct AnnotationDb {
    conn: Connection,
    path: Option<PathBuf>,
}

impl AnnotationDb {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_migrations(&conn)?;
        debug!("opened annotation db at {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn begin_tx(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn list_annotations(&self) -> Result<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, gloss, start_time, end_time FROM annotations \
             ORDER BY task_id, start_time",
        )?;
        let rows = stmt.query_map([], read_annotation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn annotations_for_task(&self, task_id: &str) -> Result<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, gloss, start_time, end_time FROM annotations \
             WHERE task_id = ?1 ORDER BY start_time",
        )?;
        let rows = stmt.query_map(params![task_id], read_annotation)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_annotation(&self, id: &str) -> Result<Option<Annotation>> {
        let found = self
            .conn
            .query_row(
                "SELECT id, task_id, gloss, start_time, end_time FROM annotations WHERE id = ?1",
                params![id],
                read_annotation,
            )
            .optional()?;
        Ok(found)
    }

    pub fn insert_annotation(&self, annotation: &Annotation) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO annotations(id, task_id, gloss, start_time, end_time, created_at) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                annotation.id.to_string(),
                annotation.task_id,
                annotation.label,
                annotation.start_time,
                annotation.end_time,
                now
            ],
        )?;
        Ok(())
    }

    /// Insert every row in one transaction, replacing rows with the same id.
    pub fn import_annotations(&self, annotations: &[Annotation]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.begin_tx()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO annotations(id, task_id, gloss, start_time, end_time, created_at) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for a in annotations {
                stmt.execute(params![
                    a.id.to_string(),
                    a.task_id,
                    a.label,
                    a.start_time,
                    a.end_time,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(annotations.len())
    }

    pub fn update_annotation_times(
        &self,
        id: &str,
        start_time: f64,
        end_time: f64,
    ) -> Result<Annotation> {
        let changed = self.conn.execute(
            "UPDATE annotations SET start_time = ?2, end_time = ?3 WHERE id = ?1",
            params![id, start_time, end_time],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(id.to_string()));
        }
        self.get_annotation(id)?
            .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    /// Deleting a missing id is not an error.
    pub fn delete_annotation(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM annotations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn delete_task_annotations(&self, task_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM annotations WHERE task_id = ?1",
            params![task_id],
        )?;
        Ok(changed)
    }

    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO task_status(task_id, status, updated_at) VALUES(?1, ?2, ?3) \
             ON CONFLICT(task_id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![task_id, status.as_str(), now],
        )?;
        Ok(())
    }

    pub fn task_status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM task_status WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| s.parse().unwrap_or(TaskStatus::Unknown)))
    }

    /// Every explicitly stored status.
    pub fn task_statuses(&self) -> Result<Vec<(String, TaskStatus)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, status FROM task_status")?;
        let rows = stmt.query_map([], |row| {
            let task_id: String = row.get(0)?;
            let status: String = row.get(1)?;
            Ok((task_id, status.parse().unwrap_or(TaskStatus::Unknown)))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn read_annotation(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    let id: String = row.get(0)?;
    let uuid = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    Ok(Annotation {
        id: AnnotationId(uuid),
        task_id: row.get(1)?,
        label: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
    })
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    Ok(())
}
