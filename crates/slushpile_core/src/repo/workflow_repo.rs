//! Workflow record store with optimistic versioning.
//!
//! # Responsibility
//! - Load workflow records, creating the initial record lazily for
//!   registered manuscripts.
//! - Apply versioned compare-and-swap writes.
//!
//! # Invariants
//! - The only mutation is `compare_and_swap`, which matches on `version`
//!   and bumps it by one in the same statement.
//! - Notes columns are `COALESCE`d, so a written note is never replaced.

use crate::db::NOW_EPOCH_MS_SQL;
use crate::model::manuscript::ManuscriptId;
use crate::model::workflow::{Outcome, Stage, WorkflowRecord};
use crate::repo::{ensure_connection_ready, parse_manuscript_id, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Workflow columns shared by every select that decodes a `WorkflowRecord`.
pub(crate) const WORKFLOW_COLUMNS: &str = "w.manuscript_uuid AS manuscript_uuid,
    w.stage AS stage,
    w.outcome AS outcome,
    w.reader_notes AS reader_notes,
    w.editor_notes AS editor_notes,
    w.director_notes AS director_notes,
    w.version AS version,
    w.updated_at AS workflow_updated_at";

/// Persistence contract for workflow records.
pub trait WorkflowRepository {
    /// Returns the record, creating it at `Unreviewed` when the manuscript
    /// is registered but has none yet. `None` means unknown manuscript.
    fn get_or_create(&self, id: ManuscriptId) -> RepoResult<Option<WorkflowRecord>>;

    /// Writes `next` if the stored version still equals `expected_version`.
    ///
    /// Returns the committed record (version bumped), or `None` when the
    /// stored version moved on or the record does not exist.
    fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &WorkflowRecord,
    ) -> RepoResult<Option<WorkflowRecord>>;
}

/// SQLite-backed workflow store.
pub struct SqliteWorkflowRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkflowRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn load(&self, id: ManuscriptId) -> RepoResult<Option<WorkflowRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKFLOW_COLUMNS}
             FROM workflow_records w
             WHERE w.manuscript_uuid = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_workflow_row(row)?)),
            None => Ok(None),
        }
    }
}

impl WorkflowRepository for SqliteWorkflowRepository<'_> {
    fn get_or_create(&self, id: ManuscriptId) -> RepoResult<Option<WorkflowRecord>> {
        if let Some(record) = self.load(id)? {
            return Ok(Some(record));
        }

        // No-op for unknown manuscripts; concurrent creators collapse on the key.
        self.conn.execute(
            "INSERT OR IGNORE INTO workflow_records (manuscript_uuid)
             SELECT uuid FROM manuscripts WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        self.load(id)
    }

    fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &WorkflowRecord,
    ) -> RepoResult<Option<WorkflowRecord>> {
        if next.stage.is_terminal() != next.outcome.is_some() {
            return Err(RepoError::InvalidInput(format!(
                "stage `{}` is inconsistent with outcome `{}`",
                next.stage,
                next.outcome.map_or("none", Outcome::as_str)
            )));
        }

        let committed = self
            .conn
            .query_row(
                &format!(
                    "UPDATE workflow_records
                     SET stage = ?3,
                         outcome = ?4,
                         reader_notes = COALESCE(reader_notes, ?5),
                         editor_notes = COALESCE(editor_notes, ?6),
                         director_notes = COALESCE(director_notes, ?7),
                         version = version + 1,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE manuscript_uuid = ?1
                       AND version = ?2
                     RETURNING reader_notes, editor_notes, director_notes, version, updated_at;"
                ),
                params![
                    next.manuscript_id.to_string(),
                    expected_version,
                    next.stage.as_str(),
                    next.outcome.map(Outcome::as_str),
                    next.reader_notes.as_deref(),
                    next.editor_notes.as_deref(),
                    next.director_notes.as_deref(),
                ],
                |row| {
                    Ok(WorkflowRecord {
                        manuscript_id: next.manuscript_id,
                        stage: next.stage,
                        outcome: next.outcome,
                        reader_notes: row.get(0)?,
                        editor_notes: row.get(1)?,
                        director_notes: row.get(2)?,
                        version: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(committed)
    }
}

/// Decodes the `WORKFLOW_COLUMNS` projection.
pub(crate) fn parse_workflow_row(row: &Row<'_>) -> RepoResult<WorkflowRecord> {
    let uuid_text: String = row.get("manuscript_uuid")?;
    let manuscript_id = parse_manuscript_id(&uuid_text, "workflow_records.manuscript_uuid")?;

    let stage_text: String = row.get("stage")?;
    let stage = Stage::parse(&stage_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid stage `{stage_text}` in workflow_records.stage"
        ))
    })?;

    let outcome = match row.get::<_, Option<String>>("outcome")? {
        Some(value) => Some(Outcome::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid outcome `{value}` in workflow_records.outcome"
            ))
        })?),
        None => None,
    };

    let record = WorkflowRecord {
        manuscript_id,
        stage,
        outcome,
        reader_notes: row.get("reader_notes")?,
        editor_notes: row.get("editor_notes")?,
        director_notes: row.get("director_notes")?,
        version: row.get("version")?,
        updated_at: row.get("workflow_updated_at")?,
    };

    if !record.is_consistent() {
        return Err(RepoError::InvalidData(format!(
            "workflow record for {manuscript_id} violates stage/outcome invariant"
        )));
    }
    Ok(record)
}
