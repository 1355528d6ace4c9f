//! Joined manuscript + workflow reads for triage and export.
//!
//! # Invariants
//! - Each call issues its reads inside one transaction, so rows reflect a
//!   single consistent snapshot.
//! - Read-only: never creates workflow records or bumps versions.

use crate::model::manuscript::{Manuscript, ManuscriptId};
use crate::model::workflow::WorkflowRecord;
use crate::repo::manuscript_repo::{parse_manuscript_row, MANUSCRIPT_COLUMNS};
use crate::repo::workflow_repo::{parse_workflow_row, WORKFLOW_COLUMNS};
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;

/// Max ids bound per `IN (...)` query.
const ID_CHUNK_SIZE: usize = 500;

/// One manuscript with its workflow state.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageRow {
    pub manuscript: Manuscript,
    /// Falls back to a fresh `Unreviewed` record when none is stored yet.
    pub workflow: WorkflowRecord,
}

/// Read contract for triage views.
pub trait TriageSource {
    /// All manuscripts with workflow state.
    fn triage_rows(&self) -> RepoResult<Vec<TriageRow>>;
    /// Rows for the given ids; unknown ids are simply absent.
    fn triage_rows_for(&self, ids: &BTreeSet<ManuscriptId>) -> RepoResult<Vec<TriageRow>>;
}

/// SQLite-backed triage reader.
pub struct SqliteTriageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTriageRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TriageSource for SqliteTriageRepository<'_> {
    fn triage_rows(&self) -> RepoResult<Vec<TriageRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MANUSCRIPT_COLUMNS}, {WORKFLOW_COLUMNS}
             FROM manuscripts m
             LEFT JOIN workflow_records w ON w.manuscript_uuid = m.uuid
             ORDER BY m.created_at ASC, m.uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_triage_row(row)?);
        }
        Ok(items)
    }

    fn triage_rows_for(&self, ids: &BTreeSet<ManuscriptId>) -> RepoResult<Vec<TriageRow>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let all_ids = ids.iter().collect::<Vec<_>>();
        let mut items = Vec::with_capacity(ids.len());

        for chunk in all_ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let bind_values = chunk
                .iter()
                .map(|id| Value::Text(id.to_string()))
                .collect::<Vec<_>>();

            let mut stmt = tx.prepare(&format!(
                "SELECT {MANUSCRIPT_COLUMNS}, {WORKFLOW_COLUMNS}
                 FROM manuscripts m
                 LEFT JOIN workflow_records w ON w.manuscript_uuid = m.uuid
                 WHERE m.uuid IN ({placeholders})
                 ORDER BY m.uuid ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                items.push(parse_triage_row(row)?);
            }
        }
        tx.commit()?;

        items.sort_by_key(|item| item.manuscript.id);
        Ok(items)
    }
}

fn parse_triage_row(row: &Row<'_>) -> RepoResult<TriageRow> {
    let manuscript = parse_manuscript_row(row)?;
    let workflow = match row.get::<_, Option<String>>("manuscript_uuid")? {
        Some(_) => parse_workflow_row(row)?,
        None => WorkflowRecord::new(manuscript.id),
    };
    Ok(TriageRow {
        manuscript,
        workflow,
    })
}
