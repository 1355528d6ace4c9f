//! Manuscript directory contract and SQLite adapter.
//!
//! # Responsibility
//! - Expose manuscript existence and metadata to triage and export.
//! - Accept acquisition scores delivered by the analysis collaborator.
//! - Create the `Unreviewed` workflow record when a manuscript enters triage.
//!
//! # Invariants
//! - Registration writes the manuscript and its workflow record in one
//!   transaction.
//! - Stored scores always lie in `[0, 100]`.

use crate::db::NOW_EPOCH_MS_SQL;
use crate::model::manuscript::{Manuscript, ManuscriptDraft, ManuscriptId, ScoreReport};
use crate::model::tier::validate_score;
use crate::repo::{ensure_connection_ready, parse_manuscript_id, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

/// Manuscript columns shared by every select that decodes a `Manuscript`.
pub(crate) const MANUSCRIPT_COLUMNS: &str = "m.uuid AS uuid,
    m.title AS title,
    m.word_count AS word_count,
    m.author_name AS author_name,
    m.genre AS genre,
    m.score AS score,
    m.score_breakdown AS score_breakdown,
    m.created_at AS manuscript_created_at";

/// Read/write contract of the manuscript directory collaborator.
pub trait ManuscriptDirectory {
    /// Registers a manuscript into triage at stage `Unreviewed`.
    fn register(&self, draft: &ManuscriptDraft) -> RepoResult<Manuscript>;
    /// Stores the latest acquisition score report.
    fn record_score(&self, id: ManuscriptId, report: &ScoreReport) -> RepoResult<()>;
    fn get(&self, id: ManuscriptId) -> RepoResult<Option<Manuscript>>;
    fn exists(&self, id: ManuscriptId) -> RepoResult<bool>;
    /// Lists all manuscripts ordered by `created_at ASC, uuid ASC`.
    fn list_all(&self) -> RepoResult<Vec<Manuscript>>;
}

/// SQLite-backed manuscript directory.
pub struct SqliteManuscriptDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteManuscriptDirectory<'conn> {
    /// Constructs a directory from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ManuscriptDirectory for SqliteManuscriptDirectory<'_> {
    fn register(&self, draft: &ManuscriptDraft) -> RepoResult<Manuscript> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(RepoError::InvalidInput(
                "manuscript title must not be blank".to_string(),
            ));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO manuscripts (uuid, title, word_count, author_name, genre)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                draft.id.to_string(),
                title,
                draft.word_count,
                normalize_optional(draft.author_name.as_deref()),
                normalize_optional(draft.genre.as_deref()),
            ],
        );
        if let Err(err) = inserted {
            let err = RepoError::from(err);
            if err.is_duplicate_key() {
                return Err(RepoError::AlreadyExists(draft.id));
            }
            return Err(err);
        }
        tx.execute(
            "INSERT INTO workflow_records (manuscript_uuid) VALUES (?1);",
            [draft.id.to_string()],
        )?;
        tx.commit()?;

        info!("event=manuscript_register module=repo status=ok");
        self.get(draft.id)?
            .ok_or_else(|| RepoError::InvalidData("registered manuscript missing on read-back".to_string()))
    }

    fn record_score(&self, id: ManuscriptId, report: &ScoreReport) -> RepoResult<()> {
        if let Some(score) = report.overall {
            validate_score(score)?;
        }
        for score in report.breakdown.values() {
            validate_score(*score)?;
        }
        let breakdown = serde_json::to_string(&report.breakdown)
            .map_err(|err| RepoError::InvalidInput(format!("score breakdown: {err}")))?;

        let changed = self.conn.execute(
            &format!(
                "UPDATE manuscripts
                 SET score = ?2,
                     score_breakdown = ?3,
                     updated_at = {NOW_EPOCH_MS_SQL}
                 WHERE uuid = ?1;"
            ),
            params![id.to_string(), report.overall, breakdown],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get(&self, id: ManuscriptId) -> RepoResult<Option<Manuscript>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MANUSCRIPT_COLUMNS}
             FROM manuscripts m
             WHERE m.uuid = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_manuscript_row(row)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, id: ManuscriptId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM manuscripts WHERE uuid = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_all(&self) -> RepoResult<Vec<Manuscript>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MANUSCRIPT_COLUMNS}
             FROM manuscripts m
             ORDER BY m.created_at ASC, m.uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut manuscripts = Vec::new();
        while let Some(row) = rows.next()? {
            manuscripts.push(parse_manuscript_row(row)?);
        }
        Ok(manuscripts)
    }
}

/// Decodes the `MANUSCRIPT_COLUMNS` projection.
pub(crate) fn parse_manuscript_row(row: &Row<'_>) -> RepoResult<Manuscript> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_manuscript_id(&uuid_text, "manuscripts.uuid")?;

    let word_count: i64 = row.get("word_count")?;
    let word_count = u32::try_from(word_count).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid word_count `{word_count}` in manuscripts.word_count"
        ))
    })?;

    let score: Option<f64> = row.get("score")?;
    if let Some(value) = score {
        validate_score(value).map_err(|_| {
            RepoError::InvalidData(format!("invalid score `{value}` in manuscripts.score"))
        })?;
    }

    let breakdown_text: String = row.get("score_breakdown")?;
    let score_breakdown: BTreeMap<String, f64> = serde_json::from_str(&breakdown_text)
        .map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid json in manuscripts.score_breakdown: {err}"
            ))
        })?;

    Ok(Manuscript {
        id,
        title: row.get("title")?,
        word_count,
        author_name: row.get("author_name")?,
        genre: row.get("genre")?,
        score,
        score_breakdown,
        created_at: row.get("manuscript_created_at")?,
    })
}

fn normalize_optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
