//! Append-only annotation store.
//!
//! # Responsibility
//! - Insert annotations with an atomically stamped `created_at`.
//! - List annotations for one manuscript in creation order.
//!
//! # Invariants
//! - There is no update or delete path.
//! - `created_at` of a new annotation is never earlier than any existing
//!   annotation of the same manuscript, so `created_at ASC, id ASC` equals
//!   insertion order.

use crate::db::NOW_EPOCH_MS_SQL;
use crate::model::annotation::{Annotation, AnnotationKind, NewAnnotation};
use crate::model::manuscript::ManuscriptId;
use crate::repo::{ensure_connection_ready, parse_manuscript_id, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

/// Persistence contract for the annotation log.
pub trait AnnotationRepository {
    /// Appends one validated annotation and returns the stored row.
    fn append(
        &self,
        manuscript_id: ManuscriptId,
        author_identity: &str,
        annotation: &NewAnnotation,
    ) -> RepoResult<Annotation>;

    /// Lists every annotation of one manuscript, oldest first.
    fn list(&self, manuscript_id: ManuscriptId) -> RepoResult<Vec<Annotation>>;
}

/// SQLite-backed annotation store.
pub struct SqliteAnnotationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AnnotationRepository for SqliteAnnotationRepository<'_> {
    fn append(
        &self,
        manuscript_id: ManuscriptId,
        author_identity: &str,
        annotation: &NewAnnotation,
    ) -> RepoResult<Annotation> {
        let uuid = manuscript_id.to_string();
        let inserted = self.conn.query_row(
            &format!(
                "INSERT INTO annotations (
                    manuscript_uuid,
                    author_identity,
                    content,
                    chapter_ref,
                    location_hint,
                    kind,
                    created_at
                )
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, MAX(
                    {NOW_EPOCH_MS_SQL},
                    COALESCE(
                        (SELECT MAX(created_at) FROM annotations WHERE manuscript_uuid = ?1),
                        0
                    )
                )
                RETURNING id, created_at;"
            ),
            params![
                uuid,
                author_identity,
                annotation.content.as_str(),
                annotation.chapter_ref,
                annotation.location_hint.as_deref(),
                annotation.kind.as_str(),
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        );

        let (id, created_at) = match inserted {
            Ok(values) => values,
            Err(err) => {
                let err = RepoError::from(err);
                // FK failure: the manuscript row does not exist.
                if err.is_foreign_key_violation() {
                    return Err(RepoError::NotFound(manuscript_id));
                }
                return Err(err);
            }
        };

        Ok(Annotation {
            id,
            manuscript_id,
            author_identity: author_identity.to_string(),
            content: annotation.content.clone(),
            chapter_ref: annotation.chapter_ref,
            location_hint: annotation.location_hint.clone(),
            kind: annotation.kind,
            created_at,
        })
    }

    fn list(&self, manuscript_id: ManuscriptId) -> RepoResult<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                manuscript_uuid,
                author_identity,
                content,
                chapter_ref,
                location_hint,
                kind,
                created_at
             FROM annotations
             WHERE manuscript_uuid = ?1
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([manuscript_id.to_string()])?;
        let mut annotations = Vec::new();
        while let Some(row) = rows.next()? {
            annotations.push(parse_annotation_row(row)?);
        }
        Ok(annotations)
    }
}

fn parse_annotation_row(row: &Row<'_>) -> RepoResult<Annotation> {
    let uuid_text: String = row.get("manuscript_uuid")?;
    let manuscript_id = parse_manuscript_id(&uuid_text, "annotations.manuscript_uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = AnnotationKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in annotations.kind"))
    })?;

    let chapter_ref = match row.get::<_, Option<i64>>("chapter_ref")? {
        Some(value) => Some(u32::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid chapter_ref `{value}` in annotations.chapter_ref"
            ))
        })?),
        None => None,
    };

    Ok(Annotation {
        id: row.get("id")?,
        manuscript_id,
        author_identity: row.get("author_identity")?,
        content: row.get("content")?,
        chapter_ref,
        location_hint: row.get("location_hint")?,
        kind,
        created_at: row.get("created_at")?,
    })
}
