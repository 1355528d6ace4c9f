//! Reviewer assignment store.
//!
//! # Invariants
//! - At most one assignment per manuscript; `upsert` replaces it.
//! - Assignments never touch workflow records.

use crate::db::NOW_EPOCH_MS_SQL;
use crate::model::assignment::Assignment;
use crate::model::manuscript::ManuscriptId;
use crate::model::role::Role;
use crate::repo::{ensure_connection_ready, parse_manuscript_id, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

/// Persistence contract for reviewer assignments.
pub trait AssignmentRepository {
    /// Creates or replaces the assignment of one manuscript.
    fn upsert(
        &self,
        manuscript_id: ManuscriptId,
        assignee_identity: &str,
        assigned_by: Role,
    ) -> RepoResult<Assignment>;

    fn get(&self, manuscript_id: ManuscriptId) -> RepoResult<Option<Assignment>>;

    /// Assignments held by one reviewer, most recent first.
    fn list_for_assignee(&self, assignee_identity: &str) -> RepoResult<Vec<Assignment>>;
}

/// SQLite-backed assignment store.
pub struct SqliteAssignmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAssignmentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AssignmentRepository for SqliteAssignmentRepository<'_> {
    fn upsert(
        &self,
        manuscript_id: ManuscriptId,
        assignee_identity: &str,
        assigned_by: Role,
    ) -> RepoResult<Assignment> {
        let assignee = assignee_identity.trim();
        if assignee.is_empty() {
            return Err(RepoError::InvalidInput(
                "assignee identity must not be blank".to_string(),
            ));
        }

        let stored = self.conn.query_row(
            &format!(
                "INSERT INTO manuscript_assignments (
                    manuscript_uuid,
                    assignee_identity,
                    assigned_by_role,
                    assigned_at
                )
                VALUES (?1, ?2, ?3, {NOW_EPOCH_MS_SQL})
                ON CONFLICT(manuscript_uuid) DO UPDATE SET
                    assignee_identity = excluded.assignee_identity,
                    assigned_by_role = excluded.assigned_by_role,
                    assigned_at = excluded.assigned_at
                RETURNING assigned_at;"
            ),
            params![manuscript_id.to_string(), assignee, assigned_by.as_str()],
            |row| row.get::<_, i64>(0),
        );

        let assigned_at = match stored {
            Ok(value) => value,
            Err(err) => {
                let err = RepoError::from(err);
                if err.is_foreign_key_violation() {
                    return Err(RepoError::NotFound(manuscript_id));
                }
                return Err(err);
            }
        };

        Ok(Assignment {
            manuscript_id,
            assignee_identity: assignee.to_string(),
            assigned_by,
            assigned_at,
        })
    }

    fn get(&self, manuscript_id: ManuscriptId) -> RepoResult<Option<Assignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT manuscript_uuid, assignee_identity, assigned_by_role, assigned_at
             FROM manuscript_assignments
             WHERE manuscript_uuid = ?1;",
        )?;
        let mut rows = stmt.query([manuscript_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_assignment_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_for_assignee(&self, assignee_identity: &str) -> RepoResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT manuscript_uuid, assignee_identity, assigned_by_role, assigned_at
             FROM manuscript_assignments
             WHERE assignee_identity = ?1
             ORDER BY assigned_at DESC, manuscript_uuid ASC;",
        )?;
        let mut rows = stmt.query([assignee_identity.trim()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<Assignment> {
    let uuid_text: String = row.get("manuscript_uuid")?;
    let manuscript_id = parse_manuscript_id(&uuid_text, "manuscript_assignments.manuscript_uuid")?;

    let role_text: String = row.get("assigned_by_role")?;
    let assigned_by = role_text.parse::<Role>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid role `{role_text}` in manuscript_assignments.assigned_by_role"
        ))
    })?;

    Ok(Assignment {
        manuscript_id,
        assignee_identity: row.get("assignee_identity")?,
        assigned_by,
        assigned_at: row.get("assigned_at")?,
    })
}
