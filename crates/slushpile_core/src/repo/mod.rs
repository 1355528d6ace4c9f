//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories only operate on fully migrated connections.
//! - Workflow mutations are compare-and-swap on `version`; there is no
//!   blind-overwrite write path.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use crate::model::manuscript::ManuscriptId;
use crate::model::tier::ScoreError;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod annotation_repo;
pub mod assignment_repo;
pub mod manuscript_repo;
pub mod triage_repo;
pub mod workflow_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all pipeline stores.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Referenced manuscript is not registered.
    NotFound(ManuscriptId),
    /// Manuscript id is already registered.
    AlreadyExists(ManuscriptId),
    /// Caller input rejected before reaching SQL.
    InvalidInput(String),
    Score(ScoreError),
    /// Persisted row cannot be converted to a valid model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "manuscript not found: {id}"),
            Self::AlreadyExists(id) => write!(f, "manuscript already registered: {id}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Score(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Score(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ScoreError> for RepoError {
    fn from(value: ScoreError) -> Self {
        Self::Score(value)
    }
}

impl RepoError {
    /// Whether the underlying SQLite error is a primary-key/unique clash.
    pub fn is_duplicate_key(&self) -> bool {
        self.sqlite_extended_code().is_some_and(|code| {
            code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        })
    }

    /// Whether the underlying SQLite error is a foreign-key violation.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlite_extended_code() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
    }

    fn sqlite_extended_code(&self) -> Option<i32> {
        match self {
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Some(err.extended_code)
            }
            _ => None,
        }
    }
}

/// Rejects connections that have not been migrated by this binary.
pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn parse_manuscript_id(value: &str, column: &str) -> RepoResult<ManuscriptId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
