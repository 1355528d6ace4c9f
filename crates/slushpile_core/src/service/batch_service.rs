//! Batch operation engine.
//!
//! # Responsibility
//! - Apply assignment and fast pass to a caller-selected set of manuscripts.
//! - Export a consistent tabular snapshot of a manuscript set.
//! - Report outcomes per item instead of aborting on the first failure.
//!
//! # Invariants
//! - An empty id set is rejected before any work starts.
//! - Role gates are checked once per batch, before per-item work.
//! - Items run in parallel on a bounded pool; each worker owns its SQLite
//!   connection.
//! - Committed items stay committed when a batch is cancelled; items not
//!   yet started are left out of `succeeded` and `failed`.

use crate::config::{ConfigError, PipelineConfig};
use crate::db::{Database, DbError};
use crate::model::manuscript::ManuscriptId;
use crate::model::role::Role;
use crate::model::workflow::Outcome;
use crate::repo::annotation_repo::SqliteAnnotationRepository;
use crate::repo::assignment_repo::{AssignmentRepository, SqliteAssignmentRepository};
use crate::repo::triage_repo::SqliteTriageRepository;
use crate::repo::workflow_repo::SqliteWorkflowRepository;
use crate::repo::RepoError;
use crate::service::annotation_service::AnnotationService;
use crate::service::triage_service::{ExportSnapshot, TriageError, TriageService};
use crate::service::workflow_service::{WorkflowError, WorkflowService};
use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Minimum role for batch assign and batch pass.
pub const BATCH_MIN_ROLE: Role = Role::Editor;

/// Precondition failure for a whole batch.
#[derive(Debug)]
pub enum BatchError {
    /// The id set is empty.
    EmptyBatch,
    /// Assignee identity is blank.
    InvalidAssignee,
    Config(ConfigError),
    ThreadPool(ThreadPoolBuildError),
    Db(DbError),
    Repo(RepoError),
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBatch => write!(f, "batch id set must not be empty"),
            Self::InvalidAssignee => write!(f, "assignee identity must not be blank"),
            Self::Config(err) => write!(f, "{err}"),
            Self::ThreadPool(err) => write!(f, "failed to build batch pool: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::ThreadPool(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::EmptyBatch | Self::InvalidAssignee => None,
        }
    }
}

impl From<ConfigError> for BatchError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for BatchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for BatchError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<TriageError> for BatchError {
    fn from(value: TriageError) -> Self {
        match value {
            TriageError::Repo(err) => Self::Repo(err),
        }
    }
}

/// Why one item of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    NotFound,
    InsufficientRole,
    VersionConflict,
    /// Fast pass found a different decision already recorded.
    AlreadyDecided(Outcome),
    /// Storage failure, rendered as text.
    Storage(String),
}

impl Display for BatchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::InsufficientRole => write!(f, "insufficient role"),
            Self::VersionConflict => write!(f, "version conflict"),
            Self::AlreadyDecided(outcome) => write!(f, "already decided: {outcome}"),
            Self::Storage(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl From<WorkflowError> for BatchFailure {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::NotFound(_) => Self::NotFound,
            WorkflowError::InsufficientRole { .. } => Self::InsufficientRole,
            WorkflowError::VersionConflict { .. } => Self::VersionConflict,
            WorkflowError::AlreadyDecided(outcome) => Self::AlreadyDecided(outcome),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<RepoError> for BatchFailure {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(_) => Self::NotFound,
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<DbError> for BatchFailure {
    fn from(value: DbError) -> Self {
        Self::Storage(value.to_string())
    }
}

/// Per-item outcome of one batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOperationResult {
    pub requested_ids: BTreeSet<ManuscriptId>,
    pub succeeded: BTreeSet<ManuscriptId>,
    pub failed: BTreeMap<ManuscriptId, BatchFailure>,
}

impl BatchOperationResult {
    fn new(requested_ids: &BTreeSet<ManuscriptId>) -> Self {
        Self {
            requested_ids: requested_ids.clone(),
            ..Self::default()
        }
    }

    fn fail_all(requested_ids: &BTreeSet<ManuscriptId>, failure: BatchFailure) -> Self {
        let mut result = Self::new(requested_ids);
        result.failed = requested_ids
            .iter()
            .map(|id| (*id, failure.clone()))
            .collect();
        result
    }

    /// Requested ids that were never attempted.
    pub fn skipped(&self) -> BTreeSet<ManuscriptId> {
        self.requested_ids
            .iter()
            .filter(|id| !self.succeeded.contains(id) && !self.failed.contains_key(id))
            .copied()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded.len() + self.failed.len() == self.requested_ids.len()
    }
}

/// Export rows together with per-id resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchExport {
    /// Resolved ids in `succeeded`, unresolved ones as `NotFound`.
    pub result: BatchOperationResult,
    pub snapshot: ExportSnapshot,
}

impl BatchExport {
    pub fn to_csv(&self) -> Vec<u8> {
        self.snapshot.to_csv()
    }
}

/// Cooperative cancellation flag shared with a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-item progress sink for a running batch.
///
/// Called on the worker thread right after the item's write committed or
/// failed. Items not yet started can still be cancelled from here.
pub trait BatchProgress {
    fn item_finished(&self, id: ManuscriptId, outcome: Result<(), &BatchFailure>);
}

/// Batch engine over a file-backed database.
pub struct BatchService {
    db: Database,
    config: PipelineConfig,
    pool: ThreadPool,
    progress: Option<Arc<dyn BatchProgress + Send + Sync>>,
}

impl BatchService {
    /// Builds the worker pool sized by `config.batch_workers`.
    ///
    /// Worker connections use `config.busy_timeout()`.
    pub fn new(db: Database, config: PipelineConfig) -> Result<Self, BatchError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.batch_workers)
            .thread_name(|index| format!("slushpile-batch-{index}"))
            .build()
            .map_err(BatchError::ThreadPool)?;
        let db = db.with_busy_timeout(config.busy_timeout());
        Ok(Self {
            db,
            config,
            pool,
            progress: None,
        })
    }

    /// Reports every attempted item to `progress` as it finishes.
    pub fn with_progress(mut self, progress: Arc<dyn BatchProgress + Send + Sync>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Records `assignee_identity` as reviewer of every id.
    ///
    /// Workflow state is left untouched.
    pub fn assign(
        &self,
        ids: &BTreeSet<ManuscriptId>,
        assignee_identity: &str,
        caller_role: Role,
    ) -> Result<BatchOperationResult, BatchError> {
        self.assign_with_cancel(ids, assignee_identity, caller_role, &CancellationToken::new())
    }

    pub fn assign_with_cancel(
        &self,
        ids: &BTreeSet<ManuscriptId>,
        assignee_identity: &str,
        caller_role: Role,
        token: &CancellationToken,
    ) -> Result<BatchOperationResult, BatchError> {
        if ids.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let assignee = assignee_identity.trim();
        if assignee.is_empty() {
            return Err(BatchError::InvalidAssignee);
        }
        if !caller_role.satisfies(BATCH_MIN_ROLE) {
            return Ok(self.reject_role("batch_assign", ids, caller_role));
        }

        let started_at = Instant::now();
        let result = self.run_items(ids, token, |conn, id| {
            let repo = SqliteAssignmentRepository::try_new(conn)?;
            repo.upsert(id, assignee, caller_role)?;
            Ok(())
        });
        log_batch("batch_assign", &result, started_at);
        Ok(result)
    }

    /// Moves every id straight to `DirectorDecision / Pass`.
    pub fn pass(
        &self,
        ids: &BTreeSet<ManuscriptId>,
        caller_role: Role,
    ) -> Result<BatchOperationResult, BatchError> {
        self.pass_with_cancel(ids, caller_role, &CancellationToken::new())
    }

    pub fn pass_with_cancel(
        &self,
        ids: &BTreeSet<ManuscriptId>,
        caller_role: Role,
        token: &CancellationToken,
    ) -> Result<BatchOperationResult, BatchError> {
        if ids.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        if !caller_role.satisfies(BATCH_MIN_ROLE) {
            return Ok(self.reject_role("batch_pass", ids, caller_role));
        }

        let audit = self.config.audit_stage_changes;
        let started_at = Instant::now();
        let result = self.run_items(ids, token, |conn, id| {
            let audit_log = if audit {
                Some(AnnotationService::new(SqliteAnnotationRepository::try_new(
                    conn,
                )?))
            } else {
                None
            };
            let mut workflow = WorkflowService::new(SqliteWorkflowRepository::try_new(conn)?);
            if let Some(audit_log) = &audit_log {
                workflow = workflow.with_observer(audit_log);
            }
            workflow.fast_pass(id)?;
            Ok(())
        });
        log_batch("batch_pass", &result, started_at);
        Ok(result)
    }

    /// Reads export rows for every id in one transaction.
    ///
    /// Read-only; workflow versions are unchanged.
    pub fn export(&self, ids: &BTreeSet<ManuscriptId>) -> Result<BatchExport, BatchError> {
        if ids.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let started_at = Instant::now();
        let conn = self.db.connect()?;
        let triage = TriageService::new(SqliteTriageRepository::try_new(&conn)?);
        let snapshot = triage.export_rows(ids)?;

        let mut result = BatchOperationResult::new(ids);
        result.succeeded = snapshot.rows.iter().map(|row| row.id).collect();
        result.failed = snapshot
            .missing
            .iter()
            .map(|id| (*id, BatchFailure::NotFound))
            .collect();
        log_batch("batch_export", &result, started_at);

        Ok(BatchExport { result, snapshot })
    }

    fn reject_role(
        &self,
        event: &str,
        ids: &BTreeSet<ManuscriptId>,
        caller_role: Role,
    ) -> BatchOperationResult {
        warn!(
            "event={} module=service status=rejected error_code=insufficient_role role={} requested={}",
            event,
            caller_role,
            ids.len()
        );
        BatchOperationResult::fail_all(ids, BatchFailure::InsufficientRole)
    }

    fn run_items<F>(
        &self,
        ids: &BTreeSet<ManuscriptId>,
        token: &CancellationToken,
        op: F,
    ) -> BatchOperationResult
    where
        F: Fn(&Connection, ManuscriptId) -> Result<(), BatchFailure> + Sync,
    {
        let items = ids.iter().copied().collect::<Vec<_>>();
        let outcomes = self.pool.install(|| {
            items
                .par_iter()
                .map_init(
                    || self.db.connect(),
                    |conn, id| {
                        if token.is_cancelled() {
                            return (*id, None);
                        }
                        let outcome = match conn {
                            Ok(conn) => op(conn, *id),
                            Err(err) => Err(BatchFailure::Storage(err.to_string())),
                        };
                        if let Some(progress) = &self.progress {
                            progress.item_finished(*id, outcome.as_ref().map(|_| ()));
                        }
                        (*id, Some(outcome))
                    },
                )
                .collect::<Vec<_>>()
        });

        let mut result = BatchOperationResult::new(ids);
        for (id, outcome) in outcomes {
            match outcome {
                Some(Ok(())) => {
                    result.succeeded.insert(id);
                }
                Some(Err(failure)) => {
                    result.failed.insert(id, failure);
                }
                None => {}
            }
        }
        result
    }
}

fn log_batch(event: &str, result: &BatchOperationResult, started_at: Instant) {
    info!(
        "event={} module=service status=ok requested={} succeeded={} failed={} skipped={} duration_ms={}",
        event,
        result.requested_ids.len(),
        result.succeeded.len(),
        result.failed.len(),
        result.requested_ids.len() - result.succeeded.len() - result.failed.len(),
        started_at.elapsed().as_millis()
    );
}
