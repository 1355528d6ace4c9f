//! Workflow engine use-case service.
//!
//! # Responsibility
//! - Advance manuscripts through the role-gated review stages.
//! - Provide the administrative fast-pass bypass used by batch operations.
//! - Notify an optional observer after every committed stage change.
//!
//! # Invariants
//! - Every write is a compare-and-swap on `version`; a lost race always
//!   surfaces as `VersionConflict`.
//! - `advance` checks run in a fixed order: not found, version, stage, role,
//!   outcome.
//! - Observer failures never fail the committed transition.

use crate::model::manuscript::ManuscriptId;
use crate::model::role::Role;
use crate::model::workflow::{Outcome, Stage, WorkflowRecord};
use crate::repo::workflow_repo::WorkflowRepository;
use crate::repo::RepoError;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Service error for workflow operations.
#[derive(Debug)]
pub enum WorkflowError {
    /// Manuscript is not registered in the directory.
    NotFound(ManuscriptId),
    /// Requested transition is not the immediate forward step.
    StageSkipped {
        from: Stage,
        requested: Option<Stage>,
    },
    InsufficientRole {
        required: Role,
        actual: Role,
    },
    /// Caller's expected version is stale.
    VersionConflict { expected: i64, actual: i64 },
    /// Transition into `DirectorDecision` without an outcome.
    MissingOutcome,
    /// Outcome supplied for a non-terminal transition.
    UnexpectedOutcome(Outcome),
    /// Fast pass refused to overwrite an existing non-pass decision.
    AlreadyDecided(Outcome),
    Repo(RepoError),
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "manuscript not found: {id}"),
            Self::StageSkipped { from, requested } => match requested {
                Some(to) => write!(f, "cannot move from `{from}` to `{to}`"),
                None => write!(f, "stage `{from}` is terminal"),
            },
            Self::InsufficientRole { required, actual } => {
                write!(f, "role `{actual}` cannot take a step that requires `{required}`")
            }
            Self::VersionConflict { expected, actual } => write!(
                f,
                "workflow version conflict: expected {expected}, current {actual}"
            ),
            Self::MissingOutcome => write!(f, "director decision requires an outcome"),
            Self::UnexpectedOutcome(outcome) => {
                write!(f, "outcome `{outcome}` is only allowed on the director decision")
            }
            Self::AlreadyDecided(outcome) => {
                write!(f, "manuscript already decided with outcome `{outcome}`")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for WorkflowError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl WorkflowError {
    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::StageSkipped { .. } => "stage_skipped",
            Self::InsufficientRole { .. } => "insufficient_role",
            Self::VersionConflict { .. } => "version_conflict",
            Self::MissingOutcome => "missing_outcome",
            Self::UnexpectedOutcome(_) => "unexpected_outcome",
            Self::AlreadyDecided(_) => "already_decided",
            Self::Repo(_) => "storage",
        }
    }
}

/// Caller input for one forward step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceRequest {
    /// Requested next stage; `None` means the immediate successor.
    pub target: Option<Stage>,
    /// Notes for the slot owned by this edge. Blank is stored as absent.
    pub notes: Option<String>,
    /// Required when entering `DirectorDecision`, forbidden otherwise.
    pub outcome: Option<Outcome>,
    pub expected_version: i64,
}

impl AdvanceRequest {
    pub fn at_version(expected_version: i64) -> Self {
        Self {
            expected_version,
            ..Self::default()
        }
    }

    pub fn to(mut self, target: Stage) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Result of a fast pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPassOutcome {
    /// Record moved to `DirectorDecision / Pass`.
    Passed(WorkflowRecord),
    /// Record was already passed; nothing written.
    AlreadyPassed(WorkflowRecord),
}

impl FastPassOutcome {
    pub fn record(&self) -> &WorkflowRecord {
        match self {
            Self::Passed(record) | Self::AlreadyPassed(record) => record,
        }
    }
}

/// Committed stage transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChangeEvent {
    pub manuscript_id: ManuscriptId,
    pub from: Stage,
    pub to: Stage,
    pub outcome: Option<Outcome>,
    /// Role of the caller, `None` for the fast-pass bypass.
    pub actor: Option<Role>,
    /// Version after the transition.
    pub version: i64,
}

/// Sink notified after each committed stage change.
pub trait StageObserver {
    fn stage_changed(&self, event: &StageChangeEvent) -> Result<(), Box<dyn Error>>;
}

/// Workflow engine over a repository implementation.
pub struct WorkflowService<'obs, R: WorkflowRepository> {
    repo: R,
    observer: Option<&'obs dyn StageObserver>,
}

impl<'obs, R: WorkflowRepository> WorkflowService<'obs, R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            observer: None,
        }
    }

    /// Attaches a stage-change observer.
    pub fn with_observer(mut self, observer: &'obs dyn StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the current record, creating the initial one when missing.
    pub fn get(&self, manuscript_id: ManuscriptId) -> Result<WorkflowRecord, WorkflowError> {
        self.repo
            .get_or_create(manuscript_id)?
            .ok_or(WorkflowError::NotFound(manuscript_id))
    }

    /// Moves a manuscript one stage forward.
    ///
    /// # Errors
    /// - `NotFound` for unknown manuscripts.
    /// - `VersionConflict` when `expected_version` is stale or the write
    ///   loses a race.
    /// - `StageSkipped` for terminal records and non-successor targets.
    /// - `InsufficientRole` when the caller is below the edge's minimum role.
    /// - `MissingOutcome` / `UnexpectedOutcome` for outcome misuse.
    pub fn advance(
        &self,
        manuscript_id: ManuscriptId,
        caller_role: Role,
        request: AdvanceRequest,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let started_at = Instant::now();
        match self.try_advance(manuscript_id, caller_role, request) {
            Ok(record) => {
                info!(
                    "event=workflow_advance module=service status=ok stage={} version={} duration_ms={}",
                    record.stage,
                    record.version,
                    started_at.elapsed().as_millis()
                );
                Ok(record)
            }
            Err(err) => {
                debug!(
                    "event=workflow_advance module=service status=rejected error_code={} duration_ms={}",
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    fn try_advance(
        &self,
        manuscript_id: ManuscriptId,
        caller_role: Role,
        request: AdvanceRequest,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let current = self.get(manuscript_id)?;
        if request.expected_version != current.version {
            return Err(WorkflowError::VersionConflict {
                expected: request.expected_version,
                actual: current.version,
            });
        }

        let next_stage = match current.stage.next() {
            Some(next) if request.target.map_or(true, |target| target == next) => next,
            _ => {
                return Err(WorkflowError::StageSkipped {
                    from: current.stage,
                    requested: request.target,
                })
            }
        };
        let edge = next_stage.entry_edge().ok_or(WorkflowError::StageSkipped {
            from: current.stage,
            requested: Some(next_stage),
        })?;

        if !caller_role.satisfies(edge.min_role) {
            return Err(WorkflowError::InsufficientRole {
                required: edge.min_role,
                actual: caller_role,
            });
        }

        match (next_stage.is_terminal(), request.outcome) {
            (true, None) => return Err(WorkflowError::MissingOutcome),
            (false, Some(outcome)) => return Err(WorkflowError::UnexpectedOutcome(outcome)),
            _ => {}
        }

        let mut next = current.clone();
        next.stage = next_stage;
        next.outcome = request.outcome;
        next.write_notes_once(edge.notes_field, normalize_notes(request.notes));

        let committed = self.swap(&current, &next)?;
        self.notify(StageChangeEvent {
            manuscript_id,
            from: current.stage,
            to: committed.stage,
            outcome: committed.outcome,
            actor: Some(caller_role),
            version: committed.version,
        });
        Ok(committed)
    }

    /// Moves a manuscript straight to `DirectorDecision / Pass`.
    ///
    /// Bypasses the stage table and role gates; callers gate access. Notes
    /// are left untouched.
    ///
    /// # Errors
    /// - `NotFound` for unknown manuscripts.
    /// - `AlreadyDecided` when a different outcome is already recorded.
    /// - `VersionConflict` when a concurrent write won the race.
    pub fn fast_pass(&self, manuscript_id: ManuscriptId) -> Result<FastPassOutcome, WorkflowError> {
        let current = self.get(manuscript_id)?;
        match current.outcome {
            Some(Outcome::Pass) => return Ok(FastPassOutcome::AlreadyPassed(current)),
            Some(outcome) => return Err(WorkflowError::AlreadyDecided(outcome)),
            None => {}
        }

        let mut next = current.clone();
        next.stage = Stage::DirectorDecision;
        next.outcome = Some(Outcome::Pass);

        let committed = self.swap(&current, &next)?;
        info!(
            "event=workflow_fast_pass module=service status=ok from={} version={}",
            current.stage, committed.version
        );
        self.notify(StageChangeEvent {
            manuscript_id,
            from: current.stage,
            to: committed.stage,
            outcome: committed.outcome,
            actor: None,
            version: committed.version,
        });
        Ok(FastPassOutcome::Passed(committed))
    }

    fn swap(
        &self,
        current: &WorkflowRecord,
        next: &WorkflowRecord,
    ) -> Result<WorkflowRecord, WorkflowError> {
        if let Some(committed) = self.repo.compare_and_swap(current.version, next)? {
            return Ok(committed);
        }
        let actual = self.get(current.manuscript_id)?.version;
        Err(WorkflowError::VersionConflict {
            expected: current.version,
            actual,
        })
    }

    fn notify(&self, event: StageChangeEvent) {
        let Some(observer) = self.observer else {
            return;
        };
        if let Err(err) = observer.stage_changed(&event) {
            warn!(
                "event=stage_observer module=service status=error to={} error={}",
                event.to, err
            );
        }
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
