//! Core of the Slushpile acquisition decision pipeline.
//!
//! Score tiering, the role-gated review workflow, the annotation log,
//! triage reads and batch operations. This crate is the single source of
//! truth for pipeline invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, PipelineConfig};
pub use db::{open_db, open_db_in_memory, Database, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::annotation::{Annotation, AnnotationId, AnnotationKind, NewAnnotation};
pub use model::assignment::Assignment;
pub use model::manuscript::{Manuscript, ManuscriptDraft, ManuscriptId, ScoreReport};
pub use model::role::Role;
pub use model::tier::{classify, ScoreError, Tier, TierCounts};
pub use model::workflow::{Outcome, Stage, WorkflowRecord};
pub use repo::{RepoError, RepoResult};
pub use service::annotation_service::{AnnotationError, AnnotationService};
pub use service::batch_service::{
    BatchError, BatchExport, BatchFailure, BatchOperationResult, BatchProgress, BatchService,
    CancellationToken,
};
pub use service::triage_service::{
    ExportRow, ExportSnapshot, TriageEntry, TriageError, TriageQuery, TriageService, TriageSort,
};
pub use service::workflow_service::{
    AdvanceRequest, FastPassOutcome, StageChangeEvent, StageObserver, WorkflowError,
    WorkflowService,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
