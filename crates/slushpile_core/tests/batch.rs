use slushpile_core::db::Database;
use slushpile_core::repo::annotation_repo::SqliteAnnotationRepository;
use slushpile_core::repo::assignment_repo::{AssignmentRepository, SqliteAssignmentRepository};
use slushpile_core::repo::manuscript_repo::{ManuscriptDirectory, SqliteManuscriptDirectory};
use slushpile_core::repo::workflow_repo::SqliteWorkflowRepository;
use slushpile_core::{
    AdvanceRequest, AnnotationKind, AnnotationService, BatchError, BatchFailure, BatchProgress,
    BatchService, CancellationToken, ManuscriptDraft, ManuscriptId, Outcome, PipelineConfig,
    Role, ScoreReport, Stage, WorkflowError, WorkflowRecord, WorkflowService,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct Fixture {
    _dir: TempDir,
    db: Database,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("batch.db")).unwrap();
        Self { _dir: dir, db }
    }

    fn register(&self, title: &str, score: Option<f64>) -> ManuscriptId {
        let conn = self.db.connect().unwrap();
        let directory = SqliteManuscriptDirectory::try_new(&conn).unwrap();
        let id = directory
            .register(&ManuscriptDraft::new(title, 50_000))
            .unwrap()
            .id;
        if let Some(score) = score {
            directory
                .record_score(id, &ScoreReport::overall(score))
                .unwrap();
        }
        id
    }

    fn advance(&self, id: ManuscriptId, role: Role, request: AdvanceRequest) -> WorkflowRecord {
        let conn = self.db.connect().unwrap();
        WorkflowService::new(SqliteWorkflowRepository::try_new(&conn).unwrap())
            .advance(id, role, request)
            .unwrap()
    }

    fn record(&self, id: ManuscriptId) -> WorkflowRecord {
        let conn = self.db.connect().unwrap();
        WorkflowService::new(SqliteWorkflowRepository::try_new(&conn).unwrap())
            .get(id)
            .unwrap()
    }

    fn batch(&self, config: PipelineConfig) -> BatchService {
        BatchService::new(self.db.clone(), config).unwrap()
    }
}

#[test]
fn pass_succeeds_per_item_and_reports_missing_ids() {
    let fixture = Fixture::new();
    let a = fixture.register("Alpha", Some(30.0));
    let c = fixture.register("Gamma", Some(85.0));
    fixture.advance(a, Role::Reader, AdvanceRequest::at_version(0));
    fixture.advance(a, Role::Editor, AdvanceRequest::at_version(1));
    let b = Uuid::new_v4();

    let result = fixture
        .batch(PipelineConfig::default())
        .pass(&BTreeSet::from([a, b, c]), Role::Editor)
        .unwrap();

    assert_eq!(result.requested_ids, BTreeSet::from([a, b, c]));
    assert_eq!(result.succeeded, BTreeSet::from([a, c]));
    assert_eq!(result.failed, BTreeMap::from([(b, BatchFailure::NotFound)]));
    assert!(result.is_complete());
    for id in [a, c] {
        let record = fixture.record(id);
        assert_eq!(record.stage, Stage::DirectorDecision);
        assert_eq!(record.outcome, Some(Outcome::Pass));
    }
}

#[test]
fn pass_does_not_overwrite_an_acquisition() {
    let fixture = Fixture::new();
    let bought = fixture.register("Bought", None);
    let passed = fixture.register("Already Passed", None);
    fixture.advance(bought, Role::Reader, AdvanceRequest::at_version(0));
    fixture.advance(bought, Role::Editor, AdvanceRequest::at_version(1));
    fixture.advance(
        bought,
        Role::Director,
        AdvanceRequest::at_version(2).with_outcome(Outcome::Acquire),
    );

    let batch = fixture.batch(PipelineConfig::default());
    batch.pass(&BTreeSet::from([passed]), Role::Editor).unwrap();
    let version_after_first_pass = fixture.record(passed).version;

    let result = batch
        .pass(&BTreeSet::from([bought, passed]), Role::Director)
        .unwrap();
    assert_eq!(result.succeeded, BTreeSet::from([passed]));
    assert_eq!(
        result.failed.get(&bought),
        Some(&BatchFailure::AlreadyDecided(Outcome::Acquire))
    );
    assert_eq!(fixture.record(passed).version, version_after_first_pass);
}

#[test]
fn role_failure_marks_every_item_without_work() {
    let fixture = Fixture::new();
    let a = fixture.register("One", None);
    let b = fixture.register("Two", None);
    let batch = fixture.batch(PipelineConfig::default());
    let ids = BTreeSet::from([a, b]);

    let passed = batch.pass(&ids, Role::Reader).unwrap();
    assert!(passed.succeeded.is_empty());
    assert!(passed
        .failed
        .values()
        .all(|failure| *failure == BatchFailure::InsufficientRole));
    assert_eq!(passed.failed.len(), 2);
    assert_eq!(fixture.record(a).version, 0);

    let assigned = batch.assign(&ids, "reader-7", Role::Reader).unwrap();
    assert_eq!(assigned.failed.len(), 2);
}

#[test]
fn empty_batches_and_blank_assignees_are_preconditions() {
    let fixture = Fixture::new();
    let id = fixture.register("Solo", None);
    let batch = fixture.batch(PipelineConfig::default());
    let empty = BTreeSet::new();

    assert!(matches!(
        batch.pass(&empty, Role::Admin),
        Err(BatchError::EmptyBatch)
    ));
    assert!(matches!(
        batch.assign(&empty, "reader-1", Role::Admin),
        Err(BatchError::EmptyBatch)
    ));
    assert!(matches!(batch.export(&empty), Err(BatchError::EmptyBatch)));
    assert!(matches!(
        batch.assign(&BTreeSet::from([id]), "   ", Role::Admin),
        Err(BatchError::InvalidAssignee)
    ));
}

#[test]
fn assign_records_reviewer_and_leaves_workflow_alone() {
    let fixture = Fixture::new();
    let a = fixture.register("Assigned", None);
    let missing = Uuid::new_v4();
    let batch = fixture.batch(PipelineConfig::default());

    let result = batch
        .assign(&BTreeSet::from([a, missing]), "reader-7", Role::Editor)
        .unwrap();
    assert_eq!(result.succeeded, BTreeSet::from([a]));
    assert_eq!(result.failed.get(&missing), Some(&BatchFailure::NotFound));

    let record = fixture.record(a);
    assert_eq!(record.stage, Stage::Unreviewed);
    assert_eq!(record.version, 0);

    batch
        .assign(&BTreeSet::from([a]), "reader-9", Role::Director)
        .unwrap();
    let conn = fixture.db.connect().unwrap();
    let assignments = SqliteAssignmentRepository::try_new(&conn).unwrap();
    let current = assignments.get(a).unwrap().unwrap();
    assert_eq!(current.assignee_identity, "reader-9");
    assert_eq!(current.assigned_by, Role::Director);
    assert!(assignments.list_for_assignee("reader-7").unwrap().is_empty());
}

#[test]
fn export_is_read_only_and_renders_csv() {
    let fixture = Fixture::new();
    let a = fixture.register("Tide, Turning", Some(79.6));
    let b = fixture.register("Plain", None);
    fixture.advance(a, Role::Reader, AdvanceRequest::at_version(0));
    let missing = Uuid::new_v4();
    let versions_before = [fixture.record(a).version, fixture.record(b).version];

    let export = fixture
        .batch(PipelineConfig::default())
        .export(&BTreeSet::from([a, b, missing]))
        .unwrap();

    let versions_after = [fixture.record(a).version, fixture.record(b).version];
    assert_eq!(versions_before, versions_after);
    assert_eq!(export.result.succeeded, BTreeSet::from([a, b]));
    assert_eq!(
        export.result.failed,
        BTreeMap::from([(missing, BatchFailure::NotFound)])
    );

    let csv = String::from_utf8(export.to_csv()).unwrap();
    let lines = csv.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id,title,score,tier,stage,outcome");
    let expected_a = format!("{a},\"Tide, Turning\",80,Strong Consider,reader_reviewed,");
    let expected_b = format!("{b},Plain,,,unreviewed,");
    let mut expected = vec![(a, expected_a), (b, expected_b)];
    expected.sort_by_key(|(id, _)| *id);
    assert_eq!(lines[1], expected[0].1);
    assert_eq!(lines[2], expected[1].1);
}

#[test]
fn cancelled_batch_omits_unstarted_items() {
    let fixture = Fixture::new();
    let ids = (0..5)
        .map(|index| fixture.register(&format!("Draft {index}"), None))
        .collect::<BTreeSet<_>>();
    let token = CancellationToken::new();
    token.cancel();

    let result = fixture
        .batch(PipelineConfig::default())
        .pass_with_cancel(&ids, Role::Editor, &token)
        .unwrap();

    assert_eq!(result.requested_ids, ids);
    assert!(result.succeeded.is_empty());
    assert!(result.failed.is_empty());
    assert_eq!(result.skipped(), ids);
    for id in &ids {
        assert_eq!(fixture.record(*id).stage, Stage::Unreviewed);
    }
}

struct CancelAfterFirstSuccess {
    token: CancellationToken,
}

impl BatchProgress for CancelAfterFirstSuccess {
    fn item_finished(&self, _id: ManuscriptId, outcome: Result<(), &BatchFailure>) {
        if outcome.is_ok() {
            self.token.cancel();
        }
    }
}

#[test]
fn cancelling_mid_batch_keeps_committed_items() {
    let fixture = Fixture::new();
    let ids = (0..6)
        .map(|index| fixture.register(&format!("Queue {index}"), None))
        .collect::<BTreeSet<_>>();
    let token = CancellationToken::new();
    let config = PipelineConfig {
        batch_workers: 1,
        ..PipelineConfig::default()
    };
    let batch = fixture
        .batch(config)
        .with_progress(Arc::new(CancelAfterFirstSuccess {
            token: token.clone(),
        }));

    let result = batch.pass_with_cancel(&ids, Role::Editor, &token).unwrap();

    assert_eq!(result.succeeded.len(), 1);
    assert!(result.failed.is_empty());
    let skipped = result.skipped();
    assert_eq!(skipped.len(), ids.len() - 1);
    assert!(!result.is_complete());

    let mut covered = result.succeeded.clone();
    covered.extend(result.failed.keys().copied());
    covered.extend(skipped.iter().copied());
    assert_eq!(covered, ids);

    for id in &result.succeeded {
        let record = fixture.record(*id);
        assert_eq!(record.stage, Stage::DirectorDecision);
        assert_eq!(record.outcome, Some(Outcome::Pass));
    }
    for id in &skipped {
        let record = fixture.record(*id);
        assert_eq!(record.stage, Stage::Unreviewed);
        assert_eq!(record.version, 0);
    }
}

#[test]
fn pass_racing_a_reader_advance_never_loses_a_write() {
    let fixture = Fixture::new();
    let batch = Arc::new(fixture.batch(PipelineConfig::default()));

    for round in 0..20 {
        let id = fixture.register(&format!("Contested {round}"), None);
        let barrier = Arc::new(Barrier::new(2));

        let reader = {
            let db = fixture.db.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = db.connect().unwrap();
                let workflow =
                    WorkflowService::new(SqliteWorkflowRepository::try_new(&conn).unwrap());
                barrier.wait();
                workflow.advance(
                    id,
                    Role::Reader,
                    AdvanceRequest::at_version(0).with_notes("tight opening"),
                )
            })
        };
        let editor = {
            let batch = Arc::clone(&batch);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                batch.pass(&BTreeSet::from([id]), Role::Editor).unwrap()
            })
        };

        let advanced = reader.join().unwrap();
        let passed = editor.join().unwrap();
        let record = fixture.record(id);

        match (&advanced, passed.failed.get(&id)) {
            (Ok(_), Some(BatchFailure::VersionConflict)) => {
                assert_eq!(record.stage, Stage::ReaderReviewed);
                assert_eq!(record.version, 1);
                assert_eq!(record.outcome, None);
            }
            (Ok(_), None) => {
                assert_eq!(passed.succeeded, BTreeSet::from([id]));
                assert_eq!(record.stage, Stage::DirectorDecision);
                assert_eq!(record.outcome, Some(Outcome::Pass));
                assert_eq!(record.version, 2);
                assert_eq!(record.reader_notes.as_deref(), Some("tight opening"));
            }
            (Err(WorkflowError::VersionConflict { expected: 0, .. }), None) => {
                assert_eq!(record.stage, Stage::DirectorDecision);
                assert_eq!(record.outcome, Some(Outcome::Pass));
                assert_eq!(record.version, 1);
                assert_eq!(record.reader_notes, None);
            }
            other => panic!("unexpected race result: {other:?}"),
        }
    }
}

#[test]
fn batch_connections_use_the_configured_busy_timeout() {
    let fixture = Fixture::new();
    let config = PipelineConfig {
        busy_timeout_ms: 250,
        ..PipelineConfig::default()
    };

    let batch = fixture.batch(config);
    assert_eq!(batch.database().busy_timeout(), Duration::from_millis(250));
    assert_eq!(fixture.db.busy_timeout(), Duration::from_secs(5));
}

#[test]
fn large_pass_runs_on_the_worker_pool() {
    let fixture = Fixture::new();
    let ids = (0..40)
        .map(|index| fixture.register(&format!("Slush {index}"), Some(10.0)))
        .collect::<BTreeSet<_>>();
    let config = PipelineConfig {
        batch_workers: 8,
        ..PipelineConfig::default()
    };

    let result = fixture.batch(config).pass(&ids, Role::Admin).unwrap();
    assert_eq!(result.succeeded, ids);
    assert!(result.failed.is_empty());
}

#[test]
fn audited_pass_writes_stage_change_annotations() {
    let fixture = Fixture::new();
    let id = fixture.register("Audited", None);
    let config = PipelineConfig {
        audit_stage_changes: true,
        ..PipelineConfig::default()
    };

    fixture
        .batch(config)
        .pass(&BTreeSet::from([id]), Role::Editor)
        .unwrap();

    let conn = fixture.db.connect().unwrap();
    let entries = AnnotationService::new(SqliteAnnotationRepository::try_new(&conn).unwrap())
        .list(id)
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, AnnotationKind::StageChange);
}

#[test]
fn invalid_worker_count_is_rejected() {
    let fixture = Fixture::new();
    let config = PipelineConfig {
        batch_workers: 0,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        BatchService::new(fixture.db.clone(), config),
        Err(BatchError::Config(_))
    ));
}
