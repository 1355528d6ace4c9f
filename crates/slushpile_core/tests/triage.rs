use rusqlite::Connection;
use slushpile_core::db::open_db_in_memory;
use slushpile_core::repo::manuscript_repo::{ManuscriptDirectory, SqliteManuscriptDirectory};
use slushpile_core::repo::triage_repo::SqliteTriageRepository;
use slushpile_core::repo::workflow_repo::SqliteWorkflowRepository;
use slushpile_core::{
    AdvanceRequest, ManuscriptDraft, ManuscriptId, RepoError, Role, ScoreError, ScoreReport,
    Stage, Tier, TriageQuery, TriageService, TriageSort, WorkflowService,
};
use std::collections::BTreeSet;
use uuid::Uuid;

fn seed(conn: &Connection, title: &str, words: u32, score: Option<f64>) -> ManuscriptId {
    let directory = SqliteManuscriptDirectory::try_new(conn).unwrap();
    let id = directory
        .register(&ManuscriptDraft::new(title, words).genre("literary"))
        .unwrap()
        .id;
    if let Some(score) = score {
        directory
            .record_score(
                id,
                &ScoreReport::overall(score).with_category("prose_craft", score),
            )
            .unwrap();
    }
    id
}

fn service(conn: &Connection) -> TriageService<SqliteTriageRepository<'_>> {
    TriageService::new(SqliteTriageRepository::try_new(conn).unwrap())
}

#[test]
fn tier_counts_cover_every_manuscript() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "Bright", 90_000, Some(92.0));
    seed(&conn, "Edge", 70_000, Some(79.5));
    seed(&conn, "Middling", 60_000, Some(45.0));
    seed(&conn, "Rough", 50_000, Some(12.0));
    seed(&conn, "Pending", 40_000, None);

    let counts = service(&conn).tier_counts().unwrap();
    assert_eq!(counts.strong_consider, 2);
    assert_eq!(counts.consider, 0);
    assert_eq!(counts.maybe, 1);
    assert_eq!(counts.pass, 1);
    assert_eq!(counts.unscored, 1);
    assert_eq!(counts.total_scored(), 4);
}

#[test]
fn out_of_range_scores_are_not_stored() {
    let conn = open_db_in_memory().unwrap();
    let id = seed(&conn, "Overflow", 1_000, None);
    let directory = SqliteManuscriptDirectory::try_new(&conn).unwrap();

    assert!(matches!(
        directory.record_score(id, &ScoreReport::overall(101.0)),
        Err(RepoError::Score(ScoreError::InvalidScore(_)))
    ));
    assert_eq!(directory.get(id).unwrap().unwrap().score, None);
}

#[test]
fn query_filters_by_tier_stage_and_title() {
    let conn = open_db_in_memory().unwrap();
    let strong = seed(&conn, "The Long Harbor", 90_000, Some(88.0));
    seed(&conn, "Harbor Lights", 70_000, Some(65.0));
    seed(&conn, "Dry Country", 60_000, Some(85.0));
    WorkflowService::new(SqliteWorkflowRepository::try_new(&conn).unwrap())
        .advance(strong, Role::Reader, AdvanceRequest::at_version(0))
        .unwrap();
    let triage = service(&conn);

    let strong_only = triage
        .query(&TriageQuery {
            tiers: Some(vec![Tier::StrongConsider]),
            ..TriageQuery::default()
        })
        .unwrap();
    assert_eq!(strong_only.len(), 2);

    let harbor_reviewed = triage
        .query(&TriageQuery {
            stage: Some(Stage::ReaderReviewed),
            title_contains: Some("harbor".to_string()),
            ..TriageQuery::default()
        })
        .unwrap();
    assert_eq!(harbor_reviewed.len(), 1);
    assert_eq!(harbor_reviewed[0].manuscript.id, strong);
    assert_eq!(harbor_reviewed[0].version, 1);
}

#[test]
fn query_sorts_and_pages() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "Beta", 30_000, Some(50.0));
    seed(&conn, "alpha", 80_000, None);
    seed(&conn, "Gamma", 55_000, Some(90.0));
    let triage = service(&conn);

    let titles = |sort: TriageSort| {
        triage
            .query(&TriageQuery {
                sort,
                ..TriageQuery::default()
            })
            .unwrap()
            .into_iter()
            .map(|entry| entry.manuscript.title)
            .collect::<Vec<_>>()
    };

    assert_eq!(titles(TriageSort::ScoreDesc), ["Gamma", "Beta", "alpha"]);
    assert_eq!(titles(TriageSort::ScoreAsc), ["Beta", "Gamma", "alpha"]);
    assert_eq!(titles(TriageSort::TitleAsc), ["alpha", "Beta", "Gamma"]);
    assert_eq!(titles(TriageSort::WordCountDesc), ["alpha", "Gamma", "Beta"]);

    let page = triage
        .query(&TriageQuery {
            limit: Some(1),
            offset: 1,
            ..TriageQuery::default()
        })
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].manuscript.title, "Beta");
    assert_eq!(page[0].tier, Tier::Maybe);
}

#[test]
fn export_rows_report_missing_ids() {
    let conn = open_db_in_memory().unwrap();
    let known = seed(&conn, "Known", 10_000, Some(61.0));
    let missing = Uuid::new_v4();

    let snapshot = service(&conn)
        .export_rows(&BTreeSet::from([known, missing]))
        .unwrap();

    assert_eq!(snapshot.rows.len(), 1);
    assert_eq!(snapshot.rows[0].id, known);
    assert_eq!(snapshot.rows[0].tier, Tier::Consider);
    assert_eq!(snapshot.rows[0].stage, Stage::Unreviewed);
    assert_eq!(snapshot.missing, BTreeSet::from([missing]));
}
