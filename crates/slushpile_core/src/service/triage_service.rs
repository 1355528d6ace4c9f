//! Triage index use-case service.
//!
//! # Responsibility
//! - Count manuscripts per score tier.
//! - Filter, sort and page the triage list.
//! - Shape export rows for batch export.
//!
//! # Invariants
//! - Read-only; never creates or bumps workflow records.
//! - Sorting is deterministic: ties are broken by manuscript id.
//! - Export rows are produced in id order.

use crate::model::manuscript::{Manuscript, ManuscriptId};
use crate::model::tier::{classify, Tier, TierCounts};
use crate::model::workflow::{Outcome, Stage};
use crate::repo::triage_repo::{TriageRow, TriageSource};
use crate::repo::RepoError;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const TRIAGE_LIMIT_DEFAULT: u32 = 50;
const TRIAGE_LIMIT_MAX: u32 = 500;

/// Stable export column order.
pub const EXPORT_HEADER: [&str; 6] = ["id", "title", "score", "tier", "stage", "outcome"];

/// Service error for triage reads.
#[derive(Debug)]
pub enum TriageError {
    Repo(RepoError),
}

impl Display for TriageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TriageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for TriageError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Sort order for the triage list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriageSort {
    /// Highest score first, unscored last.
    #[default]
    ScoreDesc,
    /// Lowest score first, unscored last.
    ScoreAsc,
    TitleAsc,
    WordCountDesc,
    /// Most recently registered first.
    Newest,
}

/// Filter and paging input for triage listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageQuery {
    /// Keep only these tiers; `None` keeps all.
    pub tiers: Option<Vec<Tier>>,
    pub stage: Option<Stage>,
    /// Case-insensitive title substring.
    pub title_contains: Option<String>,
    pub sort: TriageSort,
    /// Defaults to 50, clamped to 500.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One row of the triage list.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageEntry {
    pub manuscript: Manuscript,
    pub tier: Tier,
    pub stage: Stage,
    pub outcome: Option<Outcome>,
    pub version: i64,
}

/// One export line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: ManuscriptId,
    pub title: String,
    pub score: Option<f64>,
    pub tier: Tier,
    pub stage: Stage,
    pub outcome: Option<Outcome>,
}

/// Rows resolved for an export request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSnapshot {
    /// Resolved rows in id order.
    pub rows: Vec<ExportRow>,
    /// Requested ids with no manuscript.
    pub missing: BTreeSet<ManuscriptId>,
}

impl ExportSnapshot {
    /// Renders the snapshot as RFC 4180 CSV with a header line.
    pub fn to_csv(&self) -> Vec<u8> {
        let mut out = String::new();
        push_csv_line(&mut out, EXPORT_HEADER.iter().map(|value| value.to_string()));
        for row in &self.rows {
            push_csv_line(
                &mut out,
                [
                    row.id.to_string(),
                    row.title.clone(),
                    row.score
                        .map(|score| format!("{}", score.round() as i64))
                        .unwrap_or_default(),
                    row.tier.label().to_string(),
                    row.stage.as_str().to_string(),
                    row.outcome
                        .map(|outcome| outcome.as_str().to_string())
                        .unwrap_or_default(),
                ],
            );
        }
        out.into_bytes()
    }
}

fn push_csv_line(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\r', '\n']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push_str("\r\n");
}

/// Triage index over a read source.
pub struct TriageService<S: TriageSource> {
    source: S,
}

impl<S: TriageSource> TriageService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Counts every manuscript in the directory per tier.
    pub fn tier_counts(&self) -> Result<TierCounts, TriageError> {
        let rows = self.source.triage_rows()?;
        let counts = TierCounts::from_scores(rows.iter().map(|row| row.manuscript.score))
            .map_err(RepoError::from)?;
        Ok(counts)
    }

    /// Lists manuscripts matching `query`.
    pub fn query(&self, query: &TriageQuery) -> Result<Vec<TriageEntry>, TriageError> {
        let needle = query
            .title_contains
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase);

        let mut entries = Vec::new();
        for row in self.source.triage_rows()? {
            let entry = to_entry(row)?;
            if let Some(tiers) = &query.tiers {
                if !tiers.contains(&entry.tier) {
                    continue;
                }
            }
            if query.stage.is_some_and(|stage| stage != entry.stage) {
                continue;
            }
            if let Some(needle) = &needle {
                if !entry.manuscript.title.to_lowercase().contains(needle) {
                    continue;
                }
            }
            entries.push(entry);
        }

        entries.sort_by(|left, right| compare_entries(query.sort, left, right));
        let limit = normalize_triage_limit(query.limit) as usize;
        Ok(entries
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .collect())
    }

    /// Resolves export rows for `ids` from one consistent read.
    pub fn export_rows(&self, ids: &BTreeSet<ManuscriptId>) -> Result<ExportSnapshot, TriageError> {
        let rows = self.source.triage_rows_for(ids)?;
        let mut snapshot = ExportSnapshot {
            rows: Vec::with_capacity(rows.len()),
            missing: ids.clone(),
        };
        for row in rows {
            snapshot.missing.remove(&row.manuscript.id);
            let tier = classify(row.manuscript.score).map_err(RepoError::from)?;
            snapshot.rows.push(ExportRow {
                id: row.manuscript.id,
                title: row.manuscript.title,
                score: row.manuscript.score,
                tier,
                stage: row.workflow.stage,
                outcome: row.workflow.outcome,
            });
        }
        snapshot.rows.sort_by_key(|row| row.id);
        Ok(snapshot)
    }
}

/// Returns the effective list limit.
pub fn normalize_triage_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(TRIAGE_LIMIT_DEFAULT)
        .clamp(1, TRIAGE_LIMIT_MAX)
}

fn to_entry(row: TriageRow) -> Result<TriageEntry, TriageError> {
    let tier = classify(row.manuscript.score).map_err(RepoError::from)?;
    Ok(TriageEntry {
        tier,
        stage: row.workflow.stage,
        outcome: row.workflow.outcome,
        version: row.workflow.version,
        manuscript: row.manuscript,
    })
}

fn compare_entries(sort: TriageSort, left: &TriageEntry, right: &TriageEntry) -> Ordering {
    let (a, b) = (&left.manuscript, &right.manuscript);
    let primary = match sort {
        TriageSort::ScoreDesc => compare_scores(a.score, b.score, true),
        TriageSort::ScoreAsc => compare_scores(a.score, b.score, false),
        TriageSort::TitleAsc => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        TriageSort::WordCountDesc => b.word_count.cmp(&a.word_count),
        TriageSort::Newest => b.created_at.cmp(&a.created_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

// Unscored entries sort last in both directions.
fn compare_scores(left: Option<f64>, right: Option<f64>, descending: bool) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) if descending => r.total_cmp(&l),
        (Some(l), Some(r)) => l.total_cmp(&r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_scores, normalize_triage_limit, ExportRow, ExportSnapshot};
    use crate::model::tier::Tier;
    use crate::model::workflow::{Outcome, Stage};
    use std::cmp::Ordering;
    use uuid::Uuid;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_triage_limit(None), 50);
        assert_eq!(normalize_triage_limit(Some(0)), 1);
        assert_eq!(normalize_triage_limit(Some(10_000)), 500);
    }

    #[test]
    fn unscored_sorts_last_both_ways() {
        assert_eq!(compare_scores(None, Some(10.0), true), Ordering::Greater);
        assert_eq!(compare_scores(None, Some(10.0), false), Ordering::Greater);
        assert_eq!(compare_scores(Some(90.0), Some(10.0), true), Ordering::Less);
        assert_eq!(compare_scores(Some(90.0), Some(10.0), false), Ordering::Greater);
    }

    #[test]
    fn csv_quotes_commas_and_quotes() {
        let id = Uuid::nil();
        let snapshot = ExportSnapshot {
            rows: vec![ExportRow {
                id,
                title: "Salt, \"Smoke\" and Rain".to_string(),
                score: Some(79.6),
                tier: Tier::StrongConsider,
                stage: Stage::DirectorDecision,
                outcome: Some(Outcome::Pass),
            }],
            missing: Default::default(),
        };

        let csv = String::from_utf8(snapshot.to_csv()).unwrap();
        let lines = csv.split("\r\n").collect::<Vec<_>>();
        assert_eq!(lines[0], "id,title,score,tier,stage,outcome");
        assert_eq!(
            lines[1],
            format!("{id},\"Salt, \"\"Smoke\"\" and Rain\",80,Strong Consider,director_decision,pass")
        );
        assert_eq!(lines[2], "");
    }

    #[test]
    fn csv_leaves_absent_values_empty() {
        let id = Uuid::nil();
        let snapshot = ExportSnapshot {
            rows: vec![ExportRow {
                id,
                title: "Untitled".to_string(),
                score: None,
                tier: Tier::Unscored,
                stage: Stage::Unreviewed,
                outcome: None,
            }],
            missing: Default::default(),
        };
        let csv = String::from_utf8(snapshot.to_csv()).unwrap();
        assert!(csv.ends_with(&format!("{id},Untitled,,,unreviewed,\r\n")));
    }
}
