//! Manuscript directory model.
//!
//! Manuscripts are owned by the external directory and analysis collaborators.
//! Core reads `id` and `score` for its invariants; the remaining metadata is
//! carried for triage views and export rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable manuscript identity.
pub type ManuscriptId = Uuid;

/// Manuscript as seen by the triage core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manuscript {
    pub id: ManuscriptId,
    pub title: String,
    pub word_count: u32,
    pub author_name: Option<String>,
    pub genre: Option<String>,
    /// Acquisition score in `[0, 100]`, absent until analysed.
    pub score: Option<f64>,
    /// Category scores reported alongside the overall score.
    pub score_breakdown: BTreeMap<String, f64>,
    /// Epoch ms when the manuscript entered triage.
    pub created_at: i64,
}

/// Input for registering a manuscript into triage.
#[derive(Debug, Clone, PartialEq)]
pub struct ManuscriptDraft {
    pub id: ManuscriptId,
    pub title: String,
    pub word_count: u32,
    pub author_name: Option<String>,
    pub genre: Option<String>,
}

impl ManuscriptDraft {
    /// Draft with a generated id.
    pub fn new(title: impl Into<String>, word_count: u32) -> Self {
        Self::with_id(Uuid::new_v4(), title, word_count)
    }

    /// Draft with an id already assigned by the directory.
    pub fn with_id(id: ManuscriptId, title: impl Into<String>, word_count: u32) -> Self {
        Self {
            id,
            title: title.into(),
            word_count,
            author_name: None,
            genre: None,
        }
    }

    pub fn author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

/// Score report delivered by the analysis collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    pub overall: Option<f64>,
    pub breakdown: BTreeMap<String, f64>,
}

impl ScoreReport {
    pub fn overall(score: f64) -> Self {
        Self {
            overall: Some(score),
            breakdown: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>, score: f64) -> Self {
        self.breakdown.insert(category.into(), score);
        self
    }
}
