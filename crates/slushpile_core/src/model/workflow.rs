//! Review workflow record and stage table.
//!
//! # Responsibility
//! - Define the fixed linear review stages and terminal outcomes.
//! - Hold the static edge table: minimum role and note field per edge.
//!
//! # Invariants
//! - Stages only move forward, one step at a time, except through the
//!   explicit fast-pass bypass.
//! - `outcome` is `None` until `stage == DirectorDecision`.
//! - Each notes field is written at most once.
//! - `version` increases by exactly one per successful mutation.

use crate::model::manuscript::ManuscriptId;
use crate::model::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Position in the fixed review sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Unreviewed,
    ReaderReviewed,
    EditorRecommended,
    /// Terminal stage; carries the outcome.
    DirectorDecision,
}

impl Stage {
    /// Stages in pipeline order.
    pub const ORDER: [Stage; 4] = [
        Stage::Unreviewed,
        Stage::ReaderReviewed,
        Stage::EditorRecommended,
        Stage::DirectorDecision,
    ];

    /// Immediate successor, `None` for the terminal stage.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Unreviewed => Some(Self::ReaderReviewed),
            Self::ReaderReviewed => Some(Self::EditorRecommended),
            Self::EditorRecommended => Some(Self::DirectorDecision),
            Self::DirectorDecision => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::DirectorDecision
    }

    /// Edge rule for advancing *into* this stage.
    ///
    /// `Unreviewed` is the initial stage and has no incoming edge.
    pub fn entry_edge(self) -> Option<&'static StageEdge> {
        STAGE_EDGES.iter().find(|edge| edge.to == self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreviewed => "unreviewed",
            Self::ReaderReviewed => "reader_reviewed",
            Self::EditorRecommended => "editor_recommended",
            Self::DirectorDecision => "director_decision",
        }
    }

    pub fn parse(value: &str) -> Option<Stage> {
        match value {
            "unreviewed" => Some(Self::Unreviewed),
            "reader_reviewed" => Some(Self::ReaderReviewed),
            "editor_recommended" => Some(Self::EditorRecommended),
            "director_decision" => Some(Self::DirectorDecision),
            _ => None,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal decision recorded at `DirectorDecision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Acquire,
    Consider,
    ReviseResubmit,
    Pass,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Consider => "consider",
            Self::ReviseResubmit => "revise_resubmit",
            Self::Pass => "pass",
        }
    }

    pub fn parse(value: &str) -> Option<Outcome> {
        match value {
            "acquire" => Some(Self::Acquire),
            "consider" => Some(Self::Consider),
            "revise_resubmit" => Some(Self::ReviseResubmit),
            "pass" => Some(Self::Pass),
            _ => None,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notes slot written by one workflow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotesField {
    Reader,
    Editor,
    Director,
}

/// Static rule for one forward edge of the review pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEdge {
    pub from: Stage,
    pub to: Stage,
    /// Minimum caller role required to take this edge.
    pub min_role: Role,
    /// Notes slot filled when this edge completes.
    pub notes_field: NotesField,
}

/// Edge table, one row per forward step.
pub static STAGE_EDGES: [StageEdge; 3] = [
    StageEdge {
        from: Stage::Unreviewed,
        to: Stage::ReaderReviewed,
        min_role: Role::Reader,
        notes_field: NotesField::Reader,
    },
    StageEdge {
        from: Stage::ReaderReviewed,
        to: Stage::EditorRecommended,
        min_role: Role::Editor,
        notes_field: NotesField::Editor,
    },
    StageEdge {
        from: Stage::EditorRecommended,
        to: Stage::DirectorDecision,
        min_role: Role::Director,
        notes_field: NotesField::Director,
    },
];

/// Per-manuscript review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub manuscript_id: ManuscriptId,
    pub stage: Stage,
    pub outcome: Option<Outcome>,
    pub reader_notes: Option<String>,
    pub editor_notes: Option<String>,
    pub director_notes: Option<String>,
    /// Optimistic concurrency counter.
    pub version: i64,
    /// Epoch ms of the last mutation.
    pub updated_at: i64,
}

impl WorkflowRecord {
    /// Fresh record at `Unreviewed`, version 0.
    pub fn new(manuscript_id: ManuscriptId) -> Self {
        Self {
            manuscript_id,
            stage: Stage::Unreviewed,
            outcome: None,
            reader_notes: None,
            editor_notes: None,
            director_notes: None,
            version: 0,
            updated_at: 0,
        }
    }

    pub fn notes(&self, field: NotesField) -> Option<&str> {
        match field {
            NotesField::Reader => self.reader_notes.as_deref(),
            NotesField::Editor => self.editor_notes.as_deref(),
            NotesField::Director => self.director_notes.as_deref(),
        }
    }

    /// Writes one notes slot if it is still empty.
    ///
    /// Returns `false` and leaves the record untouched when the slot is
    /// already written.
    pub fn write_notes_once(&mut self, field: NotesField, notes: Option<String>) -> bool {
        let slot = match field {
            NotesField::Reader => &mut self.reader_notes,
            NotesField::Editor => &mut self.editor_notes,
            NotesField::Director => &mut self.director_notes,
        };
        if slot.is_some() {
            return false;
        }
        *slot = notes;
        true
    }

    /// Checks the stage/outcome invariant on a loaded record.
    pub fn is_consistent(&self) -> bool {
        self.version >= 0 && (self.stage.is_terminal() == self.outcome.is_some())
    }
}
