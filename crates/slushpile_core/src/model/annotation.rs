//! Annotation domain model.
//!
//! # Responsibility
//! - Define the append-only commentary record tied to one manuscript.
//! - Validate user input before persistence.
//!
//! # Invariants
//! - `content` is non-blank after trim.
//! - Annotations are never mutated or deleted once stored.
//! - `StageChange` entries are authored by the system only.

use crate::model::manuscript::ManuscriptId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Monotonic annotation id assigned at insert.
pub type AnnotationId = i64;

/// Author identity used for system-generated entries.
pub const SYSTEM_AUTHOR: &str = "system";

/// Category of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Comment,
    Suggestion,
    Question,
    /// Audit entry written when a workflow stage changes.
    StageChange,
}

impl AnnotationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Suggestion => "suggestion",
            Self::Question => "question",
            Self::StageChange => "stage_change",
        }
    }

    pub fn parse(value: &str) -> Option<AnnotationKind> {
        match value {
            "comment" => Some(Self::Comment),
            "suggestion" => Some(Self::Suggestion),
            "question" => Some(Self::Question),
            "stage_change" => Some(Self::StageChange),
            _ => None,
        }
    }
}

/// Stored annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub manuscript_id: ManuscriptId,
    pub author_identity: String,
    pub content: String,
    /// Chapter number the comment refers to.
    pub chapter_ref: Option<u32>,
    /// Text excerpt or character offset inside the chapter.
    pub location_hint: Option<String>,
    pub kind: AnnotationKind,
    /// Epoch ms, stamped at insert.
    pub created_at: i64,
}

/// Input for appending one annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub content: String,
    pub chapter_ref: Option<u32>,
    pub location_hint: Option<String>,
    pub kind: AnnotationKind,
}

impl NewAnnotation {
    /// Plain comment without chapter reference.
    pub fn comment(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chapter_ref: None,
            location_hint: None,
            kind: AnnotationKind::Comment,
        }
    }

    pub fn in_chapter(mut self, chapter: u32) -> Self {
        self.chapter_ref = Some(chapter);
        self
    }

    pub fn at(mut self, location_hint: impl Into<String>) -> Self {
        self.location_hint = Some(location_hint.into());
        self
    }

    pub fn kind(mut self, kind: AnnotationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Validates content and returns the normalized form.
    pub fn validate(&self) -> Result<NewAnnotation, AnnotationValidationError> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(AnnotationValidationError::EmptyContent);
        }
        let location_hint = self
            .location_hint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(NewAnnotation {
            content: content.to_string(),
            chapter_ref: self.chapter_ref,
            location_hint,
            kind: self.kind,
        })
    }
}

/// Input validation failure for annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationValidationError {
    EmptyContent,
}

impl Display for AnnotationValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "annotation content must not be blank"),
        }
    }
}

impl Error for AnnotationValidationError {}
