//! Annotation log use-case service.
//!
//! # Responsibility
//! - Validate and append reviewer commentary.
//! - List a manuscript's annotations in creation order.
//! - Record stage changes as system-authored audit entries.
//!
//! # Invariants
//! - Append-only; there is no edit or delete API.
//! - Only the system author writes `StageChange` entries.
//! - Annotation content is never logged.

use crate::model::annotation::{
    Annotation, AnnotationKind, AnnotationValidationError, NewAnnotation, SYSTEM_AUTHOR,
};
use crate::model::manuscript::ManuscriptId;
use crate::repo::annotation_repo::AnnotationRepository;
use crate::repo::RepoError;
use crate::service::workflow_service::{StageChangeEvent, StageObserver};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for annotation operations.
#[derive(Debug)]
pub enum AnnotationError {
    /// Content is blank after trimming.
    EmptyContent,
    /// Author identity is blank.
    EmptyAuthor,
    /// `StageChange` entries are reserved for the system author.
    ReservedKind,
    NotFound(ManuscriptId),
    Repo(RepoError),
}

impl Display for AnnotationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "annotation content must not be blank"),
            Self::EmptyAuthor => write!(f, "annotation author must not be blank"),
            Self::ReservedKind => write!(f, "stage change entries are written by the system"),
            Self::NotFound(id) => write!(f, "manuscript not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AnnotationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AnnotationError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<AnnotationValidationError> for AnnotationError {
    fn from(value: AnnotationValidationError) -> Self {
        match value {
            AnnotationValidationError::EmptyContent => Self::EmptyContent,
        }
    }
}

/// Annotation log over a repository implementation.
pub struct AnnotationService<R: AnnotationRepository> {
    repo: R,
}

impl<R: AnnotationRepository> AnnotationService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Appends one user annotation.
    ///
    /// # Errors
    /// - `EmptyContent` when content is blank after trim.
    /// - `EmptyAuthor` when the author identity is blank.
    /// - `ReservedKind` for `StageChange` input.
    /// - `NotFound` when the manuscript is not registered.
    pub fn append(
        &self,
        manuscript_id: ManuscriptId,
        author_identity: &str,
        annotation: &NewAnnotation,
    ) -> Result<Annotation, AnnotationError> {
        let normalized = annotation.validate()?;
        let author = author_identity.trim();
        if author.is_empty() {
            return Err(AnnotationError::EmptyAuthor);
        }
        if normalized.kind == AnnotationKind::StageChange {
            return Err(AnnotationError::ReservedKind);
        }

        let stored = self.repo.append(manuscript_id, author, &normalized)?;
        debug!(
            "event=annotation_append module=service status=ok kind={} chapter_ref={}",
            stored.kind.as_str(),
            stored.chapter_ref.is_some()
        );
        Ok(stored)
    }

    /// Every annotation of one manuscript, oldest first.
    ///
    /// Unknown manuscripts yield an empty list.
    pub fn list(&self, manuscript_id: ManuscriptId) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.repo.list(manuscript_id)?)
    }

    fn record_stage_change(&self, event: &StageChangeEvent) -> Result<Annotation, AnnotationError> {
        let mut content = format!("stage changed from {} to {}", event.from, event.to);
        if let Some(outcome) = event.outcome {
            content.push_str(&format!(" with outcome {outcome}"));
        }
        match event.actor {
            Some(role) => content.push_str(&format!(" by {role}")),
            None => content.push_str(" by fast pass"),
        }

        let entry = NewAnnotation::comment(content).kind(AnnotationKind::StageChange);
        let stored = self.repo.append(event.manuscript_id, SYSTEM_AUTHOR, &entry)?;
        info!(
            "event=stage_audit module=service status=ok to={} version={}",
            event.to, event.version
        );
        Ok(stored)
    }
}

impl<R: AnnotationRepository> StageObserver for AnnotationService<R> {
    fn stage_changed(&self, event: &StageChangeEvent) -> Result<(), Box<dyn Error>> {
        self.record_stage_change(event)?;
        Ok(())
    }
}
