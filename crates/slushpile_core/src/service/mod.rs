//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into pipeline operations.
//! - Own the semantic error taxonomy returned to callers.
//! - Keep transports and presentation decoupled from storage details.

pub mod annotation_service;
pub mod batch_service;
pub mod triage_service;
pub mod workflow_service;
