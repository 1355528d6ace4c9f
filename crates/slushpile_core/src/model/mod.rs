//! Domain model for the acquisition decision pipeline.
//!
//! # Responsibility
//! - Define canonical data structures used by the pipeline services.
//! - Host the pure parts of the pipeline: tier classifier, role order and
//!   the stage edge table.
//!
//! # Invariants
//! - Every manuscript is referenced by a stable `ManuscriptId`.
//! - Workflow records and annotations are never deleted by core.

pub mod annotation;
pub mod assignment;
pub mod manuscript;
pub mod role;
pub mod tier;
pub mod workflow;
