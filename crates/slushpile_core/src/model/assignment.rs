//! Manuscript reviewer assignment.

use crate::model::manuscript::ManuscriptId;
use crate::model::role::Role;
use serde::{Deserialize, Serialize};

/// Current reviewer of one manuscript. Re-assignment replaces the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub manuscript_id: ManuscriptId,
    pub assignee_identity: String,
    /// Role of the caller who made the assignment.
    pub assigned_by: Role,
    /// Epoch ms of the latest assignment.
    pub assigned_at: i64,
}
