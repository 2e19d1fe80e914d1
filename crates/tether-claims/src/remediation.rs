//! Planned fixes for failing and partial claims.

use crate::category::Severity;
use crate::id::{ClaimId, TaskId};
use crate::verdict::VerdictState;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// What kind of change a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RemediationAction {
    Add,
    Modify,
    Remove,
    Configure,
}

/// Rough size of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effort {
    Trivial,
    Small,
    Medium,
    Large,
}

/// A planned fix, derived from one FAIL or PARTIAL verdict. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationTask {
    pub id: TaskId,
    pub claim_id: ClaimId,
    pub title: String,
    pub description: String,
    pub action: RemediationAction,
    pub target_files: Vec<String>,
    pub effort: Effort,
    pub guidance: String,
    /// Verdict tier the task came from (FAIL or PARTIAL).
    pub source_state: VerdictState,
    pub severity: Severity,
}
