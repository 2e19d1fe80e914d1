//! Data model for Tether: claims, verdicts, remediation tasks and iterations.

mod category;
mod claim;
mod id;
mod iteration;
mod remediation;
mod score;
mod verdict;

pub use category::{Category, Severity};
pub use claim::Claim;
pub use id::{normalize_claim_text, ClaimId, IdError, TaskId, ASPIRATIONAL_MARKER};
pub use iteration::{Iteration, IterationError};
pub use remediation::{Effort, RemediationAction, RemediationTask};
pub use score::{ComplianceScore, VerdictTally};
pub use verdict::{
    clamp_confidence, AdjudicatorKind, Evidence, LineRange, NaReason, Verdict, VerdictState,
};
