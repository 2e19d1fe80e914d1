//! Tether loop - claim extraction, verification, remediation and regeneration.
//!
//! A pass turns a specification document into atomic [`Claim`]s, locates the
//! code that implements each one, assigns verdicts, scores the result, plans
//! remediation and commits everything as one immutable [`Iteration`]. The
//! committed iteration then drives regeneration of the next document.

pub mod assigner;
pub mod chunk;
pub mod error;
pub mod evidence;
pub mod extractor;
pub mod lineage;
pub mod locator;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod readiness;
pub mod regenerator;
pub mod report;
pub mod scorer;
mod service;
pub mod snapshot;

// Re-export common types
pub use assigner::{
    agreement_rate, AdjudicationRouter, Adjudicator, Assignment, CommandChecker, OracleAdjudicator,
    PatternChecker, VerdictAssigner, VerdictLedger,
};
pub use error::{LoopError, Result};
pub use evidence::{EvidenceContext, EvidenceFile};
pub use extractor::{split_compound, ClaimExtractor, DroppedChunk, Extraction};
pub use lineage::ClaimLineage;
pub use locator::{KeywordLocator, Located, Locator, LocatorResult, OracleLocator};
pub use orchestrator::{
    BuildError, BuildPhase, NoopBuild, Orchestrator, PassInput, PassOutcome, PassSource, Phase,
    PhaseTracker,
};
pub use planner::{estimate_effort, RemediationPlanner};
pub use readiness::{ExitReadiness, Regression, ScoreTrend};
pub use regenerator::{post_process, skeleton, RealityContext, Regeneration, Regenerator};
pub use report::{InconclusiveClaim, IterationReport};
pub use scorer::{compute_score, score_verdicts};
pub use snapshot::{CodebaseSnapshot, FsSnapshot, MemorySnapshot, SnapshotError};

pub use tether_claims::{
    Category, Claim, ClaimId, ComplianceScore, Iteration, RemediationTask, Severity, Verdict,
    VerdictState,
};
