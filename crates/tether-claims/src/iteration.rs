//! The committed record of one loop pass.

use crate::category::Severity;
use crate::claim::Claim;
use crate::id::{ClaimId, TaskId};
use crate::remediation::RemediationTask;
use crate::score::{ComplianceScore, VerdictTally};
use crate::verdict::{Verdict, VerdictState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tether_common_core::RunId;
use thiserror::Error;

/// Reasons an iteration record is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IterationError {
    #[error("iteration index must start at 1")]
    ZeroIndex,

    #[error("duplicate claim id {0}")]
    DuplicateClaim(ClaimId),

    #[error("claim {0} has no verdict")]
    MissingVerdict(ClaimId),

    #[error("claim {0} has more than one verdict")]
    DuplicateVerdict(ClaimId),

    #[error("verdict for unknown claim {0}")]
    UnknownClaim(ClaimId),

    #[error("tally {tally:?} does not match the verdict set")]
    TallyMismatch { tally: VerdictTally },

    #[error("compliance score {0} outside [0, 100]")]
    ScoreOutOfRange(f64),

    #[error("score {score} disagrees with {verifiable} verifiable claims")]
    ScoreSentinelMismatch { score: ComplianceScore, verifiable: usize },

    #[error("task {task} references claim {claim} which is not FAIL or PARTIAL")]
    TaskForPassingClaim { task: TaskId, claim: ClaimId },

    #[error("task {task} references unknown claim {claim}")]
    TaskForUnknownClaim { task: TaskId, claim: ClaimId },

    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),
}

/// One immutable iteration bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub index: u32,
    pub run_id: RunId,
    pub claims: Vec<Claim>,
    pub verdicts: Vec<Verdict>,
    pub compliance_score: ComplianceScore,
    pub tally: VerdictTally,
    pub remediation_tasks: Vec<RemediationTask>,
    /// The document this iteration's claims were extracted from.
    pub spec_document_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_context: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Iteration {
    /// Check every cross-field invariant of the record.
    pub fn validate(&self) -> Result<(), IterationError> {
        if self.index == 0 {
            return Err(IterationError::ZeroIndex);
        }

        let mut claim_ids = HashSet::with_capacity(self.claims.len());
        for claim in &self.claims {
            if !claim_ids.insert(&claim.id) {
                return Err(IterationError::DuplicateClaim(claim.id.clone()));
            }
        }

        let mut states: HashMap<&ClaimId, VerdictState> =
            HashMap::with_capacity(self.verdicts.len());
        for verdict in &self.verdicts {
            if !claim_ids.contains(&verdict.claim_id) {
                return Err(IterationError::UnknownClaim(verdict.claim_id.clone()));
            }
            if states.insert(&verdict.claim_id, verdict.state).is_some() {
                return Err(IterationError::DuplicateVerdict(verdict.claim_id.clone()));
            }
        }
        if let Some(missing) = self.claims.iter().find(|c| !states.contains_key(&c.id)) {
            return Err(IterationError::MissingVerdict(missing.id.clone()));
        }

        let recomputed = VerdictTally::from_verdicts(&self.verdicts);
        if recomputed != self.tally || !self.tally.is_consistent() {
            return Err(IterationError::TallyMismatch { tally: self.tally });
        }

        match self.compliance_score {
            ComplianceScore::Percent(value) if !(0.0..=100.0).contains(&value) => {
                return Err(IterationError::ScoreOutOfRange(value));
            }
            score if score.is_defined() != (self.tally.verifiable() > 0) => {
                return Err(IterationError::ScoreSentinelMismatch {
                    score,
                    verifiable: self.tally.verifiable(),
                });
            }
            _ => {}
        }

        let mut task_ids = HashSet::with_capacity(self.remediation_tasks.len());
        for task in &self.remediation_tasks {
            if !task_ids.insert(&task.id) {
                return Err(IterationError::DuplicateTask(task.id.clone()));
            }
            match states.get(&task.claim_id) {
                None => {
                    return Err(IterationError::TaskForUnknownClaim {
                        task: task.id.clone(),
                        claim: task.claim_id.clone(),
                    })
                }
                Some(VerdictState::Fail | VerdictState::Partial) => {}
                Some(_) => {
                    return Err(IterationError::TaskForPassingClaim {
                        task: task.id.clone(),
                        claim: task.claim_id.clone(),
                    })
                }
            }
        }

        Ok(())
    }

    pub fn claim(&self, id: &ClaimId) -> Option<&Claim> {
        self.claims.iter().find(|c| &c.id == id)
    }

    pub fn verdict_for(&self, id: &ClaimId) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| &v.claim_id == id)
    }

    /// Claims paired with their verdicts, in claim order.
    pub fn adjudicated(&self) -> impl Iterator<Item = (&Claim, &Verdict)> {
        let by_id: HashMap<&ClaimId, &Verdict> =
            self.verdicts.iter().map(|v| (&v.claim_id, v)).collect();
        self.claims
            .iter()
            .filter_map(move |claim| by_id.get(&claim.id).map(|verdict| (claim, *verdict)))
    }

    /// Critical-severity claims whose verdict is FAIL.
    pub fn critical_failures(&self) -> Vec<&Claim> {
        self.adjudicated()
            .filter(|(claim, verdict)| {
                claim.severity == Severity::Critical && verdict.state == VerdictState::Fail
            })
            .map(|(claim, _)| claim)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::remediation::{Effort, RemediationAction};
    use crate::verdict::AdjudicatorKind;

    fn sample() -> Iteration {
        let pass = Claim::new("A", Category::Functionality, Severity::High, "Login works", true);
        let fail =
            Claim::new("A", Category::Security, Severity::Critical, "Passwords are hashed", true);
        let oracle = AdjudicatorKind::ApproximateOracle;
        let verdicts = vec![
            Verdict::decided(pass.id.clone(), VerdictState::Pass, 0.9, "ok", oracle),
            Verdict::decided(fail.id.clone(), VerdictState::Fail, 0.8, "plaintext", oracle),
        ];
        let task = RemediationTask {
            id: TaskId::for_claim(&fail.id),
            claim_id: fail.id.clone(),
            title: "Hash passwords".into(),
            description: String::new(),
            action: RemediationAction::Add,
            target_files: vec![],
            effort: Effort::Large,
            guidance: String::new(),
            source_state: VerdictState::Fail,
            severity: Severity::Critical,
        };

        Iteration {
            index: 1,
            run_id: RunId::new(),
            tally: VerdictTally::from_verdicts(&verdicts),
            claims: vec![pass, fail],
            verdicts,
            compliance_score: ComplianceScore::Percent(50.0),
            remediation_tasks: vec![task],
            spec_document_text: "# Spec".into(),
            human_context: None,
            warnings: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_valid_iteration() {
        let iteration = sample();
        assert_eq!(iteration.validate(), Ok(()));
        assert_eq!(iteration.critical_failures().len(), 1);
    }

    #[test]
    fn test_zero_index_rejected() {
        let mut iteration = sample();
        iteration.index = 0;
        assert_eq!(iteration.validate(), Err(IterationError::ZeroIndex));
    }

    #[test]
    fn test_missing_verdict_rejected() {
        let mut iteration = sample();
        let dropped = iteration.verdicts.remove(0);
        iteration.tally = VerdictTally::from_verdicts(&iteration.verdicts);
        assert_eq!(iteration.validate(), Err(IterationError::MissingVerdict(dropped.claim_id)));
    }

    #[test]
    fn test_duplicate_verdict_rejected() {
        let mut iteration = sample();
        let copy = iteration.verdicts[0].clone();
        iteration.verdicts.push(copy.clone());
        assert_eq!(iteration.validate(), Err(IterationError::DuplicateVerdict(copy.claim_id)));
    }

    #[test]
    fn test_tally_mismatch_rejected() {
        let mut iteration = sample();
        iteration.tally.pass += 1;
        assert!(matches!(iteration.validate(), Err(IterationError::TallyMismatch { .. })));
    }

    #[test]
    fn test_score_bounds() {
        let mut iteration = sample();
        iteration.compliance_score = ComplianceScore::Percent(120.0);
        assert_eq!(iteration.validate(), Err(IterationError::ScoreOutOfRange(120.0)));

        iteration.compliance_score = ComplianceScore::NoVerifiableClaims;
        assert!(matches!(iteration.validate(), Err(IterationError::ScoreSentinelMismatch { .. })));
    }

    #[test]
    fn test_task_must_reference_failing_claim() {
        let mut iteration = sample();
        let passing = iteration.claims[0].id.clone();
        iteration.remediation_tasks[0].claim_id = passing.clone();
        assert!(matches!(
            iteration.validate(),
            Err(IterationError::TaskForPassingClaim { claim, .. }) if claim == passing
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_record() {
        let iteration = sample();
        let json = serde_json::to_string(&iteration).unwrap();
        let back: Iteration = serde_json::from_str(&json).unwrap();
        pretty_assertions::assert_eq!(back, iteration);
    }
}
