//! Exit-readiness signals for the human deciding when to stop iterating.
//!
//! Nothing here decides anything: the loop never stops itself, and the
//! score is never used as a gate.

use crate::lineage::ClaimLineage;
use serde::Serialize;
use tether_claims::{ClaimId, ComplianceScore, Iteration, VerdictState};

/// Direction of the score between the last two iterations with a defined score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTrend {
    Improving,
    Declining,
    Flat,
    /// Fewer than two defined scores.
    Unknown,
}

/// A claim that passed in the previous iteration but not in the latest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Regression {
    pub previous: ClaimId,
    pub current: ClaimId,
    pub state: VerdictState,
}

/// Summary of a committed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReadiness {
    pub iterations: usize,
    pub latest_index: Option<u32>,
    /// `(index, score)` for every iteration, oldest first.
    pub scores: Vec<(u32, ComplianceScore)>,
    pub trend: ScoreTrend,
    /// Latest defined score minus the one before it, in percentage points.
    pub delta: Option<f64>,
    /// Critical-severity claims failing in the latest iteration.
    pub outstanding_critical_failures: Vec<ClaimId>,
    pub inconclusive: usize,
    pub regressions: Vec<Regression>,
    /// Claims that failed previously and pass in the latest iteration.
    pub resolved: Vec<ClaimId>,
}

impl ExitReadiness {
    pub fn from_history(history: &[Iteration]) -> Self {
        let scores: Vec<(u32, ComplianceScore)> =
            history.iter().map(|it| (it.index, it.compliance_score)).collect();
        let defined: Vec<f64> = scores.iter().filter_map(|(_, score)| score.as_percent()).collect();

        let delta = match defined.as_slice() {
            [.., before, last] => Some(last - before),
            _ => None,
        };
        let trend = match delta {
            None => ScoreTrend::Unknown,
            Some(d) if d > f64::EPSILON => ScoreTrend::Improving,
            Some(d) if d < -f64::EPSILON => ScoreTrend::Declining,
            Some(_) => ScoreTrend::Flat,
        };

        let latest = history.last();
        let outstanding_critical_failures = latest
            .map(|it| it.critical_failures().into_iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default();
        let inconclusive = latest.map_or(0, |it| it.tally.inconclusive);

        let (regressions, resolved) = match history {
            [.., previous, current] => compare(previous, current),
            _ => (Vec::new(), Vec::new()),
        };

        Self {
            iterations: history.len(),
            latest_index: latest.map(|it| it.index),
            scores,
            trend,
            delta,
            outstanding_critical_failures,
            inconclusive,
            regressions,
            resolved,
        }
    }
}

fn compare(previous: &Iteration, current: &Iteration) -> (Vec<Regression>, Vec<ClaimId>) {
    let lineage = ClaimLineage::from_recorded(&previous.claims, &current.claims);
    let mut regressions = Vec::new();
    let mut resolved = Vec::new();

    for verdict in &previous.verdicts {
        let Some(successor) = lineage.successor_of(&verdict.claim_id) else { continue };
        let Some(now) = current.verdict_for(successor) else { continue };

        match (verdict.state, now.state) {
            (VerdictState::Pass, VerdictState::Pass) => {}
            (VerdictState::Pass, state) => regressions.push(Regression {
                previous: verdict.claim_id.clone(),
                current: successor.clone(),
                state,
            }),
            (VerdictState::Fail | VerdictState::Partial, VerdictState::Pass) => {
                resolved.push(successor.clone())
            }
            _ => {}
        }
    }

    (regressions, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Located;
    use crate::planner::RemediationPlanner;
    use crate::scorer::score_verdicts;
    use chrono::Utc;
    use tether_claims::{AdjudicatorKind, Category, Claim, Severity, Verdict};
    use tether_common_core::RunId;

    fn iteration(index: u32, entries: &[(&Claim, VerdictState)]) -> Iteration {
        let claims: Vec<Claim> = entries.iter().map(|(c, _)| (*c).clone()).collect();
        let verdicts: Vec<Verdict> = entries
            .iter()
            .map(|(c, s)| {
                Verdict::decided(c.id.clone(), *s, 0.9, "", AdjudicatorKind::ApproximateOracle)
            })
            .collect();
        let (tally, compliance_score) = score_verdicts(&verdicts);
        let remediation_tasks = RemediationPlanner::new().plan(&claims, &verdicts, &Located::new());
        Iteration {
            index,
            run_id: RunId::new(),
            claims,
            verdicts,
            compliance_score,
            tally,
            remediation_tasks,
            spec_document_text: String::new(),
            human_context: None,
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn auth(text: &str) -> Claim {
        Claim::new("Auth", Category::Security, Severity::Critical, text, true)
    }

    fn data(text: &str) -> Claim {
        Claim::new("Data", Category::Functionality, Severity::Low, text, true)
    }

    #[test]
    fn test_empty_history() {
        let readiness = ExitReadiness::from_history(&[]);
        assert_eq!(readiness.trend, ScoreTrend::Unknown);
        assert_eq!(readiness.latest_index, None);
        assert!(readiness.regressions.is_empty());
    }

    #[test]
    fn test_trend_regressions_and_resolutions() {
        let login = auth("Users log in with email.");
        let hashing = auth("Passwords are hashed with argon2.");
        let export = data("Widgets export to CSV.");
        let export_v2 = data("Widgets export to CSV files.").with_supersedes(export.id.clone());

        let first = iteration(
            1,
            &[
                (&login, VerdictState::Pass),
                (&hashing, VerdictState::Fail),
                (&export, VerdictState::Pass),
            ],
        );
        let second = iteration(
            2,
            &[
                (&login, VerdictState::Pass),
                (&hashing, VerdictState::Pass),
                (&export_v2, VerdictState::Partial),
            ],
        );

        let readiness = ExitReadiness::from_history(&[first, second]);

        assert_eq!(readiness.iterations, 2);
        assert_eq!(readiness.latest_index, Some(2));
        assert_eq!(readiness.trend, ScoreTrend::Improving);
        assert!((readiness.delta.unwrap() - (83.333_333 - 66.666_666)).abs() < 1e-3);
        assert!(readiness.outstanding_critical_failures.is_empty());
        assert_eq!(readiness.resolved, vec![hashing.id.clone()]);
        assert_eq!(
            readiness.regressions,
            vec![Regression {
                previous: export.id.clone(),
                current: export_v2.id.clone(),
                state: VerdictState::Partial,
            }]
        );
    }

    #[test]
    fn test_outstanding_critical_failures() {
        let hashing = auth("Passwords are hashed.");
        let readiness =
            ExitReadiness::from_history(&[iteration(1, &[(&hashing, VerdictState::Fail)])]);
        assert_eq!(readiness.outstanding_critical_failures, vec![hashing.id]);
        assert_eq!(readiness.trend, ScoreTrend::Unknown);
    }
}
