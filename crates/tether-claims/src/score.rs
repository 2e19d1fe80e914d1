//! Verdict tallies and the compliance score value.

use crate::verdict::{Verdict, VerdictState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate progress signal for one iteration.
///
/// `NoVerifiableClaims` is returned when every claim is N_A (or there are no
/// claims), so the score denominator would be zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ComplianceScore {
    Percent(f64),
    NoVerifiableClaims,
}

impl ComplianceScore {
    pub fn as_percent(&self) -> Option<f64> {
        match self {
            Self::Percent(value) => Some(*value),
            Self::NoVerifiableClaims => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Percent(_))
    }
}

impl fmt::Display for ComplianceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(value) => write!(f, "{:.2}%", value),
            Self::NoVerifiableClaims => f.write_str("n/a (no verifiable claims)"),
        }
    }
}

/// Verdict counts by state. `inconclusive` is the subset of `na` that degraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictTally {
    pub pass: usize,
    pub partial: usize,
    pub fail: usize,
    pub na: usize,
    pub inconclusive: usize,
    pub total: usize,
}

impl VerdictTally {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> Self {
        let mut tally = Self::default();
        for verdict in verdicts {
            tally.record(verdict);
        }
        tally
    }

    pub fn record(&mut self, verdict: &Verdict) {
        match verdict.state {
            VerdictState::Pass => self.pass += 1,
            VerdictState::Partial => self.partial += 1,
            VerdictState::Fail => self.fail += 1,
            VerdictState::NotApplicable => self.na += 1,
        }
        if verdict.is_inconclusive() {
            self.inconclusive += 1;
        }
        self.total += 1;
    }

    /// Claims that count toward the score.
    pub fn verifiable(&self) -> usize {
        self.total - self.na
    }

    /// Partition invariant: every verdict lands in exactly one state.
    pub fn is_consistent(&self) -> bool {
        self.pass + self.partial + self.fail + self.na == self.total && self.inconclusive <= self.na
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ClaimId;
    use crate::verdict::AdjudicatorKind;

    #[test]
    fn test_score_serialization() {
        let percent = serde_json::to_value(ComplianceScore::Percent(77.78)).unwrap();
        assert_eq!(percent, serde_json::json!({"kind": "percent", "value": 77.78}));

        let sentinel = serde_json::to_value(ComplianceScore::NoVerifiableClaims).unwrap();
        assert_eq!(sentinel, serde_json::json!({"kind": "no_verifiable_claims"}));

        let back: ComplianceScore = serde_json::from_value(sentinel).unwrap();
        assert_eq!(back, ComplianceScore::NoVerifiableClaims);
    }

    #[test]
    fn test_score_display() {
        assert_eq!(ComplianceScore::Percent(77.7777).to_string(), "77.78%");
        assert_eq!(ComplianceScore::NoVerifiableClaims.to_string(), "n/a (no verifiable claims)");
    }

    #[test]
    fn test_tally_counts_inconclusive_within_na() {
        let oracle = AdjudicatorKind::ApproximateOracle;
        let verdicts = vec![
            Verdict::decided(ClaimId::from_text("a"), VerdictState::Pass, 0.9, "", oracle),
            Verdict::inconclusive(ClaimId::from_text("b"), "timeout"),
            Verdict::decided(ClaimId::from_text("c"), VerdictState::NotApplicable, 0.9, "", oracle),
        ];
        let tally = VerdictTally::from_verdicts(&verdicts);
        assert_eq!(tally.na, 2);
        assert_eq!(tally.inconclusive, 1);
        assert_eq!(tally.verifiable(), 1);
        assert!(tally.is_consistent());
    }
}
