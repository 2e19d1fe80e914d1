//! Compliance score: `(pass + 0.5 * partial) / (total - na) * 100`.

use tether_claims::{ComplianceScore, Verdict, VerdictTally};

/// Score a tally. Returns [`ComplianceScore::NoVerifiableClaims`] when every
/// claim is N_A, including the empty tally.
pub fn compute_score(tally: &VerdictTally) -> ComplianceScore {
    let verifiable = tally.verifiable();
    if verifiable == 0 {
        return ComplianceScore::NoVerifiableClaims;
    }
    let earned = tally.pass as f64 + 0.5 * tally.partial as f64;
    ComplianceScore::Percent(earned / verifiable as f64 * 100.0)
}

/// Tally and score a verdict set.
pub fn score_verdicts(verdicts: &[Verdict]) -> (VerdictTally, ComplianceScore) {
    let tally = VerdictTally::from_verdicts(verdicts);
    (tally, compute_score(&tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tally(pass: usize, partial: usize, fail: usize, na: usize) -> VerdictTally {
        VerdictTally {
            pass,
            partial,
            fail,
            na,
            inconclusive: 0,
            total: pass + partial + fail + na,
        }
    }

    #[test]
    fn test_worked_example() {
        let score = compute_score(&tally(6, 2, 1, 1));
        assert_eq!(score.to_string(), "77.78%");
    }

    #[test]
    fn test_sentinel_when_nothing_verifiable() {
        assert_eq!(compute_score(&tally(0, 0, 0, 0)), ComplianceScore::NoVerifiableClaims);
        assert_eq!(compute_score(&tally(0, 0, 0, 7)), ComplianceScore::NoVerifiableClaims);
    }

    proptest! {
        #[test]
        fn score_is_bounded(
            pass in 0usize..200,
            partial in 0usize..200,
            fail in 0usize..200,
            na in 0usize..200
        ) {
            match compute_score(&tally(pass, partial, fail, na)) {
                ComplianceScore::Percent(value) => {
                    prop_assert!(pass + partial + fail > 0);
                    prop_assert!(value.is_finite());
                    prop_assert!((0.0..=100.0).contains(&value));
                }
                ComplianceScore::NoVerifiableClaims => prop_assert_eq!(pass + partial + fail, 0),
            }
        }
    }
}
