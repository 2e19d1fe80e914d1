//! Adjudication outcomes.

use crate::id::ClaimId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of adjudicating one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerdictState {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "N_A")]
    NotApplicable,
}

impl VerdictState {
    /// Tolerant parse of a state label (`pass`, `N/A`, `not_applicable`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "pass" | "passed" | "satisfied" => Some(Self::Pass),
            "partial" | "partially" | "partiallysatisfied" => Some(Self::Partial),
            "fail" | "failed" | "unsatisfied" => Some(Self::Fail),
            "na" | "notapplicable" | "inapplicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Partial => "PARTIAL",
            Self::Fail => "FAIL",
            Self::NotApplicable => "N_A",
        }
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive, 1-based line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    /// Build a range, ordering the bounds and clamping to line 1.
    pub fn new(start: u32, end: u32) -> Self {
        let (start, end) = (start.max(1), end.max(1));
        Self { start: start.min(end), end: start.max(end) }
    }

    pub fn single(line: u32) -> Self {
        Self::new(line, line)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "L{}", self.start)
        } else {
            write!(f, "L{}-L{}", self.start, self.end)
        }
    }
}

/// Where in the codebase a verdict is grounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    #[serde(default)]
    pub snippet: String,
}

impl Evidence {
    pub fn new(
        file: impl Into<String>,
        line_range: Option<LineRange>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line_range,
            snippet: snippet.into(),
        }
    }

    /// `path:L3-L9` style location.
    pub fn location(&self) -> String {
        match self.line_range {
            Some(range) => format!("{}:{}", self.file, range),
            None => self.file.clone(),
        }
    }
}

/// Why a claim received N_A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaReason {
    /// The claim has no code correlate.
    NotStaticallyVerifiable,
    /// No candidate files were located.
    NoEvidence,
    /// Adjudication degraded: retries exhausted, timeout or missing output.
    Inconclusive,
}

/// Which adjudicator variant produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicatorKind {
    ApproximateOracle,
    DeterministicChecker,
}

/// The verdict for one claim in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub claim_id: ClaimId,
    pub state: VerdictState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    pub confidence: f64,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na_reason: Option<NaReason>,
    pub adjudicator: AdjudicatorKind,
}

impl Verdict {
    /// A decided verdict. Confidence is clamped to `[0, 1]`; an N_A state gets
    /// [`NaReason::NotStaticallyVerifiable`].
    pub fn decided(
        claim_id: ClaimId,
        state: VerdictState,
        confidence: f64,
        rationale: impl Into<String>,
        adjudicator: AdjudicatorKind,
    ) -> Self {
        let na_reason =
            (state == VerdictState::NotApplicable).then_some(NaReason::NotStaticallyVerifiable);
        Self {
            claim_id,
            state,
            evidence: None,
            confidence: clamp_confidence(confidence),
            rationale: rationale.into(),
            na_reason,
            adjudicator,
        }
    }

    /// An N_A verdict with an explicit reason.
    pub fn not_applicable(
        claim_id: ClaimId,
        reason: NaReason,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            claim_id,
            state: VerdictState::NotApplicable,
            evidence: None,
            confidence: 0.0,
            rationale: rationale.into(),
            na_reason: Some(reason),
            adjudicator: AdjudicatorKind::ApproximateOracle,
        }
    }

    /// A degraded verdict; never presented as definitive.
    pub fn inconclusive(claim_id: ClaimId, rationale: impl Into<String>) -> Self {
        Self::not_applicable(claim_id, NaReason::Inconclusive, rationale)
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_adjudicator(mut self, adjudicator: AdjudicatorKind) -> Self {
        self.adjudicator = adjudicator;
        self
    }

    pub fn is_inconclusive(&self) -> bool {
        self.na_reason == Some(NaReason::Inconclusive)
    }
}

/// Clamp to `[0, 1]`, mapping NaN to zero.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
