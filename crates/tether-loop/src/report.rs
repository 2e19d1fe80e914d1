//! Iteration completion reports.

use crate::readiness::{ExitReadiness, ScoreTrend};
use serde::Serialize;
use std::fmt::Write;
use tether_claims::{ComplianceScore, Iteration, RemediationTask, VerdictTally};

/// A claim that could not be adjudicated this pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InconclusiveClaim {
    pub claim_id: String,
    pub text: String,
    pub reason: String,
}

/// What a human needs after a pass commits. Inconclusive claims are always listed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationReport {
    pub index: u32,
    pub run_id: String,
    pub score: ComplianceScore,
    pub tally: VerdictTally,
    pub inconclusive: Vec<InconclusiveClaim>,
    pub tasks: Vec<RemediationTask>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ExitReadiness>,
}

impl IterationReport {
    pub fn from_iteration(iteration: &Iteration) -> Self {
        let inconclusive = iteration
            .adjudicated()
            .filter(|(_, verdict)| verdict.is_inconclusive())
            .map(|(claim, verdict)| InconclusiveClaim {
                claim_id: claim.id.to_string(),
                text: claim.text.clone(),
                reason: verdict.rationale.clone(),
            })
            .collect();

        Self {
            index: iteration.index,
            run_id: iteration.run_id.to_string(),
            score: iteration.compliance_score,
            tally: iteration.tally,
            inconclusive,
            tasks: iteration.remediation_tasks.clone(),
            warnings: iteration.warnings.clone(),
            readiness: None,
        }
    }

    pub fn with_readiness(mut self, readiness: ExitReadiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let t = &self.tally;

        let _ = writeln!(out, "# Iteration {} report", self.index);
        let _ = writeln!(out);
        let _ = writeln!(out, "Run: `{}`", self.run_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "**Compliance score:** {}", self.score);
        let _ = writeln!(out);
        let _ = writeln!(out, "| PASS | PARTIAL | FAIL | N_A | of which inconclusive | total |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            t.pass, t.partial, t.fail, t.na, t.inconclusive, t.total
        );

        let _ = writeln!(out);
        let _ = writeln!(out, "## Inconclusive claims ({})", self.inconclusive.len());
        let _ = writeln!(out);
        if self.inconclusive.is_empty() {
            let _ = writeln!(out, "None.");
        }
        for claim in &self.inconclusive {
            let _ = writeln!(out, "- `{}` {} ({})", claim.claim_id, claim.text, claim.reason);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "## Remediation tasks ({})", self.tasks.len());
        let _ = writeln!(out);
        for (n, task) in self.tasks.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. [{} / {} / {}] {}",
                n + 1,
                task.source_state,
                task.severity,
                task.effort,
                task.title
            );
            if !task.target_files.is_empty() {
                let _ = writeln!(out, "   files: {}", task.target_files.join(", "));
            }
        }

        if let Some(readiness) = &self.readiness {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Exit readiness");
            let _ = writeln!(out);
            let trend = match readiness.trend {
                ScoreTrend::Improving => "improving",
                ScoreTrend::Declining => "declining",
                ScoreTrend::Flat => "flat",
                ScoreTrend::Unknown => "unknown",
            };
            match readiness.delta {
                Some(delta) => {
                    let _ = writeln!(out, "- score trend: {} ({:+.2} points)", trend, delta);
                }
                None => {
                    let _ = writeln!(out, "- score trend: {}", trend);
                }
            }
            let _ = writeln!(
                out,
                "- outstanding critical failures: {}",
                readiness.outstanding_critical_failures.len()
            );
            let _ = writeln!(out, "- regressions: {}", readiness.regressions.len());
            let _ = writeln!(out, "- resolved: {}", readiness.resolved.len());
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Warnings ({})", self.warnings.len());
            let _ = writeln!(out);
            for warning in &self.warnings {
                let _ = writeln!(out, "- {}", warning);
            }
        }

        out
    }
}
