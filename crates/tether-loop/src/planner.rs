//! Remediation planning: FAIL and PARTIAL verdicts become ordered fix tasks.
//!
//! The planner is deterministic and only plans. Task order is FAIL before
//! PARTIAL, then descending severity, then claim id.

use crate::locator::Located;
use std::collections::HashMap;
use tether_claims::{
    Category, Claim, ClaimId, Effort, RemediationAction, RemediationTask, Severity, TaskId, Verdict,
    VerdictState,
};
use tracing::debug;

const TITLE_MAX_CHARS: usize = 80;

fn tier(state: VerdictState) -> Option<u8> {
    match state {
        VerdictState::Fail => Some(0),
        VerdictState::Partial => Some(1),
        VerdictState::Pass | VerdictState::NotApplicable => None,
    }
}

fn action_for(claim: &Claim, verdict: &Verdict) -> RemediationAction {
    if claim.category == Category::Operational {
        return RemediationAction::Configure;
    }
    match (verdict.state, &verdict.evidence) {
        (VerdictState::Fail, None) => RemediationAction::Add,
        (VerdictState::Fail, Some(_)) if claim.is_prohibition() => RemediationAction::Remove,
        _ => RemediationAction::Modify,
    }
}

fn step(effort: Effort, up: bool) -> Effort {
    match (effort, up) {
        (Effort::Trivial, true) => Effort::Small,
        (Effort::Small, true) => Effort::Medium,
        (Effort::Medium, true) | (Effort::Large, true) => Effort::Large,
        (Effort::Trivial, false) | (Effort::Small, false) => Effort::Trivial,
        (Effort::Medium, false) => Effort::Small,
        (Effort::Large, false) => Effort::Medium,
    }
}

/// Effort from tier, severity and action.
pub fn estimate_effort(
    state: VerdictState,
    severity: Severity,
    action: RemediationAction,
) -> Effort {
    let mut effort = match severity {
        Severity::Critical => Effort::Large,
        Severity::High => Effort::Medium,
        Severity::Medium => Effort::Small,
        Severity::Low => Effort::Trivial,
    };
    if state == VerdictState::Partial {
        effort = step(effort, false);
    }
    match action {
        RemediationAction::Add => step(effort, true),
        RemediationAction::Configure => effort.min(Effort::Small),
        RemediationAction::Modify | RemediationAction::Remove => effort,
    }
}

fn title(action: RemediationAction, text: &str) -> String {
    let verb = match action {
        RemediationAction::Add => "Add",
        RemediationAction::Modify => "Modify",
        RemediationAction::Remove => "Remove",
        RemediationAction::Configure => "Configure",
    };
    let full = format!("{}: {}", verb, text.trim());
    if full.chars().count() <= TITLE_MAX_CHARS {
        return full;
    }
    let cut: String = full.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

fn guidance(
    claim: &Claim,
    verdict: &Verdict,
    action: RemediationAction,
    targets: &[String],
) -> String {
    let mut parts = Vec::new();
    if !verdict.rationale.is_empty() {
        parts.push(verdict.rationale.clone());
    }
    match &verdict.evidence {
        Some(evidence) => parts.push(format!("Evidence: {}.", evidence.location())),
        None => parts.push("No implementing code was found.".to_string()),
    }
    match action {
        RemediationAction::Add if targets.is_empty() => {
            parts.push(format!("Implement \"{}\" in a new or existing module.", claim.text))
        }
        RemediationAction::Add => parts.push(format!("Likely home: {}.", targets.join(", "))),
        RemediationAction::Remove => {
            parts.push("Remove or guard the behaviour the claim prohibits.".to_string())
        }
        RemediationAction::Configure => {
            parts.push("Adjust configuration or deployment settings.".to_string())
        }
        RemediationAction::Modify => {}
    }
    parts.join(" ")
}

/// Turns the verdict set of an iteration into an ordered task list.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemediationPlanner;

impl RemediationPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan one task per FAIL or PARTIAL verdict whose claim is in `claims`.
    pub fn plan(
        &self,
        claims: &[Claim],
        verdicts: &[Verdict],
        located: &Located,
    ) -> Vec<RemediationTask> {
        let by_id: HashMap<&ClaimId, &Claim> = claims.iter().map(|c| (&c.id, c)).collect();

        let mut tasks: Vec<RemediationTask> = verdicts
            .iter()
            .filter(|v| tier(v.state).is_some())
            .filter_map(|verdict| {
                let Some(claim) = by_id.get(&verdict.claim_id) else {
                    debug!(claim = %verdict.claim_id, "verdict without claim not planned");
                    return None;
                };
                let action = action_for(claim, verdict);

                let mut target_files: Vec<String> = Vec::new();
                if let Some(evidence) = &verdict.evidence {
                    target_files.push(evidence.file.clone());
                }
                if let Some(result) = located.get(&claim.id) {
                    for path in result.candidates() {
                        if !target_files.contains(path) {
                            target_files.push(path.clone());
                        }
                    }
                }

                Some(RemediationTask {
                    id: TaskId::for_claim(&claim.id),
                    claim_id: claim.id.clone(),
                    title: title(action, &claim.text),
                    description: format!(
                        "{} {} claim from section \"{}\": {}",
                        verdict.state, claim.severity, claim.source_section, claim.text
                    ),
                    effort: estimate_effort(verdict.state, claim.severity, action),
                    guidance: guidance(claim, verdict, action, &target_files),
                    action,
                    target_files,
                    source_state: verdict.state,
                    severity: claim.severity,
                })
            })
            .collect();

        tasks.sort_by(|a, b| {
            tier(a.source_state)
                .cmp(&tier(b.source_state))
                .then_with(|| b.severity.cmp(&a.severity))
                .then_with(|| a.claim_id.cmp(&b.claim_id))
        });
        tasks
    }
}
