//! Next-document generation from a committed iteration.
//!
//! The generative service writes the next specification from a compact
//! summary of verified state. Its output is then post-processed so that
//! verified claims are never lost and failed claims are never restated as
//! fact. New material the service introduces is left alone.

use crate::chunk::heading_text;
use crate::error::Result;
use crate::prompts;
use crate::service::{self, until_cancelled};
use std::collections::HashSet;
use std::sync::Arc;
use tether_claims::{
    normalize_claim_text, Claim, Iteration, Verdict, VerdictState, ASPIRATIONAL_MARKER,
};
use tether_common_async::{CancelHandle, RetryPolicy};
use tether_common_config::{FailPolicy, RegenerationConfig};
use tether_llm::{LlmProvider, LlmResponse};
use tracing::{debug, info, warn};

pub const VERIFIED_BASELINE_HEADING: &str = "## Verified Baseline";
pub const ASPIRATIONAL_HEADING: &str = "## Aspirational";

/// Room kept for the overflow summary line.
const OVERFLOW_RESERVE: usize = 80;
const CLAIM_CHARS: usize = 300;
const RATIONALE_CHARS: usize = 120;

fn state_rank(state: VerdictState) -> u8 {
    match state {
        VerdictState::Pass => 0,
        VerdictState::Partial => 1,
        VerdictState::Fail => 2,
        VerdictState::NotApplicable => 3,
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let cut: String = single_line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// Bounded, one-line-per-claim summary of verified state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealityContext {
    pub text: String,
    pub included: usize,
    pub omitted: usize,
}

impl RealityContext {
    /// Summarise `iteration` in at most `max_chars` characters.
    ///
    /// Lines are ordered PASS first, then PARTIAL, FAIL and N_A.
    pub fn build(iteration: &Iteration, max_chars: usize) -> Self {
        let mut entries: Vec<(&Claim, &Verdict)> = iteration.adjudicated().collect();
        entries.sort_by_key(|(_, verdict)| state_rank(verdict.state));

        let budget = max_chars.saturating_sub(OVERFLOW_RESERVE);
        let mut text = String::new();
        let mut used = 0;
        let mut included = 0;

        for (claim, verdict) in &entries {
            let mut line = format!(
                "- {} [{}] {}",
                claim.id,
                verdict.state,
                shorten(&claim.text, CLAIM_CHARS)
            );
            if verdict.state == VerdictState::Partial && !verdict.rationale.is_empty() {
                let rationale = shorten(&verdict.rationale, RATIONALE_CHARS);
                line.push_str(&format!(" (verified: {})", rationale));
            }
            if verdict.is_inconclusive() {
                line.push_str(" (inconclusive)");
            }
            line.push('\n');

            let len = line.chars().count();
            if used + len > budget {
                break;
            }
            used += len;
            text.push_str(&line);
            included += 1;
        }

        let omitted = entries.len() - included;
        if omitted > 0 {
            text.push_str(&format!("- ... {} more claim(s) omitted\n", omitted));
        }

        Self {
            text,
            included,
            omitted,
        }
    }
}

/// Output of regeneration. Never an error: generation failures fall back to a skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regeneration {
    pub document: String,
    pub warnings: Vec<String>,
    pub used_fallback: bool,
}

/// Produces the next iteration's document.
pub struct Regenerator {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    config: RegenerationConfig,
}

impl Regenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        retry: RetryPolicy,
        config: RegenerationConfig,
    ) -> Self {
        Self {
            provider,
            retry,
            config,
        }
    }

    /// Regenerate from a committed iteration. Only cancellation is an error.
    pub async fn regenerate(
        &self,
        iteration: &Iteration,
        human_context: Option<&str>,
        cancel: &CancelHandle,
    ) -> Result<Regeneration> {
        let reality = RealityContext::build(iteration, self.config.reality_context_chars);
        let outline = outline(&iteration.spec_document_text);
        debug!(
            included = reality.included,
            omitted = reality.omitted,
            "reality context built"
        );

        let prompt = prompts::regenerate_prompt(&reality.text, &outline, human_context);
        let request = service::request(prompt);
        let response = until_cancelled(
            cancel,
            service::complete_parsed(self.provider.as_ref(), &self.retry, request, parse_document),
        )
        .await?;

        let mut warnings = Vec::new();
        let (generated, used_fallback) = match response {
            Ok((document, truncated)) => {
                if truncated {
                    warn!(index = iteration.index, "regenerated document was truncated");
                    warnings.push(
                        "regenerate: generated document was truncated by the token limit"
                            .to_string(),
                    );
                }
                (document, false)
            }
            Err(exhausted) => {
                warn!(
                    index = iteration.index,
                    error = %exhausted,
                    "regeneration failed, using skeleton"
                );
                warnings.push(format!(
                    "regenerate: generation failed, deterministic skeleton used: {}",
                    exhausted
                ));
                (skeleton(iteration, self.config.fail_policy), true)
            }
        };

        let document = post_process(&generated, iteration, self.config.fail_policy);
        info!(
            index = iteration.index,
            chars = document.chars().count(),
            used_fallback,
            "next document generated"
        );
        Ok(Regeneration {
            document,
            warnings,
            used_fallback,
        })
    }
}

fn parse_document(response: &LlmResponse) -> std::result::Result<(String, bool), String> {
    let document = strip_fence(&response.content);
    if document.trim().is_empty() {
        return Err("empty document".to_string());
    }
    Ok((document, response.is_truncated()))
}

/// Remove a code fence wrapped around the whole document.
fn strip_fence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() > 6 {
        let inner = &trimmed[3..trimmed.len() - 3];
        // Drop the info string (`markdown`, `md`) on the opening line.
        return inner.split_once('\n').map_or(inner, |(_, rest)| rest).trim().to_string() + "\n";
    }
    trimmed.to_string() + "\n"
}

fn outline(document: &str) -> Vec<String> {
    document
        .lines()
        .filter(|line| heading_text(line).is_some())
        .map(|line| line.trim().to_string())
        .collect()
}

fn title_of(document: &str) -> String {
    document
        .lines()
        .find(|line| line.starts_with("# "))
        .and_then(heading_text)
        .unwrap_or_else(|| "Specification".to_string())
}

fn claims_in(iteration: &Iteration, state: VerdictState) -> Vec<&Claim> {
    iteration
        .adjudicated()
        .filter(|(_, verdict)| verdict.state == state)
        .map(|(claim, _)| claim)
        .collect()
}

/// Drop every aspirational marker, in any case, and collapse whitespace.
fn without_marker(text: &str) -> String {
    // The marker is ASCII, so byte offsets agree between `text` and its lowercase form.
    let lowered = text.to_ascii_lowercase();
    let mut stripped = String::with_capacity(text.len());
    let mut rest = 0;
    for (start, _) in lowered.match_indices(ASPIRATIONAL_MARKER) {
        stripped.push_str(&text[rest..start]);
        stripped.push(' ');
        rest = start + ASPIRATIONAL_MARKER.len();
    }
    stripped.push_str(&text[rest..]);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalized_set(claims: Vec<&Claim>) -> HashSet<String> {
    claims
        .iter()
        .map(|c| normalize_claim_text(&c.text))
        .filter(|t| !t.is_empty())
        .collect()
}

fn aspirational_line(claim: &Claim) -> String {
    format!("- {} {}", ASPIRATIONAL_MARKER, without_marker(&claim.text))
}

/// Deterministic document from verified state alone.
pub fn skeleton(iteration: &Iteration, fail_policy: FailPolicy) -> String {
    let mut out = format!("# {}\n", title_of(&iteration.spec_document_text));

    let mut section = |heading: &str, lines: Vec<String>| {
        if !lines.is_empty() {
            out.push_str(&format!("\n{}\n\n", heading));
            for line in lines {
                out.push_str(&line);
                out.push('\n');
            }
        }
    };

    let plain = |state: VerdictState| {
        claims_in(iteration, state)
            .iter()
            .map(|c| format!("- {}", without_marker(&c.text)))
            .collect::<Vec<_>>()
    };
    section(VERIFIED_BASELINE_HEADING, plain(VerdictState::Pass));
    section("## Partially Implemented", plain(VerdictState::Partial));
    section("## Not Statically Verifiable", plain(VerdictState::NotApplicable));
    if fail_policy == FailPolicy::MarkAspirational {
        section(
            ASPIRATIONAL_HEADING,
            claims_in(iteration, VerdictState::Fail)
                .into_iter()
                .map(aspirational_line)
                .collect(),
        );
    }

    out
}

/// Split a line into its list/indent prefix and content.
fn split_prefix(line: &str) -> (&str, &str) {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let bullet = ["- ", "* ", "+ "]
        .iter()
        .find(|b| rest.starts_with(*b))
        .map_or(0, |b| b.len());
    line.split_at(indent + bullet)
}

/// Enforce the regeneration policy on generated text.
///
/// A line is matched against a claim when the two agree after
/// [`normalize_claim_text`]. Lines restating a PASS claim are kept, with any
/// aspirational marker removed; PASS claims missing from the document are
/// appended under the verified baseline heading. Lines restating a FAIL claim
/// are tagged aspirational, or removed under [`FailPolicy::Drop`]; under the
/// marking policy failed claims the document left out are listed under an
/// aspirational heading.
pub fn post_process(document: &str, iteration: &Iteration, fail_policy: FailPolicy) -> String {
    let passed = normalized_set(claims_in(iteration, VerdictState::Pass));
    let failed = normalized_set(claims_in(iteration, VerdictState::Fail));

    let mut lines: Vec<String> = Vec::new();
    let mut tagged = 0;
    let mut dropped = 0;
    let mut unmarked = 0;
    for line in document.lines() {
        if heading_text(line).is_some() {
            lines.push(line.to_string());
            continue;
        }
        let normalized = normalize_claim_text(line);
        let marked = line.to_lowercase().contains(ASPIRATIONAL_MARKER);

        if passed.contains(&normalized) {
            if marked {
                let (prefix, content) = split_prefix(line);
                lines.push(format!("{}{}", prefix, without_marker(content)));
                unmarked += 1;
            } else {
                lines.push(line.to_string());
            }
            continue;
        }

        let already_tagged = marked && fail_policy == FailPolicy::MarkAspirational;
        if already_tagged || !failed.contains(&normalized) {
            lines.push(line.to_string());
            continue;
        }
        match fail_policy {
            FailPolicy::Drop => dropped += 1,
            FailPolicy::MarkAspirational => {
                let (prefix, content) = split_prefix(line);
                lines.push(format!("{}{} {}", prefix, ASPIRATIONAL_MARKER, content));
                tagged += 1;
            }
        }
    }

    let mut out = lines.join("\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }

    let present = normalize_claim_text(&out);
    let missing_pass: Vec<String> = claims_in(iteration, VerdictState::Pass)
        .into_iter()
        .filter(|c| !present.contains(&normalize_claim_text(&c.text)))
        .map(|c| format!("- {}", without_marker(&c.text)))
        .collect();
    if !missing_pass.is_empty() {
        out.push_str(&format!("\n{}\n\n{}\n", VERIFIED_BASELINE_HEADING, missing_pass.join("\n")));
    }

    let mut missing_fail = Vec::new();
    if fail_policy == FailPolicy::MarkAspirational {
        let restated: HashSet<String> = out.lines().map(normalize_claim_text).collect();
        missing_fail = claims_in(iteration, VerdictState::Fail)
            .into_iter()
            .filter(|c| !restated.contains(&normalize_claim_text(&c.text)))
            .map(aspirational_line)
            .collect();
        if !missing_fail.is_empty() {
            out.push_str(&format!("\n{}\n\n{}\n", ASPIRATIONAL_HEADING, missing_fail.join("\n")));
        }
    }

    debug!(
        restored = missing_pass.len(),
        unmarked,
        tagged,
        dropped,
        listed_aspirational = missing_fail.len(),
        "post-processed regenerated document"
    );
    out
}
