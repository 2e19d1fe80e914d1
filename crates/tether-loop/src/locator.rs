//! Evidence location: narrowing the codebase to a few candidate files per claim.

use crate::error::{LoopError, Result};
use crate::prompts;
use crate::service::{self, until_cancelled};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tether_claims::{Claim, ClaimId};
use tether_common_async::{run_bounded, CancelHandle, RetryPolicy};
use tether_common_config::EvidenceConfig;
use tether_common_log::spans::{batch_span, instrument_future};
use tether_llm::{extract_json, LlmProvider, LlmResponse};
use tracing::{debug, info, warn};

/// Where to look for one claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorResult {
    /// Ranked candidate paths; empty means nothing in the codebase relates.
    Candidates(Vec<String>),
    /// Location failed; the claim cannot be adjudicated this pass.
    Inconclusive(String),
}

impl LocatorResult {
    pub fn candidates(&self) -> &[String] {
        match self {
            LocatorResult::Candidates(paths) => paths,
            LocatorResult::Inconclusive(_) => &[],
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, LocatorResult::Inconclusive(_))
    }
}

/// Per-claim locator results.
pub type Located = BTreeMap<ClaimId, LocatorResult>;

/// Narrows the search space for a set of claims.
///
/// Implementations return an entry for every claim. Only cancellation is an error.
#[async_trait]
pub trait Locator: Send + Sync {
    async fn locate(
        &self,
        claims: &[Claim],
        paths: &[String],
        cancel: &CancelHandle,
    ) -> Result<Located>;
}

/// Rank, deduplicate and cap model-proposed paths, discarding any not in the listing.
fn sanitize_candidates(
    proposed: &[String],
    listing: &HashSet<&str>,
    max_candidates: usize,
) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut discarded = 0;

    for path in proposed {
        let path = path.trim().trim_start_matches("./");
        if !listing.contains(path) {
            discarded += 1;
            continue;
        }
        if seen.insert(path) && kept.len() < max_candidates {
            kept.push(path.to_string());
        }
    }
    (kept, discarded)
}

/// File-tree triage by the generative service.
pub struct OracleLocator {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    max_candidates: usize,
    max_in_flight: usize,
}

impl OracleLocator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &EvidenceConfig,
        retry: RetryPolicy,
        max_in_flight: usize,
    ) -> Self {
        Self {
            provider,
            retry,
            batch_size: config.locator_batch_size.max(1),
            max_candidates: config.max_candidates,
            max_in_flight,
        }
    }

    async fn locate_batch(
        &self,
        batch: &[&Claim],
        paths: &[String],
        listing: &HashSet<&str>,
    ) -> Vec<(ClaimId, LocatorResult)> {
        let request = service::request(prompts::locate_prompt(batch, paths, self.max_candidates));
        let response = service::complete_parsed(
            self.provider.as_ref(),
            &self.retry,
            request,
            parse_locations,
        )
        .await;

        let mut located = match response {
            Ok(located) => located,
            Err(exhausted) => {
                let error = LoopError::LocatorTimeout {
                    attempts: exhausted.attempts,
                    message: exhausted.last.to_string(),
                };
                warn!(
                    claims = batch.len(),
                    error = %error,
                    "locator batch degraded to inconclusive"
                );
                return batch
                    .iter()
                    .map(|claim| {
                        let result = LocatorResult::Inconclusive(error.to_string());
                        (claim.id.clone(), result)
                    })
                    .collect();
            }
        };

        batch
            .iter()
            .map(|claim| {
                let result = match located.remove(claim.id.as_str()) {
                    Some(proposed) => {
                        let (kept, discarded) =
                            sanitize_candidates(&proposed, listing, self.max_candidates);
                        if discarded > 0 {
                            debug!(
                                claim = %claim.id,
                                discarded,
                                "discarded paths outside the listing"
                            );
                        }
                        LocatorResult::Candidates(kept)
                    }
                    None => {
                        warn!(claim = %claim.id, "locator response omitted claim");
                        LocatorResult::Inconclusive(
                            "locator response omitted the claim".to_string(),
                        )
                    }
                };
                (claim.id.clone(), result)
            })
            .collect()
    }
}

fn parse_locations(
    response: &LlmResponse,
) -> std::result::Result<BTreeMap<String, Vec<String>>, String> {
    let json = extract_json(&response.content)
        .ok_or_else(|| "no JSON object in locator output".to_string())?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| format!("invalid locator JSON: {}", e))?;
    let Value::Object(map) = value else {
        return Err("locator output is not a JSON object".to_string());
    };

    Ok(map
        .into_iter()
        .map(|(id, paths)| {
            let paths = match paths {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect(),
                Value::String(single) => vec![single],
                _ => Vec::new(),
            };
            (id.trim().to_string(), paths)
        })
        .collect())
}

#[async_trait]
impl Locator for OracleLocator {
    async fn locate(
        &self,
        claims: &[Claim],
        paths: &[String],
        cancel: &CancelHandle,
    ) -> Result<Located> {
        let listing: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let refs: Vec<&Claim> = claims.iter().collect();
        let batches: Vec<&[&Claim]> = refs.chunks(self.batch_size).collect();
        info!(
            claims = claims.len(),
            batches = batches.len(),
            files = paths.len(),
            "locating evidence"
        );

        let listing = &listing;
        let work = batches.iter().enumerate().map(|(index, batch)| {
            let span = batch_span("locate", index, batch.len());
            let located = self.locate_batch(batch, paths, listing);
            until_cancelled(cancel, instrument_future(located, span))
        });

        let mut located = Located::new();
        for batch in run_bounded(self.max_in_flight, work).await {
            located.extend(batch?);
        }
        Ok(located)
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "are", "must", "should", "shall", "will", "all",
    "any", "not", "from", "into", "when", "each", "every", "only", "can", "its", "has", "have",
    "been", "was",
    "per", "via", "use", "uses", "used", "than", "then", "they", "their", "also", "may",
];

/// Minimum shared prefix for two tokens to count as related.
const PREFIX_MATCH: usize = 4;

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn related(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let shared = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
    shared >= PREFIX_MATCH
}

/// Deterministic ranking of paths by token overlap with the claim text.
pub struct KeywordLocator {
    max_candidates: usize,
}

impl KeywordLocator {
    pub fn new(max_candidates: usize) -> Self {
        Self { max_candidates }
    }

    pub fn rank(&self, claim: &Claim, paths: &[String]) -> Vec<String> {
        let claim_tokens: HashSet<String> = tokens(&claim.text).into_iter().collect();
        if claim_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &String)> = paths
            .iter()
            .filter_map(|path| {
                let path_tokens = tokens(path);
                let score = claim_tokens
                    .iter()
                    .filter(|token| path_tokens.iter().any(|p| related(token, p)))
                    .count();
                (score > 0).then_some((score, path))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(self.max_candidates).map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Locator for KeywordLocator {
    async fn locate(
        &self,
        claims: &[Claim],
        paths: &[String],
        cancel: &CancelHandle,
    ) -> Result<Located> {
        if cancel.is_cancelled() {
            return Err(LoopError::Cancelled);
        }
        Ok(claims
            .iter()
            .map(|claim| (claim.id.clone(), LocatorResult::Candidates(self.rank(claim, paths))))
            .collect())
    }
}
