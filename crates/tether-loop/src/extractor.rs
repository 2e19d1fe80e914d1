//! Claim extraction: specification document to atomic, typed claims.

use crate::chunk::{chunk_document, Chunk};
use crate::error::{LoopError, Result};
use crate::prompts;
use crate::service::{self, until_cancelled};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tether_claims::{Category, Claim, Severity};
use tether_common_async::{run_bounded, CancelHandle, RetryPolicy};
use tether_common_config::ExtractionConfig;
use tether_common_log::spans::{batch_span, instrument_future};
use tether_llm::{extract_json, LlmProvider, LlmResponse};
use tracing::{debug, info, warn};

/// Fragments shorter than this stay attached to their neighbour when splitting.
const MIN_FRAGMENT_CHARS: usize = 12;

const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "approx.", "no.", "mr.", "dr.", "cf.",
];

/// A chunk whose claims could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedChunk {
    pub index: usize,
    pub section: String,
    pub reason: String,
}

/// Result of extracting claims from one document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub claims: Vec<Claim>,
    pub warnings: Vec<String>,
    pub dropped_chunks: Vec<DroppedChunk>,
}

#[derive(Default)]
struct ChunkOutcome {
    claims: Vec<Claim>,
    warnings: Vec<String>,
    dropped: Option<DroppedChunk>,
}

/// Turns a specification document into claims, chunk by chunk.
pub struct ClaimExtractor {
    provider: Arc<dyn LlmProvider>,
    config: ExtractionConfig,
    retry: RetryPolicy,
    max_in_flight: usize,
}

impl ClaimExtractor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: ExtractionConfig,
        retry: RetryPolicy,
        max_in_flight: usize,
    ) -> Self {
        Self {
            provider,
            config,
            retry,
            max_in_flight,
        }
    }

    /// Extract claims from `document`.
    ///
    /// Chunk failures never abort extraction: a chunk that stays malformed
    /// after one repair attempt is dropped and recorded. Only cancellation
    /// is returned as an error.
    pub async fn extract(&self, document: &str, cancel: &CancelHandle) -> Result<Extraction> {
        let chunks = chunk_document(document, self.config.chunk_max_chars);
        info!(chunks = chunks.len(), chars = document.chars().count(), "extracting claims");

        let work = chunks.iter().map(|chunk| {
            let span = batch_span("extract", chunk.index, 0);
            until_cancelled(cancel, instrument_future(self.extract_chunk(chunk), span))
        });
        let outcomes = run_bounded(self.max_in_flight, work).await;

        let mut extraction = Extraction::default();
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;

        for outcome in outcomes {
            let outcome = outcome?;
            extraction.warnings.extend(outcome.warnings);
            if let Some(dropped) = outcome.dropped {
                extraction.dropped_chunks.push(dropped);
            }
            for claim in outcome.claims {
                if seen.insert(claim.id.clone()) {
                    extraction.claims.push(claim);
                } else {
                    duplicates += 1;
                }
            }
        }

        if duplicates > 0 {
            debug!(duplicates, "collapsed duplicate claims");
        }
        info!(
            claims = extraction.claims.len(),
            warnings = extraction.warnings.len(),
            dropped_chunks = extraction.dropped_chunks.len(),
            "extraction finished"
        );
        Ok(extraction)
    }

    async fn extract_chunk(&self, chunk: &Chunk) -> ChunkOutcome {
        let request = service::request(prompts::extract_prompt(chunk));
        let first = match service::complete(self.provider.as_ref(), &self.retry, request).await {
            Ok(response) => response,
            Err(exhausted) => {
                let reason = format!(
                    "generation failed after {} attempt(s): {}",
                    exhausted.attempts, exhausted.last
                );
                return drop_chunk(chunk, reason);
            }
        };

        let items = match parse_claim_items(&first) {
            Ok(items) => items,
            Err(problem) => {
                let error = LoopError::ExtractionParse {
                    chunk: chunk.index,
                    message: problem.clone(),
                };
                warn!(error = %error, "requesting repair");

                let repair = service::request(prompts::repair_prompt(chunk, &problem));
                match service::complete(self.provider.as_ref(), &self.retry, repair).await {
                    Ok(response) => match parse_claim_items(&response) {
                        Ok(items) => items,
                        Err(problem) => {
                            return drop_chunk(chunk, format!("repair output unusable: {}", problem))
                        }
                    },
                    Err(exhausted) => {
                        let reason = format!("repair request failed: {}", exhausted.last);
                        return drop_chunk(chunk, reason);
                    }
                }
            }
        };

        let mut outcome = ChunkOutcome::default();
        for item in &items {
            match claims_from_item(item, chunk, self.config.split_compound) {
                Ok((claims, warnings)) => {
                    for warning in &warnings {
                        warn!(chunk = chunk.index, "{}", warning);
                    }
                    outcome.claims.extend(claims);
                    outcome.warnings.extend(warnings);
                }
                Err(warning) => {
                    warn!(chunk = chunk.index, "{}", warning);
                    outcome.warnings.push(warning);
                }
            }
        }
        debug!(chunk = chunk.index, claims = outcome.claims.len(), "chunk extracted");
        outcome
    }
}

fn drop_chunk(chunk: &Chunk, reason: String) -> ChunkOutcome {
    warn!(
        chunk = chunk.index,
        section = %chunk.primary_section(),
        reason = %reason,
        "dropping chunk"
    );
    ChunkOutcome {
        claims: Vec::new(),
        warnings: vec![format!(
            "extract: dropped chunk {} ({}): {}",
            chunk.index,
            chunk.primary_section(),
            reason
        )],
        dropped: Some(DroppedChunk {
            index: chunk.index,
            section: chunk.primary_section().to_string(),
            reason,
        }),
    }
}

/// Locate the claim array in model output: a bare array or a `{"claims": [...]}` wrapper.
fn parse_claim_items(response: &LlmResponse) -> std::result::Result<Vec<Value>, String> {
    let json = extract_json(&response.content).ok_or_else(|| {
        if response.is_truncated() {
            "output truncated before the JSON closed".to_string()
        } else {
            "no JSON array in output".to_string()
        }
    })?;

    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("claims") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err("JSON object without a \"claims\" array".to_string()),
        },
        _ => Err("JSON value is not an array".to_string()),
    }
}

fn claims_from_item(
    item: &Value,
    chunk: &Chunk,
    split: bool,
) -> std::result::Result<(Vec<Claim>, Vec<String>), String> {
    let text = ["text", "claim", "statement"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| format!("extract: skipped claim without text in chunk {}", chunk.index))?;

    let mut warnings = Vec::new();

    let raw_category = item.get("category").and_then(Value::as_str).unwrap_or("");
    let (category, coerced) = Category::coerce(raw_category);
    if coerced {
        warnings.push(format!(
            "extract: unknown category '{}' coerced to {} for \"{}\"",
            raw_category, category, text
        ));
    }

    let raw_severity = item.get("severity").and_then(Value::as_str).unwrap_or("");
    let (severity, coerced) = Severity::coerce(raw_severity);
    if coerced {
        warnings.push(format!(
            "extract: unknown severity '{}' coerced to {} for \"{}\"",
            raw_severity, severity, text
        ));
    }

    let testable = match item.get("testable") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !matches!(s.trim().to_lowercase().as_str(), "false" | "no" | "0"),
        _ => true,
    };
    let section = chunk.resolve_section(item.get("section").and_then(Value::as_str));

    let texts = if split {
        split_compound(text)
    } else {
        vec![text.to_string()]
    };
    let claims = texts
        .into_iter()
        .map(|clause| Claim::new(section.clone(), category, severity, clause, testable))
        .collect();

    Ok((claims, warnings))
}

/// Split compound claim text into one clause per sentence or `;`-joined part.
pub fn split_compound(text: &str) -> Vec<String> {
    let mut clauses: Vec<String> = Vec::new();

    for (part_index, part) in text.split(';').enumerate() {
        for (sentence_index, sentence) in split_sentences(part).into_iter().enumerate() {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if let Some(last) = clauses.last_mut() {
                let short = sentence.chars().count() < MIN_FRAGMENT_CHARS
                    || last.chars().count() < MIN_FRAGMENT_CHARS;
                if short {
                    let joiner = if part_index > 0 && sentence_index == 0 { "; " } else { " " };
                    last.push_str(joiner);
                    last.push_str(sentence);
                    continue;
                }
            }
            clauses.push(sentence.to_string());
        }
    }

    clauses
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for window in 0..chars.len() {
        let (idx, ch) = chars[window];
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let next_is_space = chars.get(window + 1).is_some_and(|(_, c)| c.is_whitespace());
        let after_is_upper = chars[window + 1..]
            .iter()
            .find(|(_, c)| !c.is_whitespace())
            .is_some_and(|(_, c)| c.is_uppercase());
        if !(next_is_space && after_is_upper) {
            continue;
        }

        let end = idx + ch.len_utf8();
        let candidate = &text[start..end];
        let last_word = candidate.split_whitespace().last().unwrap_or("").to_lowercase();
        if ABBREVIATIONS.contains(&last_word.as_str()) {
            continue;
        }
        sentences.push(candidate);
        start = end;
    }
    sentences.push(&text[start..]);

    sentences
}
