//! Locating JSON inside free-form model output.
//!
//! Models wrap structured answers in prose or markdown fences, and
//! sometimes stop mid-document. [`extract_json`] finds the first complete
//! JSON value; truncated output yields `None` so callers can request a repair.

use crate::provider::LlmError;
use serde::de::DeserializeOwned;

/// Find the first complete JSON array or object in `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(fenced) = fenced_block(text) {
        if let Some(value) = balanced_value(fenced) {
            return Some(value);
        }
    }
    balanced_value(text)
}

/// Extract and deserialize the first JSON value in `text`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json(text)
        .ok_or_else(|| LlmError::ParseError("no complete JSON value in output".to_string()))?;
    serde_json::from_str(json).map_err(|e| LlmError::ParseError(e.to_string()))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = match text.find("```json") {
        Some(idx) => idx + "```json".len(),
        None => text.find("```")? + 3,
    };
    let body = &text[start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

/// Scan from the first `[` or `{` to its matching close, honouring strings.
fn balanced_value(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
