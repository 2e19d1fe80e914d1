//! Shared fixtures for loop integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use tether_common_config::{LocatorKind, TetherConfig};
use tether_loop::prompts::markers;
use tether_loop::{CodebaseSnapshot, Orchestrator};
use tether_store::IterationStore;
use tether_test_utils::{Reply, ScriptedProvider};

/// Configuration with fast retries and the deterministic keyword locator.
pub fn fast_config() -> TetherConfig {
    let mut config = TetherConfig::default();
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config.retry.timeout_secs = 5;
    config.evidence.locator = LocatorKind::Keyword;
    config
}

pub fn orchestrator(
    config: TetherConfig,
    provider: Arc<ScriptedProvider>,
    snapshot: Arc<dyn CodebaseSnapshot>,
    store: Arc<dyn IterationStore>,
) -> Orchestrator {
    tether_test_utils::assert_ok!(Orchestrator::new(config, provider, snapshot, store))
}

/// `(id, text)` for every claim line between `Claims:` and `end`.
pub fn claim_lines(prompt: &str, end: &str) -> Vec<(String, String)> {
    let Some(start) = prompt.find("Claims:\n") else { return Vec::new() };
    let rest = &prompt[start + "Claims:\n".len()..];
    let block = rest.find(end).map_or(rest, |i| &rest[..i]);

    block
        .lines()
        .filter_map(|line| {
            let (id, rest) = line.split_once(' ')?;
            let text = rest.split_once("] ").map_or(rest, |(_, text)| text);
            Some((id.to_string(), text.to_string()))
        })
        .collect()
}

/// Files rendered into an adjudication prompt, in order.
pub fn context_files(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| line.strip_prefix("=== "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Classify a claim text: category and severity used by [`echo_extractor`].
fn classify(text: &str) -> (&'static str, &'static str) {
    let lowered = text.to_lowercase();
    if lowered.contains("password") || lowered.contains("argon2") {
        ("security", "critical")
    } else if lowered.contains("license") {
        ("legal", "low")
    } else {
        ("functionality", "high")
    }
}

/// Extraction reply that turns every non-heading line of the excerpt into one claim.
pub fn echo_extractor() -> Reply {
    Reply::dynamic(|request| {
        let text = request.full_text();
        let excerpt = text.split_once("Excerpt:\n").map_or("", |(_, rest)| rest);
        let claims: Vec<Value> = excerpt
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.trim_start_matches("- ").to_string())
            .map(|line| {
                let (category, severity) = classify(&line);
                json!({
                    "category": category,
                    "severity": severity,
                    "text": line,
                    "testable": true,
                })
            })
            .collect();
        Reply::Text(Value::Array(claims).to_string())
    })
}

/// Adjudication reply computed by `judge(claim_text, rendered_prompt)`.
///
/// PASS, PARTIAL and FAIL verdicts cite the first file of the evidence context.
pub fn judging_oracle(judge: impl Fn(&str, &str) -> &'static str + Send + Sync + 'static) -> Reply {
    Reply::dynamic(move |request| {
        let prompt = request.full_text();
        let cited = context_files(&prompt).into_iter().next();
        let verdicts: Vec<Value> = claim_lines(&prompt, "\n\nSource files:")
            .into_iter()
            .map(|(id, text)| {
                let state = judge(&text, &prompt);
                let mut verdict = json!({
                    "claim_id": id,
                    "state": state,
                    "confidence": 0.9,
                    "rationale": format!("judged {}", state),
                });
                if let (Some(file), true) = (&cited, state != "N_A") {
                    verdict["evidence"] = json!({ "file": file, "start_line": 1, "end_line": 1 });
                }
                verdict
            })
            .collect();
        Reply::Text(Value::Array(verdicts).to_string())
    })
}

/// Provider answering extraction by echo and adjudication with `oracle`.
pub fn provider_with(oracle: Reply, regenerated: &str) -> ScriptedProvider {
    ScriptedProvider::new()
        .on_replies(markers::EXTRACT, vec![echo_extractor()])
        .on_replies(markers::ADJUDICATE, vec![oracle])
        .on(markers::REGENERATE, regenerated)
}

pub const WIDGET_SPEC: &str = "\
# Widget Service

## Authentication
Passwords are hashed with argon2.

## Widgets
Widgets are persisted in SQLite.
Users can export widgets as CSV files.
";

pub const AUTH_RS: &str = "use argon2::Argon2;\n\n\
                           pub fn hash(p: &str) -> String {\n    Argon2::default().hash(p)\n}\n";

pub const WIDGETS_RS: &str = "use rusqlite::Connection;\n\npub fn save(conn: &Connection) {}\n";

pub const WIDGETS_WITH_EXPORT_RS: &str = "use rusqlite::Connection;\n\n\
                                          pub fn save(conn: &Connection) {}\n\n\
                                          pub fn export_csv() -> String {\n    String::new()\n}\n";

/// PASS when the code shows what the claim asks for, FAIL otherwise.
pub fn widget_judge(text: &str, prompt: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let holds = if lowered.contains("argon2") {
        prompt.contains("Argon2")
    } else if lowered.contains("sqlite") {
        prompt.contains("rusqlite")
    } else if lowered.contains("export") {
        prompt.contains("fn export_csv")
    } else {
        false
    };
    if holds {
        "PASS"
    } else {
        "FAIL"
    }
}
