//! Prompt construction for every generation call the loop makes.
//!
//! Each prompt opens with a task line so transcripts (and scripted test
//! providers) can tell the calls apart.

use crate::chunk::Chunk;
use crate::evidence::EvidenceContext;
use tether_claims::Claim;

pub mod markers {
    pub const GENERATE: &str = "TASK: GENERATE_SPEC";
    pub const EXTRACT: &str = "TASK: EXTRACT_CLAIMS";
    pub const REPAIR: &str = "TASK: REPAIR_CLAIMS";
    pub const LOCATE: &str = "TASK: LOCATE_EVIDENCE";
    pub const ADJUDICATE: &str = "TASK: ADJUDICATE_CLAIMS";
    pub const REGENERATE: &str = "TASK: REGENERATE_SPEC";
}

pub const SYSTEM_PROMPT: &str = "You are a meticulous software specification analyst. \
When asked for JSON, answer with JSON only.";

const CATEGORY_VOCABULARY: &str = "functionality, security, data-privacy, operational, legal";
const SEVERITY_VOCABULARY: &str = "critical, high, medium, low";

pub fn generate_prompt(description: &str) -> String {
    format!(
        "{}\n\n\
        Write a complete software specification in markdown for the system described below. \
        Use `##` section headings and state requirements as short declarative sentences.\n\n\
        Description:\n{}",
        markers::GENERATE,
        description
    )
}

pub fn extract_prompt(chunk: &Chunk) -> String {
    format!(
        "{}\n\n\
        Extract every atomic, testable claim from the specification excerpt below.\n\
        Rules:\n\
        - one claim per condition; split compound statements\n\
        - category is one of: {}\n\
        - severity is one of: {}\n\
        - testable is false only when no code could ever demonstrate the claim\n\n\
        Answer with a JSON array of objects with keys \
        \"section\", \"category\", \"severity\", \"text\", \"testable\".\n\n\
        Sections: {}\n\
        Excerpt:\n{}",
        markers::EXTRACT,
        CATEGORY_VOCABULARY,
        SEVERITY_VOCABULARY,
        chunk.sections.join(", "),
        chunk.text
    )
}

/// Narrower re-ask after malformed or truncated extraction output.
pub fn repair_prompt(chunk: &Chunk, problem: &str) -> String {
    format!(
        "{}\n\n\
        Your previous answer could not be used ({}). \
        List at most 25 claims from the excerpt below, each text under 200 characters. \
        Answer with a compact JSON array only, \
        keys \"category\", \"severity\", \"text\", \"testable\". \
        Categories: {}. Severities: {}.\n\n\
        Sections: {}\n\
        Excerpt:\n{}",
        markers::REPAIR,
        problem,
        CATEGORY_VOCABULARY,
        SEVERITY_VOCABULARY,
        chunk.sections.join(", "),
        chunk.text
    )
}

pub fn locate_prompt(claims: &[&Claim], paths: &[String], max_candidates: usize) -> String {
    let claim_lines = claims
        .iter()
        .map(|c| format!("{} [{}] {}", c.id, c.category, c.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n\
        For each claim, pick up to {} files from the listing that are most likely to implement \
        or contradict it. Use only paths that appear in the listing; an empty list is allowed.\n\
        Answer with a JSON object mapping claim id to an array of paths.\n\n\
        Claims:\n{}\n\n\
        Files:\n{}",
        markers::LOCATE,
        max_candidates,
        claim_lines,
        paths.join("\n")
    )
}

pub fn adjudicate_prompt(claims: &[&Claim], context: &EvidenceContext) -> String {
    let claim_lines = claims
        .iter()
        .map(|c| format!("{} [{} / {}] {}", c.id, c.category, c.severity, c.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n\
        Judge each claim against the source files below.\n\
        - PASS: the code fully satisfies the claim\n\
        - PARTIAL: some but not all conditions hold\n\
        - FAIL: the code contradicts or omits the claim\n\
        - N_A: the claim cannot be judged from static source\n\n\
        Answer with a JSON array of objects: \"claim_id\", \"state\", \"confidence\" (0 to 1), \
        \"rationale\", and for PASS/PARTIAL/FAIL an \"evidence\" object with \"file\", \
        \"start_line\", \"end_line\", \"snippet\". Cite only files shown below.\n\n\
        Claims:\n{}\n\n\
        Source files:\n{}",
        markers::ADJUDICATE,
        claim_lines,
        context.render()
    )
}

pub fn regenerate_prompt(reality: &str, outline: &[String], human_context: Option<&str>) -> String {
    let outline = if outline.is_empty() {
        "(no headings)".to_string()
    } else {
        outline.join("\n")
    };
    let human = human_context
        .map(|context| format!("New guidance from the operator:\n{}\n\n", context))
        .unwrap_or_default();

    format!(
        "{}\n\n\
        Rewrite the specification for the next iteration.\n\
        - keep every PASS claim, wording nearly unchanged\n\
        - rewrite PARTIAL claims so they describe what is actually implemented\n\
        - drop FAIL claims or mark them with \"[aspirational]\"\n\
        - keep N_A claims unless the operator guidance says otherwise\n\
        - you may introduce new requirements\n\n\
        {}\
        Verified state:\n{}\n\n\
        Previous outline:\n{}",
        markers::REGENERATE,
        human,
        reality,
        outline
    )
}
