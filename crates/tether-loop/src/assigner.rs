//! Verdict assignment: adjudicating claims against located source files.
//!
//! Adjudication sits behind the [`Adjudicator`] trait. The approximate oracle
//! handles every claim by default; [`AdjudicationRouter`] sends configured
//! categories to deterministic checkers instead. Whatever happens inside a
//! batch, every claim leaves [`VerdictAssigner::assign`] with exactly one
//! verdict: degraded batches become N_A tagged inconclusive.

use crate::error::{LoopError, Result};
use crate::evidence::EvidenceContext;
use crate::locator::{Located, LocatorResult};
use crate::prompts;
use crate::service::{self, until_cancelled};
use crate::snapshot::CodebaseSnapshot;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tether_claims::{
    AdjudicatorKind, Category, Claim, ClaimId, Evidence, LineRange, NaReason, Verdict, VerdictState,
};
use tether_common_async::{run_bounded, with_timeout, CancelHandle, RetryPolicy};
use tether_common_config::{AssignmentConfig, CheckerSpec, EvidenceConfig};
use tether_common_log::spans::{batch_span, instrument_future};
use tether_llm::{extract_json, LlmProvider, LlmResponse};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Confidence used when the oracle omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Characters of checker output kept in a rationale.
const OUTPUT_TAIL_CHARS: usize = 400;

/// Decides verdicts for a batch of claims from an evidence context.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    fn kind(&self) -> AdjudicatorKind;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Verdicts for some or all of `claims`. Claims left out are treated as inconclusive.
    async fn adjudicate(
        &self,
        claims: &[&Claim],
        context: &EvidenceContext,
    ) -> Result<Vec<Verdict>>;
}

/// The generative service acting as an approximate oracle.
pub struct OracleAdjudicator {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl OracleAdjudicator {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }
}

#[async_trait]
impl Adjudicator for OracleAdjudicator {
    fn kind(&self) -> AdjudicatorKind {
        AdjudicatorKind::ApproximateOracle
    }

    fn name(&self) -> &str {
        "oracle"
    }

    async fn adjudicate(
        &self,
        claims: &[&Claim],
        context: &EvidenceContext,
    ) -> Result<Vec<Verdict>> {
        let request = service::request(prompts::adjudicate_prompt(claims, context));
        let items = service::complete_parsed(
            self.provider.as_ref(),
            &self.retry,
            request,
            parse_verdict_items,
        )
        .await
        .map_err(|exhausted| LoopError::AssignerTimeout {
            attempts: exhausted.attempts,
            message: exhausted.last.to_string(),
        })?;

        Ok(interpret_oracle_verdicts(claims, context, &items))
    }
}

fn parse_verdict_items(response: &LlmResponse) -> std::result::Result<Vec<Value>, String> {
    let json = extract_json(&response.content).ok_or_else(|| {
        if response.is_truncated() {
            "adjudication output truncated".to_string()
        } else {
            "no JSON array in adjudication output".to_string()
        }
    })?;
    match serde_json::from_str(json).map_err(|e| format!("invalid adjudication JSON: {}", e))? {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("verdicts") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err("adjudication output has no verdict array".to_string()),
        },
        _ => Err("adjudication output is not a JSON array".to_string()),
    }
}

/// Confidence as a fraction; values above 1 are read as percentages.
fn as_confidence(value: Option<&Value>) -> Option<f64> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    Some(if raw > 1.0 { raw / 100.0 } else { raw })
}

fn as_line(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().trim_start_matches(['L', 'l']).parse().ok(),
        _ => None,
    }
}

/// Turn raw oracle items into verdicts, keeping only what the context supports.
fn interpret_oracle_verdicts(
    claims: &[&Claim],
    context: &EvidenceContext,
    items: &[Value],
) -> Vec<Verdict> {
    let batch: HashSet<&str> = claims.iter().map(|c| c.id.as_str()).collect();
    let mut decided: HashMap<String, Verdict> = HashMap::new();

    for item in items {
        let raw_id = item
            .get("claim_id")
            .or_else(|| item.get("claimId"))
            .or_else(|| item.get("id"))
            .and_then(Value::as_str);
        let Some(raw_id) = raw_id else {
            debug!("oracle verdict without claim id ignored");
            continue;
        };
        let raw_id = raw_id.trim();
        if !batch.contains(raw_id) {
            debug!(claim = raw_id, "oracle verdict for unknown claim ignored");
            continue;
        }
        if decided.contains_key(raw_id) {
            debug!(claim = raw_id, "duplicate oracle verdict ignored");
            continue;
        }
        let state = item
            .get("state")
            .or_else(|| item.get("verdict"))
            .and_then(Value::as_str)
            .and_then(VerdictState::parse);
        let Some(state) = state else {
            warn!(claim = raw_id, "oracle verdict with unrecognised state ignored");
            continue;
        };
        let Ok(claim_id) = ClaimId::parse(raw_id) else { continue };

        let mut confidence = as_confidence(item.get("confidence")).unwrap_or(DEFAULT_CONFIDENCE);
        let rationale = item
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();

        let mut evidence = None;
        if state != VerdictState::NotApplicable {
            if let Some(raw) = item.get("evidence").filter(|e| e.is_object()) {
                let file = raw
                    .get("file")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .trim_start_matches("./");
                if context.contains(file) {
                    let start = as_line(raw.get("start_line"));
                    let end = as_line(raw.get("end_line")).or(start);
                    let range = start.zip(end).map(|(s, e)| LineRange::new(s, e));
                    let mut snippet = raw
                        .get("snippet")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    if snippet.trim().is_empty() {
                        snippet = range.and_then(|r| context.excerpt(file, r)).unwrap_or_default();
                    }
                    evidence = Some(Evidence::new(file, range, snippet));
                } else if !file.is_empty() {
                    warn!(claim = raw_id, file, "oracle cited a file outside the evidence context");
                    confidence /= 2.0;
                }
            }
        }

        let mut verdict = Verdict::decided(
            claim_id,
            state,
            confidence,
            rationale,
            AdjudicatorKind::ApproximateOracle,
        );
        verdict.evidence = evidence;
        decided.insert(raw_id.to_string(), verdict);
    }

    claims
        .iter()
        .map(|claim| {
            decided.remove(claim.id.as_str()).unwrap_or_else(|| {
                warn!(claim = %claim.id, "oracle response omitted claim");
                Verdict::inconclusive(claim.id.clone(), "oracle response omitted the claim")
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
enum CommandOutcome {
    Passed(String),
    Failed(String),
    Inconclusive(String),
}

fn tail(text: &str) -> String {
    let chars: Vec<char> = text.trim().chars().collect();
    let start = chars.len().saturating_sub(OUTPUT_TAIL_CHARS);
    chars[start..].iter().collect()
}

/// Deterministic checker that runs a command; exit status decides.
///
/// Arguments may contain `{claim_id}` and `{claim_text}`. Identical
/// invocations within a batch run once.
pub struct CommandChecker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandChecker {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn args_for(&self, claim: &Claim) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{claim_id}", claim.id.as_str())
                    .replace("{claim_text}", &claim.text)
            })
            .collect()
    }

    async fn run(&self, args: &[String]) -> CommandOutcome {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let rendered = std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        match with_timeout(self.timeout, command.output()).await {
            Err(_) => CommandOutcome::Inconclusive(format!(
                "`{}` timed out after {}s",
                rendered,
                self.timeout.as_secs()
            )),
            Ok(Err(e)) => {
                CommandOutcome::Inconclusive(format!("`{}` could not be started: {}", rendered, e))
            }
            Ok(Ok(output)) if output.status.success() => {
                CommandOutcome::Passed(format!("`{}` exited successfully", rendered))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = if stderr.trim().is_empty() {
                    tail(&stdout)
                } else {
                    tail(&stderr)
                };
                CommandOutcome::Failed(format!(
                    "`{}` exited with {}: {}",
                    rendered, output.status, detail
                ))
            }
        }
    }
}

#[async_trait]
impl Adjudicator for CommandChecker {
    fn kind(&self) -> AdjudicatorKind {
        AdjudicatorKind::DeterministicChecker
    }

    fn name(&self) -> &str {
        &self.program
    }

    async fn adjudicate(
        &self,
        claims: &[&Claim],
        _context: &EvidenceContext,
    ) -> Result<Vec<Verdict>> {
        let mut outcomes: HashMap<Vec<String>, CommandOutcome> = HashMap::new();
        let mut verdicts = Vec::with_capacity(claims.len());

        for claim in claims {
            let args = self.args_for(claim);
            let outcome = match outcomes.get(&args) {
                Some(outcome) => outcome.clone(),
                None => {
                    let outcome = self.run(&args).await;
                    debug!(
                        program = %self.program,
                        claim = %claim.id,
                        outcome = ?outcome,
                        "checker ran"
                    );
                    outcomes.insert(args, outcome.clone());
                    outcome
                }
            };

            let verdict = match outcome {
                CommandOutcome::Passed(rationale) => Verdict::decided(
                    claim.id.clone(),
                    VerdictState::Pass,
                    1.0,
                    rationale,
                    self.kind(),
                ),
                CommandOutcome::Failed(rationale) => Verdict::decided(
                    claim.id.clone(),
                    VerdictState::Fail,
                    1.0,
                    rationale,
                    self.kind(),
                ),
                CommandOutcome::Inconclusive(rationale) => {
                    warn!(claim = %claim.id, "{}", rationale);
                    Verdict::inconclusive(claim.id.clone(), rationale).with_adjudicator(self.kind())
                }
            };
            verdicts.push(verdict);
        }

        Ok(verdicts)
    }
}

/// Deterministic static check: a regular expression searched in the candidate files.
pub struct PatternChecker {
    pattern: Regex,
}

impl PatternChecker {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    fn find(&self, context: &EvidenceContext) -> Option<Evidence> {
        context.files().iter().find_map(|file| {
            let found = self.pattern.find(&file.content)?;
            let start = file.content[..found.start()].matches('\n').count() as u32 + 1;
            let end = start + found.as_str().matches('\n').count() as u32;
            let range = LineRange::new(start, end);
            let snippet = context
                .excerpt(&file.path, range)
                .unwrap_or_else(|| found.as_str().to_string());
            Some(Evidence::new(file.path.clone(), Some(range), snippet))
        })
    }
}

#[async_trait]
impl Adjudicator for PatternChecker {
    fn kind(&self) -> AdjudicatorKind {
        AdjudicatorKind::DeterministicChecker
    }

    fn name(&self) -> &str {
        self.pattern.as_str()
    }

    async fn adjudicate(
        &self,
        claims: &[&Claim],
        context: &EvidenceContext,
    ) -> Result<Vec<Verdict>> {
        let found = self.find(context);
        Ok(claims
            .iter()
            .map(|claim| match &found {
                Some(evidence) => Verdict::decided(
                    claim.id.clone(),
                    VerdictState::Pass,
                    1.0,
                    format!("pattern `{}` found at {}", self.pattern, evidence.location()),
                    self.kind(),
                )
                .with_evidence(evidence.clone()),
                None => Verdict::decided(
                    claim.id.clone(),
                    VerdictState::Fail,
                    1.0,
                    format!(
                        "pattern `{}` not found in {} candidate file(s)",
                        self.pattern,
                        context.files().len()
                    ),
                    self.kind(),
                ),
            })
            .collect())
    }
}

/// Maps claim categories to adjudicators; unrouted categories go to the oracle.
pub struct AdjudicationRouter {
    oracle: Arc<dyn Adjudicator>,
    routes: Vec<(Category, Arc<dyn Adjudicator>)>,
}

impl AdjudicationRouter {
    pub fn new(oracle: Arc<dyn Adjudicator>) -> Self {
        Self {
            oracle,
            routes: Vec::new(),
        }
    }

    /// Route `category` to `checker`. A later route for the same category replaces the earlier one.
    pub fn with_route(mut self, category: Category, checker: Arc<dyn Adjudicator>) -> Self {
        self.routes.retain(|(routed, _)| *routed != category);
        self.routes.push((category, checker));
        self
    }

    /// Build the router from `assignment.routes`.
    pub fn from_config(
        oracle: Arc<dyn Adjudicator>,
        config: &AssignmentConfig,
        working_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut router = Self::new(oracle);
        for route in &config.routes {
            let category = Category::parse(&route.category).ok_or_else(|| {
                LoopError::Config(format!(
                    "unknown category in checker route: {}",
                    route.category
                ))
            })?;

            let checker: Arc<dyn Adjudicator> = match &route.checker {
                CheckerSpec::Command {
                    program,
                    args,
                    timeout_secs,
                } => {
                    if program.trim().is_empty() {
                        return Err(LoopError::Config(format!(
                            "empty command for category {}",
                            category
                        )));
                    }
                    let timeout = Duration::from_secs(*timeout_secs);
                    let mut checker = CommandChecker::new(program, args.clone(), timeout);
                    if let Some(dir) = &working_dir {
                        checker = checker.with_working_dir(dir);
                    }
                    Arc::new(checker)
                }
                CheckerSpec::Pattern { pattern } => {
                    let regex = Regex::new(pattern).map_err(|e| {
                        LoopError::Config(format!(
                            "invalid pattern for category {}: {}",
                            category, e
                        ))
                    })?;
                    Arc::new(PatternChecker::new(regex))
                }
            };
            info!(
                category = %category,
                checker = checker.name(),
                "routing category to deterministic checker"
            );
            router = router.with_route(category, checker);
        }
        Ok(router)
    }

    /// Index of the adjudicator for `category`: 0 is the oracle.
    fn slot(&self, category: Category) -> usize {
        self.routes
            .iter()
            .position(|(routed, _)| *routed == category)
            .map_or(0, |i| i + 1)
    }

    fn adjudicator(&self, slot: usize) -> &Arc<dyn Adjudicator> {
        match slot {
            0 => &self.oracle,
            n => &self.routes[n - 1].1,
        }
    }

    pub fn route(&self, category: Category) -> &Arc<dyn Adjudicator> {
        self.adjudicator(self.slot(category))
    }
}

/// A second verdict was offered for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("claim {0} already has a verdict")]
pub struct DuplicateVerdict(pub ClaimId);

/// Append-only verdict aggregation keyed by claim id.
#[derive(Debug, Default)]
pub struct VerdictLedger {
    entries: BTreeMap<ClaimId, Verdict>,
}

impl VerdictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, verdict: Verdict) -> std::result::Result<(), DuplicateVerdict> {
        if self.entries.contains_key(&verdict.claim_id) {
            return Err(DuplicateVerdict(verdict.claim_id));
        }
        self.entries.insert(verdict.claim_id.clone(), verdict);
        Ok(())
    }

    pub fn contains(&self, claim: &ClaimId) -> bool {
        self.entries.contains_key(claim)
    }

    pub fn get(&self, claim: &ClaimId) -> Option<&Verdict> {
        self.entries.get(claim)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verdicts in `claims` order; claims without one get an inconclusive verdict.
    pub fn into_ordered(mut self, claims: &[Claim]) -> Vec<Verdict> {
        claims
            .iter()
            .map(|claim| {
                self.entries.remove(&claim.id).unwrap_or_else(|| {
                    Verdict::inconclusive(claim.id.clone(), "no verdict was produced")
                })
            })
            .collect()
    }
}

/// Output of one assignment pass.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    /// One verdict per claim, in claim order.
    pub verdicts: Vec<Verdict>,
    pub warnings: Vec<String>,
}

struct Batch<'a> {
    slot: usize,
    claims: Vec<&'a Claim>,
    /// Union of the claims' candidate files, in claim order.
    paths: Vec<String>,
}

impl<'a> Batch<'a> {
    fn new(slot: usize, claims: Vec<&'a Claim>, located: &Located) -> Self {
        let mut paths: Vec<String> = Vec::new();
        for claim in &claims {
            if let Some(result) = located.get(&claim.id) {
                for path in result.candidates() {
                    if !paths.contains(path) {
                        paths.push(path.clone());
                    }
                }
            }
        }
        Self { slot, claims, paths }
    }
}

/// Batches claims, assembles evidence and collects exactly one verdict per claim.
pub struct VerdictAssigner {
    router: AdjudicationRouter,
    snapshot: Arc<dyn CodebaseSnapshot>,
    batch_size: usize,
    per_file_chars: usize,
    total_chars: usize,
    max_in_flight: usize,
}

impl VerdictAssigner {
    pub fn new(
        router: AdjudicationRouter,
        snapshot: Arc<dyn CodebaseSnapshot>,
        assignment: &AssignmentConfig,
        evidence: &EvidenceConfig,
        max_in_flight: usize,
    ) -> Self {
        Self {
            router,
            snapshot,
            batch_size: assignment.batch_size.max(1),
            per_file_chars: evidence.per_file_chars,
            total_chars: evidence.total_chars,
            max_in_flight,
        }
    }

    pub async fn assign(
        &self,
        claims: &[Claim],
        located: &Located,
        cancel: &CancelHandle,
    ) -> Result<Assignment> {
        let mut ledger = VerdictLedger::new();
        let mut warnings = Vec::new();
        let mut pending: BTreeMap<usize, Vec<&Claim>> = BTreeMap::new();

        for claim in claims {
            let settled = match located.get(&claim.id) {
                None => Some(Verdict::inconclusive(
                    claim.id.clone(),
                    "claim was not located",
                )),
                Some(LocatorResult::Inconclusive(reason)) => Some(Verdict::inconclusive(
                    claim.id.clone(),
                    format!("evidence location failed: {}", reason),
                )),
                Some(LocatorResult::Candidates(paths)) if paths.is_empty() => {
                    Some(Verdict::not_applicable(
                        claim.id.clone(),
                        NaReason::NoEvidence,
                        "no candidate files were located",
                    ))
                }
                Some(LocatorResult::Candidates(_)) if !claim.testable => {
                    Some(Verdict::not_applicable(
                        claim.id.clone(),
                        NaReason::NotStaticallyVerifiable,
                        "claim has no code correlate",
                    ))
                }
                Some(LocatorResult::Candidates(_)) => None,
            };
            match settled {
                Some(verdict) => {
                    if ledger.record(verdict).is_err() {
                        debug!(claim = %claim.id, "duplicate claim skipped");
                    }
                }
                None => pending
                    .entry(self.router.slot(claim.category))
                    .or_default()
                    .push(claim),
            }
        }

        let batches: Vec<Batch<'_>> = pending
            .into_iter()
            .flat_map(|(slot, group)| {
                group
                    .chunks(self.batch_size)
                    .map(|chunk| Batch::new(slot, chunk.to_vec(), located))
                    .collect::<Vec<_>>()
            })
            .collect();
        info!(
            claims = claims.len(),
            settled = ledger.len(),
            batches = batches.len(),
            "assigning verdicts"
        );

        let work = batches.iter().enumerate().map(|(index, batch)| {
            let span = batch_span("assign", index, batch.claims.len());
            until_cancelled(cancel, instrument_future(self.run_batch(batch), span))
        });

        for (batch, outcome) in batches.iter().zip(run_bounded(self.max_in_flight, work).await) {
            let (verdicts, batch_warnings) = outcome?;
            warnings.extend(batch_warnings);

            let expected: HashSet<&ClaimId> = batch.claims.iter().map(|c| &c.id).collect();
            for verdict in verdicts {
                if !expected.contains(&verdict.claim_id) {
                    debug!(claim = %verdict.claim_id, "verdict outside its batch ignored");
                    continue;
                }
                if let Err(duplicate) = ledger.record(verdict) {
                    debug!(error = %duplicate, "duplicate verdict ignored");
                }
            }
            for claim in &batch.claims {
                if !ledger.contains(&claim.id) {
                    let _ = ledger.record(Verdict::inconclusive(
                        claim.id.clone(),
                        "adjudicator returned no verdict",
                    ));
                }
            }
        }

        let verdicts = ledger.into_ordered(claims);
        let inconclusive = verdicts.iter().filter(|v| v.is_inconclusive()).count();
        if inconclusive > 0 {
            warn!(inconclusive, "claims degraded to inconclusive");
        }
        Ok(Assignment { verdicts, warnings })
    }

    async fn run_batch(&self, batch: &Batch<'_>) -> (Vec<Verdict>, Vec<String>) {
        let context = EvidenceContext::assemble(
            self.snapshot.as_ref(),
            &batch.paths,
            self.per_file_chars,
            self.total_chars,
        );
        let mut warnings: Vec<String> = context.warnings().to_vec();
        let adjudicator = self.router.adjudicator(batch.slot);

        match adjudicator.adjudicate(&batch.claims, &context).await {
            Ok(verdicts) => (verdicts, warnings),
            Err(error) => {
                warn!(
                    adjudicator = adjudicator.name(),
                    claims = batch.claims.len(),
                    error = %error,
                    "batch degraded to inconclusive"
                );
                warnings.push(format!(
                    "assign: {} claim(s) inconclusive: {}",
                    batch.claims.len(),
                    error
                ));
                let verdicts = batch
                    .claims
                    .iter()
                    .map(|claim| {
                        Verdict::inconclusive(claim.id.clone(), error.to_string())
                            .with_adjudicator(adjudicator.kind())
                    })
                    .collect();
                (verdicts, warnings)
            }
        }
    }
}

/// Fraction of claims whose verdict state is identical across every run.
///
/// `None` with fewer than two runs or no claims. A claim missing from any run
/// counts as disagreement.
pub fn agreement_rate(runs: &[Vec<Verdict>]) -> Option<f64> {
    if runs.len() < 2 {
        return None;
    }
    let by_claim: Vec<HashMap<&ClaimId, VerdictState>> = runs
        .iter()
        .map(|run| run.iter().map(|v| (&v.claim_id, v.state)).collect())
        .collect();
    let claims: HashSet<&ClaimId> = by_claim
        .iter()
        .flat_map(|run| run.keys().copied())
        .collect();
    if claims.is_empty() {
        return None;
    }

    let unanimous = claims
        .iter()
        .filter(|id| {
            let first = by_claim[0].get(*id);
            first.is_some() && by_claim.iter().all(|run| run.get(*id) == first)
        })
        .count();
    Some(unanimous as f64 / claims.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::markers;
    use crate::snapshot::MemorySnapshot;
    use serde_json::json;
    use tether_claims::Severity;
    use tether_common_config::CheckerRoute;
    use tether_test_utils::{Reply, ScriptedProvider};
    use test_case::test_case;

    fn claim(category: Category, text: &str) -> Claim {
        Claim::new("Section", category, Severity::High, text, true)
    }

    const AUTH_RS: &str = "use argon2::Argon2;

pub fn hash(p: &str) -> String {
    Argon2::default().hash(p)
}
";

    fn snapshot() -> Arc<MemorySnapshot> {
        Arc::new(
            MemorySnapshot::new()
                .with_file("src/auth.rs", AUTH_RS)
                .with_file("LICENSE", "MIT License\n"),
        )
    }

    fn oracle(provider: ScriptedProvider) -> Arc<dyn Adjudicator> {
        Arc::new(OracleAdjudicator::new(Arc::new(provider), fast_retry()))
    }

    fn pattern_route(category: &str, pattern: &str) -> AssignmentConfig {
        AssignmentConfig {
            batch_size: 15,
            routes: vec![CheckerRoute {
                category: category.to_string(),
                checker: CheckerSpec::Pattern {
                    pattern: pattern.to_string(),
                },
            }],
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn located(entries: &[(&Claim, LocatorResult)]) -> Located {
        entries.iter().map(|(c, r)| (c.id.clone(), r.clone())).collect()
    }

    fn candidates(paths: &[&str]) -> LocatorResult {
        LocatorResult::Candidates(paths.iter().map(|p| p.to_string()).collect())
    }

    fn assigner(provider: ScriptedProvider, routes: AssignmentConfig) -> VerdictAssigner {
        let router = AdjudicationRouter::from_config(oracle(provider), &routes, None).unwrap();
        VerdictAssigner::new(router, snapshot(), &routes, &EvidenceConfig::default(), 2)
    }

    #[test]
    fn test_interpret_tolerates_noise() {
        let hashed = claim(Category::Security, "Passwords are hashed with argon2.");
        let salted = claim(Category::Security, "Passwords are salted.");
        let ghost = ClaimId::from_text("not in batch");
        let paths = ["src/auth.rs".to_string()];
        let context = EvidenceContext::assemble(snapshot().as_ref(), &paths, 1000, 1000);

        let items: Vec<Value> = serde_json::from_str(&format!(
            r#"[
                {{"claim_id": "{hashed}", "state": "pass", "confidence": 0.9,
                  "rationale": "uses argon2",
                  "evidence": {{"file": "src/auth.rs", "start_line": 3, "end_line": 4}}}},
                {{"claim_id": "{hashed}", "state": "FAIL", "confidence": 0.1}},
                {{"claim_id": "{ghost}", "state": "PASS"}},
                {{"claim_id": "{salted}", "state": "Partial", "confidence": "80%",
                  "evidence": {{"file": "src/imaginary.rs", "start_line": 1}}}}
            ]"#,
            hashed = hashed.id,
            ghost = ghost,
            salted = salted.id
        ))
        .unwrap();

        let verdicts = interpret_oracle_verdicts(&[&hashed, &salted], &context, &items);
        assert_eq!(verdicts.len(), 2);

        assert_eq!(verdicts[0].state, VerdictState::Pass);
        let evidence = verdicts[0].evidence.as_ref().unwrap();
        assert_eq!(evidence.location(), "src/auth.rs:L3-L4");
        assert!(evidence.snippet.contains("pub fn hash"));

        assert_eq!(verdicts[1].state, VerdictState::Partial);
        assert!(verdicts[1].evidence.is_none());
        assert!((verdicts[1].confidence - 0.4).abs() < 1e-9);
    }

    #[test_case(json!(0.85) => Some(0.85) ; "fraction")]
    #[test_case(json!(85) => Some(0.85) ; "integer percent")]
    #[test_case(json!(72.5) => Some(0.725) ; "float percent")]
    #[test_case(json!("85%") => Some(0.85) ; "percent string")]
    #[test_case(json!("0.3") => Some(0.3) ; "fraction string")]
    #[test_case(json!(1) => Some(1.0) ; "certain")]
    #[test_case(json!("high") => None ; "word")]
    fn test_confidence_scale(value: Value) -> Option<f64> {
        as_confidence(Some(&value)).map(|c| (c * 1000.0).round() / 1000.0)
    }

    #[test]
    fn test_interpret_marks_omitted_claims_inconclusive() {
        let hashed = claim(Category::Security, "Passwords are hashed with argon2.");
        let verdicts = interpret_oracle_verdicts(&[&hashed], &EvidenceContext::default(), &[]);
        assert!(verdicts[0].is_inconclusive());
    }

    #[tokio::test]
    async fn test_assign_settles_unlocated_claims_without_oracle() {
        let hashed = claim(Category::Security, "Passwords are hashed with argon2.");
        let untracked = claim(Category::Functionality, "Widgets can be exported.");
        let failed = claim(Category::Operational, "The service restarts on crash.");
        let claims = vec![hashed.clone(), untracked.clone(), failed.clone()];
        let located = located(&[
            (&hashed, candidates(&["src/auth.rs"])),
            (&untracked, candidates(&[])),
            (&failed, LocatorResult::Inconclusive("timeout".to_string())),
        ]);

        let response = format!(
            r#"[{{"claim_id": "{}", "state": "PASS", "confidence": 0.8, "rationale": "ok"}}]"#,
            hashed.id
        );
        let provider = ScriptedProvider::new().on(markers::ADJUDICATE, response);
        let assignment = assigner(provider, AssignmentConfig::default())
            .assign(&claims, &located, &CancelHandle::new())
            .await
            .unwrap();

        let states: Vec<_> = assignment.verdicts.iter().map(|v| (v.state, v.na_reason)).collect();
        assert_eq!(
            states,
            vec![
                (VerdictState::Pass, None),
                (VerdictState::NotApplicable, Some(NaReason::NoEvidence)),
                (VerdictState::NotApplicable, Some(NaReason::Inconclusive)),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_oracle_degrades_batch() {
        let hashed = claim(Category::Security, "Passwords are hashed with argon2.");
        let claims = vec![hashed.clone()];
        let located = located(&[(&hashed, candidates(&["src/auth.rs"]))]);
        let provider =
            ScriptedProvider::new().on_replies(markers::ADJUDICATE, vec![Reply::RateLimited]);

        let assignment = assigner(provider, AssignmentConfig::default())
            .assign(&claims, &located, &CancelHandle::new())
            .await
            .unwrap();

        assert!(assignment.verdicts[0].is_inconclusive());
        assert!(assignment.warnings.iter().any(|w| w.contains("inconclusive")));
    }

    #[tokio::test]
    async fn test_pattern_route_bypasses_oracle() {
        let license = claim(Category::Legal, "The service is offered under the MIT license.");
        let claims = vec![license.clone()];
        let located = located(&[(&license, candidates(&["LICENSE"]))]);
        let routes = pattern_route("legal", "MIT License");

        let assignment = assigner(ScriptedProvider::new(), routes)
            .assign(&claims, &located, &CancelHandle::new())
            .await
            .unwrap();

        let verdict = &assignment.verdicts[0];
        assert_eq!(verdict.state, VerdictState::Pass);
        assert_eq!(verdict.adjudicator, AdjudicatorKind::DeterministicChecker);
        assert_eq!(verdict.evidence.as_ref().unwrap().location(), "LICENSE:L1");
    }

    #[test]
    fn test_router_rejects_bad_routes() {
        let oracle = oracle(ScriptedProvider::new());

        let unknown = pattern_route("ux", "x");
        assert!(matches!(
            AdjudicationRouter::from_config(oracle.clone(), &unknown, None),
            Err(LoopError::Config(_))
        ));

        let bad_regex = pattern_route("security", "(");
        assert!(matches!(
            AdjudicationRouter::from_config(oracle, &bad_regex, None),
            Err(LoopError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_checker_exit_status() {
        let pass = claim(Category::Operational, "Health checks succeed.");
        let context = EvidenceContext::default();

        let ok = CommandChecker::new("true", Vec::new(), Duration::from_secs(10));
        assert_eq!(ok.adjudicate(&[&pass], &context).await.unwrap()[0].state, VerdictState::Pass);

        let script = vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()];
        let failing = CommandChecker::new("sh", script, Duration::from_secs(10));
        let verdict = &failing.adjudicate(&[&pass], &context).await.unwrap()[0];
        assert_eq!(verdict.state, VerdictState::Fail);
        assert!(verdict.rationale.contains("broken"));

        let missing = CommandChecker::new(
            "definitely-not-a-real-binary-xyz",
            Vec::new(),
            Duration::from_secs(10),
        );
        assert!(missing.adjudicate(&[&pass], &context).await.unwrap()[0].is_inconclusive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_checker_timeout_is_inconclusive() {
        let slow = claim(Category::Operational, "The job finishes.");
        let checker =
            CommandChecker::new("sleep", vec!["5".to_string()], Duration::from_millis(50));
        let verdicts = checker
            .adjudicate(&[&slow], &EvidenceContext::default())
            .await
            .unwrap();
        assert!(verdicts[0].is_inconclusive());
        assert_eq!(verdicts[0].adjudicator, AdjudicatorKind::DeterministicChecker);
    }

    #[test]
    fn test_ledger_rejects_second_verdict() {
        let id = ClaimId::from_text("a claim");
        let mut ledger = VerdictLedger::new();
        ledger.record(Verdict::inconclusive(id.clone(), "first")).unwrap();
        let err = ledger.record(Verdict::inconclusive(id.clone(), "second")).unwrap_err();
        assert_eq!(err, DuplicateVerdict(id.clone()));
        assert_eq!(ledger.get(&id).unwrap().rationale, "first");
    }

    #[test]
    fn test_agreement_rate() {
        let a = ClaimId::from_text("a claim");
        let b = ClaimId::from_text("b claim");
        let verdict = |id: &ClaimId, state| {
            Verdict::decided(id.clone(), state, 1.0, "", AdjudicatorKind::ApproximateOracle)
        };
        let pass = |id: &ClaimId| verdict(id, VerdictState::Pass);
        let fail = |id: &ClaimId| verdict(id, VerdictState::Fail);
        let both_pass = vec![pass(&a), pass(&b)];

        assert_eq!(agreement_rate(&[vec![pass(&a)]]), None);
        assert_eq!(agreement_rate(&[both_pass.clone(), both_pass.clone()]), Some(1.0));
        assert_eq!(agreement_rate(&[both_pass.clone(), vec![pass(&a), fail(&b)]]), Some(0.5));
        assert_eq!(agreement_rate(&[both_pass, vec![pass(&a)]]), Some(0.5));
    }
}
