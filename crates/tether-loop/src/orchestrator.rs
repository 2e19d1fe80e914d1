//! The iteration orchestrator.
//!
//! One call to [`Orchestrator::run_pass`] takes a document (or a loose
//! description to generate one from) through extraction, the external Build
//! hook, location, assignment, scoring and planning, commits the resulting
//! [`Iteration`] as a single atomic bundle, and then regenerates the next
//! document from the committed record. Iteration state is passed in and
//! returned explicitly; the orchestrator holds no current-iteration counter.

use crate::assigner::{AdjudicationRouter, Adjudicator, OracleAdjudicator, VerdictAssigner};
use crate::error::{LoopError, Result};
use crate::extractor::ClaimExtractor;
use crate::lineage::ClaimLineage;
use crate::locator::{KeywordLocator, Located, Locator, LocatorResult, OracleLocator};
use crate::planner::RemediationPlanner;
use crate::prompts;
use crate::readiness::ExitReadiness;
use crate::regenerator::{skeleton, Regeneration, Regenerator};
use crate::report::IterationReport;
use crate::scorer::score_verdicts;
use crate::service::{self, until_cancelled};
use crate::snapshot::{CodebaseSnapshot, FsSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tether_claims::{Claim, Iteration};
use tether_common_async::{AttemptError, CancelHandle};
use tether_common_config::{validate, LocatorKind, TetherConfig};
use tether_common_core::RunId;
use tether_common_log::spans::{instrument_future, iteration_span, phase_span, Timer};
use tether_llm::{LlmProvider, ProviderFactory};
use tether_store::{FsIterationStore, IterationStore};
use tracing::{debug, info, warn};

/// Orchestrator state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the operator's description or document.
    Describe,
    /// Free generation of the first document.
    Hallucinate,
    Extract,
    /// External implementation work.
    Build,
    Locate,
    Assign,
    Score,
    Plan,
    Persist,
    Regenerate,
    Committed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Describe => "describe",
            Phase::Hallucinate => "hallucinate",
            Phase::Extract => "extract",
            Phase::Build => "build",
            Phase::Locate => "locate",
            Phase::Assign => "assign",
            Phase::Score => "score",
            Phase::Plan => "plan",
            Phase::Persist => "persist",
            Phase::Regenerate => "regenerate",
            Phase::Committed => "committed",
        }
    }

    /// Whether `next` may follow this phase.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Describe, Hallucinate)
                | (Describe, Extract)
                | (Hallucinate, Extract)
                | (Extract, Build)
                | (Build, Locate)
                | (Locate, Assign)
                | (Assign, Score)
                | (Score, Plan)
                | (Plan, Persist)
                | (Persist, Regenerate)
                | (Regenerate, Committed)
                | (Committed, Describe)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and validates phase transitions within one pass.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: Phase,
    visited: Vec<Phase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self { current: Phase::Describe, visited: vec![Phase::Describe] }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// Phases entered so far, in order.
    pub fn visited(&self) -> &[Phase] {
        &self.visited
    }

    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if !self.current.can_advance_to(next) {
            return Err(LoopError::PhaseTransition { from: self.current, to: next });
        }
        info!(from = %self.current, to = %next, "phase transition");
        self.current = next;
        self.visited.push(next);
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure reported by a [`BuildPhase`].
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// Hook for the external Build step between extraction and verification.
#[async_trait]
pub trait BuildPhase: Send + Sync {
    async fn build(&self, index: u32, claims: &[Claim]) -> std::result::Result<(), BuildError>;
}

/// Build step that does nothing; the operator builds out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBuild;

#[async_trait]
impl BuildPhase for NoopBuild {
    async fn build(&self, _index: u32, _claims: &[Claim]) -> std::result::Result<(), BuildError> {
        Ok(())
    }
}

/// Where a pass starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassSource {
    /// A loose description; a document is generated from it first.
    Description(String),
    /// A specification document.
    Document(String),
}

/// Input to one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassInput {
    pub source: PassSource,
    /// Fresh guidance from the operator, recorded in the iteration and fed to regeneration.
    pub human_context: Option<String>,
}

impl PassInput {
    pub fn description(text: impl Into<String>) -> Self {
        Self { source: PassSource::Description(text.into()), human_context: None }
    }

    pub fn document(text: impl Into<String>) -> Self {
        Self { source: PassSource::Document(text.into()), human_context: None }
    }

    pub fn with_human_context(mut self, context: impl Into<String>) -> Self {
        self.human_context = Some(context.into());
        self
    }
}

/// Result of a committed pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// The committed iteration.
    pub iteration: Iteration,
    /// Input document for the next pass.
    pub next_document: String,
    pub regeneration_warnings: Vec<String>,
    pub used_fallback: bool,
    pub report: IterationReport,
    pub phases: Vec<Phase>,
}

/// Sequences the loop components and owns the commit boundary.
pub struct Orchestrator {
    config: TetherConfig,
    provider: Arc<dyn LlmProvider>,
    snapshot: Arc<dyn CodebaseSnapshot>,
    store: Arc<dyn IterationStore>,
    extractor: ClaimExtractor,
    locator: Arc<dyn Locator>,
    assigner: VerdictAssigner,
    planner: RemediationPlanner,
    regenerator: Regenerator,
    build: Arc<dyn BuildPhase>,
    cancel: CancelHandle,
}

impl Orchestrator {
    /// Wire the components from configuration.
    pub fn new(
        config: TetherConfig,
        provider: Arc<dyn LlmProvider>,
        snapshot: Arc<dyn CodebaseSnapshot>,
        store: Arc<dyn IterationStore>,
    ) -> Result<Self> {
        validate(&config).map_err(|e| LoopError::Config(e.to_string()))?;

        let retry = config.retry.policy();
        let max_in_flight = config.concurrency.max_in_flight;

        let extractor = ClaimExtractor::new(
            provider.clone(),
            config.extraction.clone(),
            retry.clone(),
            max_in_flight,
        );
        let locator: Arc<dyn Locator> = match config.evidence.locator {
            LocatorKind::Oracle => Arc::new(OracleLocator::new(
                provider.clone(),
                &config.evidence,
                retry.clone(),
                max_in_flight,
            )),
            LocatorKind::Keyword => Arc::new(KeywordLocator::new(config.evidence.max_candidates)),
        };
        let oracle: Arc<dyn Adjudicator> =
            Arc::new(OracleAdjudicator::new(provider.clone(), retry.clone()));
        let router = AdjudicationRouter::from_config(
            oracle,
            &config.assignment,
            snapshot.root().map(Path::to_path_buf),
        )?;
        let assigner = VerdictAssigner::new(
            router,
            snapshot.clone(),
            &config.assignment,
            &config.evidence,
            max_in_flight,
        );
        let regenerator = Regenerator::new(provider.clone(), retry, config.regeneration.clone());

        Ok(Self {
            config,
            provider,
            snapshot,
            store,
            extractor,
            locator,
            assigner,
            planner: RemediationPlanner::new(),
            regenerator,
            build: Arc::new(NoopBuild),
            cancel: CancelHandle::new(),
        })
    }

    /// Filesystem wiring: provider from `backend`, snapshot of `codebase_root`,
    /// store under `codebase_root / store.dir`.
    pub fn from_config(config: TetherConfig, codebase_root: &Path) -> Result<Self> {
        let provider = ProviderFactory::create(&config.backend)?;
        let snapshot = Arc::new(FsSnapshot::new(codebase_root, &config.evidence.exclude)?);
        let store = Arc::new(FsIterationStore::open(codebase_root.join(&config.store.dir))?);
        Self::new(config, provider, snapshot, store)
    }

    pub fn with_build_phase(mut self, build: Arc<dyn BuildPhase>) -> Self {
        self.build = build;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn Locator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replace the adjudication router, e.g. to register custom checkers.
    pub fn with_router(mut self, router: AdjudicationRouter) -> Self {
        self.assigner = VerdictAssigner::new(
            router,
            self.snapshot.clone(),
            &self.config.assignment,
            &self.config.evidence,
            self.config.concurrency.max_in_flight,
        );
        self
    }

    /// Handle for abandoning the in-flight pass.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<dyn IterationStore> {
        &self.store
    }

    /// Free generation of a first document from a loose description.
    pub async fn hallucinate(&self, description: &str) -> Result<String> {
        let request = service::request(prompts::generate_prompt(description));
        let response = until_cancelled(
            &self.cancel,
            service::complete(self.provider.as_ref(), &self.config.retry.policy(), request),
        )
        .await?
        .map_err(|exhausted| match exhausted.last {
            AttemptError::Failed(e) => LoopError::Llm(e),
            AttemptError::Timeout => LoopError::GenerationTimeout { attempts: exhausted.attempts },
        })?;

        if response.is_truncated() {
            warn!("generated document was truncated by the token limit");
        }
        info!(chars = response.content.chars().count(), "initial document generated");
        Ok(response.content)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("pass cancelled, nothing committed");
            return Err(LoopError::Cancelled);
        }
        Ok(())
    }

    /// Run one full pass and commit its iteration.
    ///
    /// `previous` must be the latest committed iteration (or `None` for the
    /// first pass); the new index is `previous.index + 1` and has to match the
    /// store.
    pub async fn run_pass(
        &self,
        previous: Option<&Iteration>,
        input: PassInput,
    ) -> Result<PassOutcome> {
        let index = previous.map_or(1, |p| p.index + 1);
        let expected = self.store.next_index().await?;
        if expected != index {
            return Err(LoopError::IndexMismatch { expected, actual: index });
        }

        let run_id = RunId::new();
        let span = iteration_span(&run_id.to_string(), index);
        instrument_future(self.run_pass_inner(run_id, index, previous, input), span).await
    }

    async fn run_pass_inner(
        &self,
        run_id: RunId,
        index: u32,
        previous: Option<&Iteration>,
        input: PassInput,
    ) -> Result<PassOutcome> {
        let timer = Timer::start("pass");
        let mut tracker = PhaseTracker::new();
        let mut warnings: Vec<String> = Vec::new();
        info!(index, "pass started");

        let document = match input.source {
            PassSource::Document(document) => document,
            PassSource::Description(description) => {
                tracker.advance(Phase::Hallucinate)?;
                instrument_future(self.hallucinate(&description), phase_span("hallucinate")).await?
            }
        };

        tracker.advance(Phase::Extract)?;
        let extraction = instrument_future(
            self.extractor.extract(&document, &self.cancel),
            phase_span("extract"),
        )
        .await?;
        warnings.extend(extraction.warnings);
        let mut claims = extraction.claims;
        if let Some(previous) = previous {
            let lineage = ClaimLineage::link(&previous.claims, &mut claims);
            debug!(
                carried = lineage.carried_count(),
                superseded = lineage.superseded_count(),
                "claims linked to previous iteration"
            );
        }
        self.checkpoint()?;

        tracker.advance(Phase::Build)?;
        instrument_future(self.build.build(index, &claims), phase_span("build"))
            .await
            .map_err(|e| LoopError::Build(e.to_string()))?;
        self.checkpoint()?;

        tracker.advance(Phase::Locate)?;
        let located =
            instrument_future(self.locate(&claims, &mut warnings), phase_span("locate")).await?;
        self.checkpoint()?;

        tracker.advance(Phase::Assign)?;
        let assignment = instrument_future(
            self.assigner.assign(&claims, &located, &self.cancel),
            phase_span("assign"),
        )
        .await?;
        warnings.extend(assignment.warnings);
        let verdicts = assignment.verdicts;
        self.checkpoint()?;

        tracker.advance(Phase::Score)?;
        let (tally, compliance_score) = score_verdicts(&verdicts);
        info!(
            score = %compliance_score,
            pass = tally.pass,
            partial = tally.partial,
            fail = tally.fail,
            na = tally.na,
            inconclusive = tally.inconclusive,
            "iteration scored"
        );

        tracker.advance(Phase::Plan)?;
        let remediation_tasks = self.planner.plan(&claims, &verdicts, &located);
        debug!(tasks = remediation_tasks.len(), "remediation planned");

        tracker.advance(Phase::Persist)?;
        let iteration = Iteration {
            index,
            run_id,
            claims,
            verdicts,
            compliance_score,
            tally,
            remediation_tasks,
            spec_document_text: document,
            human_context: input.human_context.clone(),
            warnings,
            timestamp: Utc::now(),
        };
        iteration.validate()?;
        self.checkpoint()?;
        instrument_future(self.store.commit(&iteration), phase_span("persist")).await?;
        info!(index, score = %iteration.compliance_score, "iteration committed");

        tracker.advance(Phase::Regenerate)?;
        let regeneration = instrument_future(
            self.regenerate(&iteration, input.human_context.as_deref()),
            phase_span("regenerate"),
        )
        .await;

        tracker.advance(Phase::Committed)?;
        let history = match self.store.history().await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "could not load history for exit readiness");
                previous.into_iter().cloned().chain(std::iter::once(iteration.clone())).collect()
            }
        };
        let report = IterationReport::from_iteration(&iteration)
            .with_readiness(ExitReadiness::from_history(&history));
        info!(index, duration_ms = timer.finish(), "pass finished");

        Ok(PassOutcome {
            iteration,
            next_document: regeneration.document,
            regeneration_warnings: regeneration.warnings,
            used_fallback: regeneration.used_fallback,
            report,
            phases: tracker.visited().to_vec(),
        })
    }

    /// Locate candidates, degrading every claim to inconclusive if the snapshot cannot be listed.
    async fn locate(&self, claims: &[Claim], warnings: &mut Vec<String>) -> Result<Located> {
        let paths = match self.snapshot.list_paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "codebase listing failed, claims degrade to inconclusive");
                warnings.push(format!("locate: codebase listing failed: {}", e));
                return Ok(claims
                    .iter()
                    .map(|c| {
                        let reason = format!("codebase listing failed: {}", e);
                        (c.id.clone(), LocatorResult::Inconclusive(reason))
                    })
                    .collect());
            }
        };

        let located = self.locator.locate(claims, &paths, &self.cancel).await?;
        let degraded = located.values().filter(|r| r.is_inconclusive()).count();
        if degraded > 0 {
            warnings.push(format!("locate: {} claim(s) could not be located", degraded));
        }
        Ok(located)
    }

    /// Regenerate after commit. The iteration is already durable, so a
    /// cancellation here falls back to the skeleton instead of failing the pass.
    async fn regenerate(&self, iteration: &Iteration, human_context: Option<&str>) -> Regeneration {
        let fail_policy = self.config.regeneration.fail_policy;
        let fallback = |reason: &str| Regeneration {
            document: skeleton(iteration, fail_policy),
            warnings: vec![format!("regenerate: {}, deterministic skeleton used", reason)],
            used_fallback: true,
        };

        if self.cancel.is_cancelled() {
            return fallback("cancelled after commit");
        }
        match self.regenerator.regenerate(iteration, human_context, &self.cancel).await {
            Ok(regeneration) => regeneration,
            Err(e) => {
                warn!(error = %e, "regeneration abandoned");
                fallback(&e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut tracker = PhaseTracker::new();
        for phase in [
            Phase::Hallucinate,
            Phase::Extract,
            Phase::Build,
            Phase::Locate,
            Phase::Assign,
            Phase::Score,
            Phase::Plan,
            Phase::Persist,
            Phase::Regenerate,
            Phase::Committed,
            Phase::Describe,
        ] {
            tracker.advance(phase).unwrap();
        }
        assert_eq!(tracker.visited().len(), 12);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(Phase::Assign).unwrap_err();
        assert!(matches!(
            err,
            LoopError::PhaseTransition { from: Phase::Describe, to: Phase::Assign }
        ));
        assert_eq!(tracker.current(), Phase::Describe);

        tracker.advance(Phase::Extract).unwrap();
        assert!(tracker.advance(Phase::Committed).is_err());
    }

    #[test]
    fn test_pass_input_builders() {
        let input = PassInput::description("a todo app").with_human_context("add sharing");
        assert_eq!(input.source, PassSource::Description("a todo app".to_string()));
        assert_eq!(input.human_context.as_deref(), Some("add sharing"));
    }
}
