//! Configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tether_common_async::RetryPolicy;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Generative service configuration.
    pub backend: BackendConfig,
    /// Claim extraction.
    pub extraction: ExtractionConfig,
    /// Evidence location and content budgets.
    pub evidence: EvidenceConfig,
    /// Verdict assignment.
    pub assignment: AssignmentConfig,
    /// Concurrency limits for remote calls.
    pub concurrency: ConcurrencyConfig,
    /// Timeout and retry budget for remote calls.
    pub retry: RetryConfig,
    /// Next-document generation.
    pub regeneration: RegenerationConfig,
    /// Iteration persistence.
    pub store: StoreConfig,
}

/// Supported generative service providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

/// Generative service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Which provider to talk to.
    pub provider: ProviderKind,
    /// Model name passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum output tokens per call.
    pub max_tokens: u32,
    /// Endpoint override (proxies, local gateways, tests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            base_url: None,
        }
    }
}

/// Claim extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum characters per extraction chunk.
    pub chunk_max_chars: usize,
    /// Split multi-sentence claims into atomic ones.
    pub split_compound: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_max_chars: 12_000,
            split_compound: true,
        }
    }
}

/// Which locator narrows the search space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    /// File-tree triage by the generative service.
    Oracle,
    /// Deterministic keyword ranking of paths.
    Keyword,
}

/// Evidence location and content budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Locator implementation.
    pub locator: LocatorKind,
    /// Candidate files kept per claim.
    pub max_candidates: usize,
    /// Claims per locator call.
    pub locator_batch_size: usize,
    /// Characters of a single file passed to the assigner.
    pub per_file_chars: usize,
    /// Characters of all files passed in one assigner batch.
    pub total_chars: usize,
    /// Glob patterns excluded from the codebase listing.
    pub exclude: Vec<String>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            locator: LocatorKind::Oracle,
            max_candidates: 5,
            locator_batch_size: 40,
            per_file_chars: 10_000,
            total_chars: 100_000,
            exclude: vec![
                "target/**".to_string(),
                ".git/**".to_string(),
                "node_modules/**".to_string(),
                ".tether/**".to_string(),
            ],
        }
    }
}

/// Verdict assignment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Claims per adjudication batch.
    pub batch_size: usize,
    /// Categories routed to deterministic checkers instead of the oracle.
    pub routes: Vec<CheckerRoute>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            routes: Vec::new(),
        }
    }
}

/// Route a claim category to a deterministic checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerRoute {
    /// Claim category name (`security`, `data-privacy`, ...).
    pub category: String,
    /// Checker to run for claims of that category.
    pub checker: CheckerSpec,
}

/// Deterministic checker definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckerSpec {
    /// Run a command in the codebase root; exit status decides.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_command_timeout")]
        timeout_secs: u64,
    },
    /// Search candidate files for a regular expression.
    Pattern { pattern: String },
}

fn default_command_timeout() -> u64 {
    600
}

/// Concurrency configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Remote calls in flight at once.
    pub max_in_flight: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}

/// Timeout and retry configuration for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// First backoff delay (ms).
    pub initial_backoff_ms: u64,
    /// Backoff ceiling (ms).
    pub max_backoff_ms: u64,
    /// Timeout per attempt (s).
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 120,
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// What the regenerator does with claims that failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Keep them, tagged `[aspirational]`.
    MarkAspirational,
    /// Remove them from the next document.
    Drop,
}

/// Regeneration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerationConfig {
    /// Character budget of the verified-state summary fed to generation.
    pub reality_context_chars: usize,
    /// Treatment of failed claims.
    pub fail_policy: FailPolicy,
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            reality_context_chars: 8_000,
            fail_policy: FailPolicy::MarkAspirational,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding committed iteration bundles.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".tether/iterations"),
        }
    }
}
