use tether_claims::IterationError;
use tether_store::StoreError;
use thiserror::Error;

/// Errors raised by the loop components.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Generation output could not be parsed into claims.
    #[error("malformed extraction output for chunk {chunk}: {message}")]
    ExtractionParse { chunk: usize, message: String },

    #[error("evidence location gave up after {attempts} attempt(s): {message}")]
    LocatorTimeout { attempts: u32, message: String },

    #[error("verdict assignment gave up after {attempts} attempt(s): {message}")]
    AssignerTimeout { attempts: u32, message: String },

    /// The iteration bundle could not be persisted; nothing was committed.
    #[error("failed to persist iteration: {0}")]
    PersistenceWrite(#[source] StoreError),

    #[error("iteration record is inconsistent: {0}")]
    InvalidIteration(#[from] IterationError),

    #[error("iteration index mismatch: store expects {expected}, pass computed {actual}")]
    IndexMismatch { expected: u32, actual: u32 },

    #[error("document generation timed out after {attempts} attempt(s)")]
    GenerationTimeout { attempts: u32 },

    #[error("pass was cancelled")]
    Cancelled,

    #[error("generation service error: {0}")]
    Llm(#[from] tether_llm::LlmError),

    #[error("codebase snapshot error: {0}")]
    Snapshot(#[from] crate::snapshot::SnapshotError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("build phase failed: {0}")]
    Build(String),

    #[error("invalid phase transition {from} -> {to}")]
    PhaseTransition {
        from: crate::orchestrator::Phase,
        to: crate::orchestrator::Phase,
    },
}

impl LoopError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopError::Cancelled)
    }
}

impl From<StoreError> for LoopError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Invalid(invalid) => LoopError::InvalidIteration(invalid),
            StoreError::AlreadyCommitted(index) => LoopError::IndexMismatch {
                expected: index + 1,
                actual: index,
            },
            StoreError::OutOfSequence { expected, actual } => {
                LoopError::IndexMismatch { expected, actual }
            }
            other => LoopError::PersistenceWrite(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoopError>;
