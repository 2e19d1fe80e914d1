use tether_claims::IterationError;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("iteration {0} is already committed")]
    AlreadyCommitted(u32),

    #[error("out of sequence commit: expected index {expected}, got {actual}")]
    OutOfSequence { expected: u32, actual: u32 },

    #[error("iteration {0} not found")]
    NotFound(u32),

    #[error("refusing to persist invalid iteration: {0}")]
    Invalid(#[from] IterationError),

    #[error("failed to write iteration {index}: {source}")]
    Write {
        index: u32,
        #[source]
        source: tether_common_core::Error,
    },

    #[error("failed to read iteration store: {0}")]
    Read(#[source] tether_common_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bundle {index} is corrupted: {reason}")]
    Corrupted { index: u32, reason: String },

    #[error("hash chain broken at iteration {index}")]
    BrokenChain { index: u32 },
}

impl StoreError {
    /// Whether the failure happened while writing a new bundle.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, StoreError::Write { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
