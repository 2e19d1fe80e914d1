//! Persistence for committed iterations.
//!
//! Every iteration is written once as a bundle addressed by its index. Stores
//! refuse to overwrite a committed index and only accept the next index in
//! sequence, so readers never observe partial or rewritten history.

mod error;
mod fs_store;
mod manifest;
mod memory;

pub use error::{Result, StoreError};
pub use fs_store::{FsIterationStore, BUNDLE_FILES};
pub use manifest::{hash_bytes, Manifest, GENESIS_HASH};
pub use memory::MemoryIterationStore;

use async_trait::async_trait;
use tether_claims::Iteration;

/// Append-only store of iteration bundles.
#[async_trait]
pub trait IterationStore: Send + Sync {
    /// Index the next commit must carry (1 for an empty store).
    async fn next_index(&self) -> Result<u32>;

    /// Persist a validated iteration atomically.
    async fn commit(&self, iteration: &Iteration) -> Result<()>;

    async fn load(&self, index: u32) -> Result<Iteration>;

    async fn latest(&self) -> Result<Option<Iteration>>;

    /// Committed indices in ascending order.
    async fn indices(&self) -> Result<Vec<u32>>;

    /// All committed iterations in ascending order.
    async fn history(&self) -> Result<Vec<Iteration>> {
        let mut history = Vec::new();
        for index in self.indices().await? {
            history.push(self.load(index).await?);
        }
        Ok(history)
    }
}

/// Shared admission check for a commit against the current next index.
pub(crate) fn check_sequence(iteration: &Iteration, expected: u32) -> Result<()> {
    iteration.validate()?;
    if iteration.index < expected {
        return Err(StoreError::AlreadyCommitted(iteration.index));
    }
    if iteration.index != expected {
        return Err(StoreError::OutOfSequence { expected, actual: iteration.index });
    }
    Ok(())
}
