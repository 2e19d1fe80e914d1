use crate::error::{Result, StoreError};
use crate::{check_sequence, IterationStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tether_claims::Iteration;

/// In-memory store with the same sequencing rules as [`crate::FsIterationStore`].
#[derive(Default)]
pub struct MemoryIterationStore {
    iterations: RwLock<BTreeMap<u32, Iteration>>,
}

impl MemoryIterationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.iterations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.read().is_empty()
    }
}

#[async_trait]
impl IterationStore for MemoryIterationStore {
    async fn next_index(&self) -> Result<u32> {
        Ok(self.iterations.read().keys().next_back().map_or(1, |last| last + 1))
    }

    async fn commit(&self, iteration: &Iteration) -> Result<()> {
        let mut iterations = self.iterations.write();
        let expected = iterations.keys().next_back().map_or(1, |last| last + 1);
        check_sequence(iteration, expected)?;
        iterations.insert(iteration.index, iteration.clone());
        Ok(())
    }

    async fn load(&self, index: u32) -> Result<Iteration> {
        self.iterations
            .read()
            .get(&index)
            .cloned()
            .ok_or(StoreError::NotFound(index))
    }

    async fn latest(&self) -> Result<Option<Iteration>> {
        Ok(self.iterations.read().values().next_back().cloned())
    }

    async fn indices(&self) -> Result<Vec<u32>> {
        Ok(self.iterations.read().keys().copied().collect())
    }
}
