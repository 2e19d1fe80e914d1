//! Bundle manifests and the hash chain linking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tether_common_core::RunId;

/// Digest recorded as the predecessor of iteration 1.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Written last into every bundle; lists file digests and chains to the previous bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub index: u32,
    pub run_id: RunId,
    pub committed_at: DateTime<Utc>,
    /// File name to SHA-256 hex digest.
    pub files: BTreeMap<String, String>,
    pub bundle_hash: String,
    pub prev_hash: String,
    pub link_hash: String,
}

impl Manifest {
    pub fn new(
        index: u32,
        run_id: RunId,
        files: BTreeMap<String, String>,
        previous: Option<&Manifest>,
    ) -> Self {
        let bundle_hash = bundle_hash(&files);
        let prev_hash = previous
            .map(|p| p.link_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let link_hash = compute_link_hash(index, &bundle_hash, &prev_hash);

        Self {
            index,
            run_id,
            committed_at: Utc::now(),
            files,
            bundle_hash,
            prev_hash,
            link_hash,
        }
    }

    /// Verify this manifest's own hashes.
    pub fn verify(&self) -> bool {
        self.bundle_hash == bundle_hash(&self.files)
            && self.link_hash == compute_link_hash(self.index, &self.bundle_hash, &self.prev_hash)
    }

    /// Verify continuity with the previous manifest (or genesis for index 1).
    pub fn verify_chain(&self, previous: Option<&Manifest>) -> bool {
        match previous {
            Some(prev) => self.prev_hash == prev.link_hash && self.index == prev.index + 1,
            None => self.prev_hash == GENESIS_HASH && self.index == 1,
        }
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn bundle_hash(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, digest) in files {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

fn compute_link_hash(index: u32, bundle_hash: &str, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(bundle_hash.as_bytes());
    hasher.update(prev_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}
