use crate::error::{Result, StoreError};
use crate::manifest::{hash_bytes, Manifest};
use crate::{check_sequence, IterationStore};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tether_claims::{ComplianceScore, Iteration, VerdictTally};
use tether_common_core::{Error as CoreError, StagingId};
use tether_common_fs::{ensure_dir, rename_dir_no_clobber, write_string_atomic};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";
const RECORD_FILE: &str = "iteration.json";
const STAGING_PREFIX: &str = ".staging-";

/// Files written into every bundle, besides the manifest.
pub const BUNDLE_FILES: &[&str] = &[
    "claims.json",
    "verdicts.json",
    "score.json",
    "remediation.json",
    "spec.md",
    RECORD_FILE,
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreFile<'a> {
    compliance_score: &'a ComplianceScore,
    tally: &'a VerdictTally,
}

/// Directory-backed store: one `NNNN/` bundle per iteration.
///
/// Bundles are written into a staging directory and renamed into place, so a
/// crash mid-commit leaves at most an ignored staging directory behind.
pub struct FsIterationStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsIterationStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir(&root).map_err(StoreError::Read)?;
        let store = Self { root, write_lock: Mutex::new(()) };
        store.sweep_staging();
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("{:04}", index))
    }

    /// Verify every bundle's file digests and the manifest chain. Returns the chain length.
    pub async fn verify_chain(&self) -> Result<usize> {
        let indices = self.scan_indices()?;
        let mut previous: Option<Manifest> = None;

        for index in &indices {
            let manifest = self.read_manifest(*index)?;
            if !manifest.verify() || !manifest.verify_chain(previous.as_ref()) {
                return Err(StoreError::BrokenChain { index: *index });
            }
            self.verify_files(&manifest)?;
            previous = Some(manifest);
        }

        debug!(length = indices.len(), "hash chain verified");
        Ok(indices.len())
    }

    pub fn read_manifest(&self, index: u32) -> Result<Manifest> {
        let path = self.bundle_dir(index).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(StoreError::NotFound(index));
        }
        let text = read_file(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn scan_indices(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            StoreError::Read(CoreError::fs("failed to list store", &self.root, e))
        })?;

        let mut indices: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.len() >= 4 && name.bytes().all(|b| b.is_ascii_digit()) {
                    name.parse().ok()
                } else {
                    None
                }
            })
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    fn verify_files(&self, manifest: &Manifest) -> Result<()> {
        let dir = self.bundle_dir(manifest.index);
        for (name, digest) in &manifest.files {
            let bytes = fs::read(dir.join(name)).map_err(|_| StoreError::Corrupted {
                index: manifest.index,
                reason: format!("missing {}", name),
            })?;
            if &hash_bytes(&bytes) != digest {
                return Err(StoreError::Corrupted {
                    index: manifest.index,
                    reason: format!("digest mismatch for {}", name),
                });
            }
        }
        Ok(())
    }

    fn render_files(iteration: &Iteration) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("claims.json", serde_json::to_string_pretty(&iteration.claims)?),
            ("verdicts.json", serde_json::to_string_pretty(&iteration.verdicts)?),
            (
                "score.json",
                serde_json::to_string_pretty(&ScoreFile {
                    compliance_score: &iteration.compliance_score,
                    tally: &iteration.tally,
                })?,
            ),
            ("remediation.json", serde_json::to_string_pretty(&iteration.remediation_tasks)?),
            ("spec.md", iteration.spec_document_text.clone()),
            (RECORD_FILE, serde_json::to_string_pretty(iteration)?),
        ])
    }

    fn write_bundle(&self, iteration: &Iteration) -> std::result::Result<(), CoreError> {
        let staging = self.root.join(format!("{}{}", STAGING_PREFIX, StagingId::new()));
        let result = self.stage_and_publish(iteration, &staging);
        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(
                    path = %staging.display(),
                    error = %e,
                    "failed to clean up staging directory"
                );
            }
        }
        result
    }

    fn stage_and_publish(
        &self,
        iteration: &Iteration,
        staging: &Path,
    ) -> std::result::Result<(), CoreError> {
        ensure_dir(staging)?;

        let rendered = Self::render_files(iteration)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        let mut digests = BTreeMap::new();
        for (name, content) in &rendered {
            write_string_atomic(staging.join(name), content)?;
            digests.insert(name.to_string(), hash_bytes(content.as_bytes()));
        }

        let previous = match iteration.index {
            1 => None,
            index => Some(self.read_manifest(index - 1).map_err(|e| {
                CoreError::new(format!("previous manifest unreadable: {e}"))
            })?),
        };
        let manifest = Manifest::new(iteration.index, iteration.run_id, digests, previous.as_ref());
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        write_string_atomic(staging.join(MANIFEST_FILE), &manifest_json)?;

        rename_dir_no_clobber(staging, self.bundle_dir(iteration.index))
    }

    fn sweep_staging(&self) {
        let Ok(entries) = fs::read_dir(&self.root) else { return };
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                debug!(path = %entry.path().display(), "removing abandoned staging directory");
                let _ = fs::remove_dir_all(entry.path());
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| StoreError::Read(CoreError::fs("failed to read bundle file", path, e)))
}

#[async_trait]
impl IterationStore for FsIterationStore {
    async fn next_index(&self) -> Result<u32> {
        Ok(self.scan_indices()?.last().map_or(1, |last| last + 1))
    }

    async fn commit(&self, iteration: &Iteration) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let expected = self.scan_indices()?.last().map_or(1, |last| last + 1);
        check_sequence(iteration, expected)?;

        self.write_bundle(iteration)
            .map_err(|source| StoreError::Write { index: iteration.index, source })?;

        info!(
            index = iteration.index,
            run_id = %iteration.run_id,
            claims = iteration.claims.len(),
            score = %iteration.compliance_score,
            "iteration committed"
        );
        Ok(())
    }

    async fn load(&self, index: u32) -> Result<Iteration> {
        let manifest = self.read_manifest(index)?;
        self.verify_files(&manifest)?;
        let text = read_file(&self.bundle_dir(index).join(RECORD_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn latest(&self) -> Result<Option<Iteration>> {
        match self.scan_indices()?.last() {
            Some(index) => Ok(Some(self.load(*index).await?)),
            None => Ok(None),
        }
    }

    async fn indices(&self) -> Result<Vec<u32>> {
        self.scan_indices()
    }
}
