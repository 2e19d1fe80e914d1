//! Read-only, path-addressed views of the codebase under verification.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tether_common_fs::{list_files_recursive, path, read_capped, truncate_chars, CappedText};
use thiserror::Error;
use tracing::debug;

/// Bytes inspected to decide whether a file is text.
const SNIFF_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("path not in snapshot: {0}")]
    NotFound(String),

    #[error("path escapes the snapshot root: {0}")]
    OutsideRoot(String),

    #[error("invalid exclude pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to read snapshot: {0}")]
    Io(#[from] tether_common_core::Error),
}

/// Read-only access to a codebase: a path listing plus capped reads.
pub trait CodebaseSnapshot: Send + Sync {
    /// All readable text files, as sorted unix-style relative paths.
    fn list_paths(&self) -> Result<Vec<String>, SnapshotError>;

    /// Read `path`, keeping at most `max_chars` characters.
    fn read(&self, path: &str, max_chars: usize) -> Result<CappedText, SnapshotError>;

    /// Filesystem root, when the snapshot is backed by one.
    fn root(&self) -> Option<&Path> {
        None
    }
}

/// Snapshot of a directory tree, honouring exclude globs and skipping binaries.
pub struct FsSnapshot {
    root: PathBuf,
    exclude: Vec<glob::Pattern>,
}

impl FsSnapshot {
    pub fn new(root: impl Into<PathBuf>, exclude: &[String]) -> Result<Self, SnapshotError> {
        let exclude = exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| SnapshotError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { root: root.into(), exclude })
    }
}

impl CodebaseSnapshot for FsSnapshot {
    fn list_paths(&self) -> Result<Vec<String>, SnapshotError> {
        let files = list_files_recursive(&self.root, &self.exclude)?;
        let total = files.len();

        let paths: Vec<String> = files
            .into_iter()
            .filter(|relative| looks_like_text(&self.root.join(relative)))
            .map(path::to_unix_string)
            .collect();

        debug!(
            root = %self.root.display(),
            listed = paths.len(),
            skipped = total - paths.len(),
            "snapshot listed"
        );
        Ok(paths)
    }

    fn read(&self, relative: &str, max_chars: usize) -> Result<CappedText, SnapshotError> {
        let full = path::safe_join(&self.root, relative)
            .ok_or_else(|| SnapshotError::OutsideRoot(relative.to_string()))?;
        if !full.is_file() {
            return Err(SnapshotError::NotFound(relative.to_string()));
        }
        Ok(read_capped(full, max_chars)?)
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

fn looks_like_text(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else { return false };
    let mut buffer = vec![0u8; SNIFF_BYTES];
    let Ok(read) = file.read(&mut buffer) else { return false };
    let sample = &buffer[..read];

    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A multi-byte character cut by the sample boundary is still text.
        Err(e) => e.error_len().is_none(),
    }
}

/// In-memory snapshot for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    files: BTreeMap<String, String>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl CodebaseSnapshot for MemorySnapshot {
    fn list_paths(&self) -> Result<Vec<String>, SnapshotError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &str, max_chars: usize) -> Result<CappedText, SnapshotError> {
        let content = self
            .files
            .get(path)
            .ok_or_else(|| SnapshotError::NotFound(path.to_string()))?;
        let (kept, truncated) = truncate_chars(content, max_chars);
        Ok(CappedText {
            content: kept.to_string(),
            truncated,
            total_chars: content.chars().count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_test_utils::temp_codebase;

    #[test]
    fn test_fs_snapshot_lists_text_files_only() {
        let dir = temp_codebase(&[
            ("src/main.rs", "fn main() {}"),
            ("target/debug/build.log", "noise"),
            ("README.md", "# readme"),
        ]);
        std::fs::write(dir.path().join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x01]).unwrap();

        let snapshot = FsSnapshot::new(dir.path(), &["target/**".to_string()]).unwrap();
        assert_eq!(snapshot.list_paths().unwrap(), vec!["README.md", "src/main.rs"]);
    }

    #[test]
    fn test_fs_snapshot_read_is_capped_and_confined() {
        let dir = temp_codebase(&[("src/lib.rs", "0123456789")]);
        let snapshot = FsSnapshot::new(dir.path(), &[]).unwrap();

        let capped = snapshot.read("src/lib.rs", 4).unwrap();
        assert_eq!(capped.content, "0123");
        assert!(capped.truncated);

        assert!(matches!(snapshot.read("../etc/passwd", 10), Err(SnapshotError::OutsideRoot(_))));
        assert!(matches!(snapshot.read("src/missing.rs", 10), Err(SnapshotError::NotFound(_))));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let result = FsSnapshot::new(".", &["[".to_string()]);
        assert!(matches!(result, Err(SnapshotError::InvalidPattern { .. })));
    }

    #[test]
    fn test_memory_snapshot() {
        let snapshot = MemorySnapshot::new().with_file("a.rs", "héllo");
        assert_eq!(snapshot.list_paths().unwrap(), vec!["a.rs"]);
        let read = snapshot.read("a.rs", 2).unwrap();
        assert_eq!(read.content, "hé");
        assert_eq!(read.total_chars, 5);
    }
}
