//! File system utilities for Tether.

pub mod path;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tether_common_core::{Error, Result};

/// Text read from a file, cut to a character budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedText {
    /// The (possibly truncated) content.
    pub content: String,
    /// Whether content was cut.
    pub truncated: bool,
    /// Character count of the whole file.
    pub total_chars: usize,
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Read a UTF-8 file, keeping at most `max_chars` characters.
///
/// Files that are not valid UTF-8 produce an error; callers treat them as
/// binary and skip them.
pub fn read_capped(path: impl AsRef<Path>, max_chars: usize) -> Result<CappedText> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            Error::fs(format!("file not found: {}", path.display()), path, e)
        }
        _ => Error::fs(format!("failed to read file: {}", path.display()), path, e),
    })?;

    let text = String::from_utf8(bytes).map_err(|_| Error::FileSystem {
        message: format!("not a UTF-8 text file: {}", path.display()),
        path: Some(path.to_string_lossy().to_string()),
        source: None,
    })?;

    let total_chars = text.chars().count();
    let (kept, truncated) = truncate_chars(&text, max_chars);

    Ok(CappedText {
        content: kept.to_string(),
        truncated,
        total_chars,
    })
}

/// Write to a file atomically (write to temp, then rename).
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new("."));

    fs::create_dir_all(parent).map_err(|e| {
        Error::fs(format!("failed to create parent directory: {}", parent.display()), parent, e)
    })?;

    let mut temp_path = path.to_path_buf();
    if let Some(name) = path.file_name() {
        temp_path.set_file_name(format!(".{}.tmp", name.to_string_lossy()));
    } else {
        temp_path.push(".tmp");
    }

    {
        let temp_error = |what: &str, e: io::Error| {
            Error::fs(format!("{}: {}", what, temp_path.display()), &temp_path, e)
        };

        let mut file = File::create(&temp_path)
            .map_err(|e| temp_error("failed to create temporary file", e))?;

        file.write_all(contents)
            .map_err(|e| temp_error("failed to write to temporary file", e))?;

        file.sync_all()
            .map_err(|e| temp_error("failed to sync temporary file", e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::fs(format!("failed to rename temporary file to target: {}", path.display()), path, e)
    })?;

    Ok(())
}

/// Write string to file atomically.
pub fn write_string_atomic(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    write_atomic(path, contents.as_bytes())
}

/// Ensure a directory exists.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            Error::fs(format!("failed to create directory: {}", path.display()), path, e)
        })?;
    }
    Ok(())
}

/// Move a fully written directory into place, refusing to replace an existing one.
pub fn rename_dir_no_clobber(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());

    if to.exists() {
        return Err(Error::FileSystem {
            message: format!("target already exists: {}", to.display()),
            path: Some(to.to_string_lossy().to_string()),
            source: None,
        });
    }

    fs::rename(from, to)
        .map_err(|e| Error::fs(format!("failed to move {} into place", from.display()), to, e))
}

/// Recursively list files under `root` as root-relative paths, sorted.
///
/// Paths matching any of `exclude` (matched against the unix-style relative
/// path) are skipped, and so is everything below an excluded directory.
pub fn list_files_recursive(
    root: impl AsRef<Path>,
    exclude: &[glob::Pattern],
) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative_dir) = pending.pop() {
        let dir = root.join(&relative_dir);
        let read_dir = fs::read_dir(&dir).map_err(|e| {
            Error::fs(format!("failed to read directory: {}", dir.display()), &dir, e)
        })?;

        for entry in read_dir {
            let entry = entry.map_err(|e| {
                Error::fs(format!("failed to read directory entry: {}", dir.display()), &dir, e)
            })?;

            let relative = relative_dir.join(entry.file_name());
            let unix = path::to_unix_string(&relative);
            let file_type = entry
                .file_type()
                .map_err(|e| Error::fs(format!("failed to stat: {}", unix), entry.path(), e))?;

            if file_type.is_dir() {
                // `target/**` should also prune the `target` directory itself.
                let probe = format!("{}/", unix);
                if is_excluded(&unix, exclude) || is_excluded(&probe, exclude) {
                    continue;
                }
                pending.push(relative);
            } else if file_type.is_file() && !is_excluded(&unix, exclude) {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_excluded(unix_path: &str, exclude: &[glob::Pattern]) -> bool {
    exclude.iter().any(|pattern| pattern.matches(unix_path))
}
