//! Path manipulation utilities.

use std::path::{Component, Path, PathBuf};

/// Join paths safely, preventing path traversal.
pub fn safe_join(base: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<PathBuf> {
    let base = base.as_ref();
    let path = path.as_ref();

    if path.is_absolute() {
        return None;
    }

    for component in path.components() {
        if matches!(component, Component::ParentDir | Component::Prefix(_)) {
            return None;
        }
    }

    Some(base.join(path))
}

/// Convert a path to a Unix-style string (forward slashes).
pub fn to_unix_string(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
