//! Test utilities for Tether crates.

pub mod scripted;

pub use scripted::{Reply, ScriptedProvider};

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a temporary directory that is cleaned up on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Creates a temporary file with given content.
pub fn temp_file(content: &str) -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let path = dir.path().join("test_file");
    std::fs::write(&path, content).expect("Failed to write temp file");
    (dir, path)
}

/// Creates a temporary codebase from `(relative path, content)` pairs.
pub fn temp_codebase(files: &[(&str, &str)]) -> TempDir {
    let dir = temp_dir();
    for (path, content) in files {
        write_file(dir.path(), path, content);
    }
    dir
}

/// Write (or overwrite) a file inside a fixture codebase.
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(&path, content).expect("Failed to write fixture file");
}

/// A small specification document used across loop tests.
pub const SAMPLE_SPEC: &str = "\
# Widget Service

## Authentication
Users log in with an email and password. Passwords are hashed with argon2.

## Storage
Widgets are persisted in SQLite.

## Legal
The service is offered under the MIT license.
";

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
