//! Bounded source excerpts handed to adjudication.

use crate::snapshot::CodebaseSnapshot;
use std::collections::HashSet;
use tether_claims::LineRange;
use tracing::{debug, warn};

/// One source file as shown to an adjudicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub path: String,
    pub content: String,
    /// The content was cut to fit a budget.
    pub truncated: bool,
    /// Characters in the full file.
    pub total_chars: usize,
}

impl EvidenceFile {
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// The files behind one adjudication batch, within per-file and total budgets.
#[derive(Debug, Clone, Default)]
pub struct EvidenceContext {
    files: Vec<EvidenceFile>,
    warnings: Vec<String>,
}

impl EvidenceContext {
    /// Read `paths` from `snapshot` in order.
    ///
    /// Each file is capped at `per_file_chars`; once `total_chars` is spent
    /// the remaining paths are skipped. Unreadable paths become warnings.
    pub fn assemble(
        snapshot: &dyn CodebaseSnapshot,
        paths: &[String],
        per_file_chars: usize,
        total_chars: usize,
    ) -> Self {
        let mut context = Self::default();
        let mut seen = HashSet::new();
        let mut remaining = total_chars;
        let mut skipped = Vec::new();

        for path in paths {
            if !seen.insert(path.as_str()) {
                continue;
            }
            if remaining == 0 {
                skipped.push(path.as_str());
                continue;
            }

            match snapshot.read(path, per_file_chars.min(remaining)) {
                Ok(capped) => {
                    remaining = remaining.saturating_sub(capped.content.chars().count());
                    if capped.truncated {
                        debug!(
                            path = %path,
                            shown = capped.content.chars().count(),
                            total = capped.total_chars,
                            "evidence truncated"
                        );
                    }
                    context.files.push(EvidenceFile {
                        path: path.clone(),
                        content: capped.content,
                        truncated: capped.truncated,
                        total_chars: capped.total_chars,
                    });
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "evidence file unreadable");
                    context.warnings.push(format!("evidence: could not read {}: {}", path, e));
                }
            }
        }

        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), budget = total_chars, "evidence budget exhausted");
            context.warnings.push(format!(
                "evidence: character budget of {} exhausted, skipped {}",
                total_chars,
                skipped.join(", ")
            ));
        }

        context
    }

    pub fn files(&self) -> &[EvidenceFile] {
        &self.files
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    pub fn file(&self, path: &str) -> Option<&EvidenceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Lines shown for `path`, if it is part of the context.
    pub fn line_count(&self, path: &str) -> Option<usize> {
        self.file(path).map(EvidenceFile::line_count)
    }

    /// Text of `range` in `path`, clamped to the lines actually shown.
    pub fn excerpt(&self, path: &str, range: LineRange) -> Option<String> {
        let file = self.file(path)?;
        let lines: Vec<&str> = file
            .content
            .lines()
            .skip(range.start as usize - 1)
            .take((range.end - range.start + 1) as usize)
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Render the context with line numbers, marking truncated files.
    pub fn render(&self) -> String {
        if self.files.is_empty() {
            return "(no files)".to_string();
        }

        let mut out = String::new();
        for file in &self.files {
            if file.truncated {
                out.push_str(&format!(
                    "=== {} (truncated: first {} of {} chars) ===\n",
                    file.path,
                    file.content.chars().count(),
                    file.total_chars
                ));
            } else {
                out.push_str(&format!("=== {} ===\n", file.path));
            }
            for (number, line) in file.content.lines().enumerate() {
                out.push_str(&format!("{:>5} | {}\n", number + 1, line));
            }
            out.push('\n');
        }
        out
    }
}
