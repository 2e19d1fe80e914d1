//! Closed vocabularies for claim classification.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Category of a specification claim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    AsRefStr, EnumIter, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    /// Observable behaviour of the system.
    Functionality,
    /// Authentication, authorization, input handling, secrets.
    Security,
    /// Handling of personal or sensitive data.
    DataPrivacy,
    /// Deployment, configuration, monitoring, availability.
    Operational,
    /// Licensing, compliance and contractual commitments.
    Legal,
}

impl Category {
    /// Parse a category, accepting common synonyms. Returns `None` for unknown values.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = vocabulary_key(raw);
        let category = match key.as_str() {
            "functionality" | "functional" | "feature" | "features" | "behavior" | "behaviour" => {
                Self::Functionality
            }
            "security" | "sec" | "auth" | "authentication" | "authorization" => Self::Security,
            "data-privacy" | "privacy" | "data" | "pii" | "gdpr" | "data-protection" => {
                Self::DataPrivacy
            }
            "operational" | "operations" | "ops" | "operability" | "reliability" | "performance"
            | "observability" | "deployment" => Self::Operational,
            "legal" | "compliance" | "licensing" | "license" | "regulatory" => Self::Legal,
            _ => return None,
        };
        Some(category)
    }

    /// Parse or fall back to [`Category::Functionality`].
    ///
    /// The boolean is `true` when the fallback was used.
    pub fn coerce(raw: &str) -> (Self, bool) {
        match Self::parse(raw) {
            Some(category) => (category, false),
            None => (Self::Functionality, true),
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Functionality
    }
}

/// Severity of a claim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric value for comparison (higher = more severe).
    pub fn level(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Parse a severity, accepting common synonyms.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = vocabulary_key(raw);
        let severity = match key.as_str() {
            "critical" | "crit" | "blocker" | "p0" | "must" => Self::Critical,
            "high" | "major" | "important" | "p1" => Self::High,
            "medium" | "med" | "moderate" | "normal" | "p2" => Self::Medium,
            "low" | "minor" | "trivial" | "nice-to-have" | "p3" => Self::Low,
            _ => return None,
        };
        Some(severity)
    }

    /// Parse or fall back to [`Severity::Medium`].
    pub fn coerce(raw: &str) -> (Self, bool) {
        match Self::parse(raw) {
            Some(severity) => (severity, false),
            None => (Self::Medium, true),
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

fn vocabulary_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', ' ', '/'], "-")
}
