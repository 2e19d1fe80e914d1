//! Atomic specification claims.

use crate::category::{Category, Severity};
use crate::id::{ClaimId, ASPIRATIONAL_MARKER};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn prohibition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\b(must\s+not|must\s+never|never|shall\s+not|should\s+not",
            r"|no\s+longer|cannot|can\s+not)\b",
        ))
        .expect("static regex")
    })
}

/// A single testable assertion extracted from a specification document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub source_section: String,
    pub category: Category,
    pub severity: Severity,
    pub text: String,
    pub testable: bool,
    /// Predecessor in the previous iteration when the wording changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ClaimId>,
}

impl Claim {
    /// Create a claim; the id is derived from `text`.
    pub fn new(
        source_section: impl Into<String>,
        category: Category,
        severity: Severity,
        text: impl Into<String>,
        testable: bool,
    ) -> Self {
        let text = text.into().trim().to_string();
        Self {
            id: ClaimId::from_text(&text),
            source_section: source_section.into(),
            category,
            severity,
            text,
            testable,
            supersedes: None,
        }
    }

    pub fn with_supersedes(mut self, predecessor: ClaimId) -> Self {
        if predecessor != self.id {
            self.supersedes = Some(predecessor);
        }
        self
    }

    /// Whether the claim forbids something rather than requiring it.
    pub fn is_prohibition(&self) -> bool {
        prohibition_pattern().is_match(&self.text)
    }

    /// Whether the text carries the aspirational marker.
    pub fn is_aspirational(&self) -> bool {
        self.text.to_lowercase().contains(ASPIRATIONAL_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_id_derived_from_text() {
        let claim =
            Claim::new("Auth", Category::Security, Severity::High, " Tokens expire. ", true);
        assert_eq!(claim.text, "Tokens expire.");
        assert_eq!(claim.id, ClaimId::from_text("tokens expire"));
    }

    #[test]
    fn test_supersedes_ignores_self() {
        let claim = Claim::new("A", Category::Functionality, Severity::Low, "x works", true);
        let same = claim.id.clone();
        assert!(claim.clone().with_supersedes(same).supersedes.is_none());

        let other = ClaimId::from_text("x used to work");
        assert_eq!(claim.with_supersedes(other.clone()).supersedes, Some(other));
    }

    #[test]
    fn test_prohibition_detection() {
        let security =
            |text: &str| Claim::new("S", Category::Security, Severity::Critical, text, true);
        let no = security("Passwords must not be logged");
        let yes = security("Passwords are hashed");
        assert!(no.is_prohibition());
        assert!(!yes.is_prohibition());
    }

    #[test_case("Tokens must NEVER be reused" => true ; "uppercase")]
    #[test_case("Sessions can not outlive logout" => true ; "split cannot")]
    #[test_case("The CLI no  longer accepts --force" => true ; "extra whitespace")]
    #[test_case("Nevertheless, exports are compressed" => false ; "never inside a word")]
    #[test_case("Uploads use the cannotated schema" => false ; "cannot inside a word")]
    fn test_prohibition_word_boundaries(text: &str) -> bool {
        Claim::new("S", Category::Functionality, Severity::Medium, text, true).is_prohibition()
    }

    #[test]
    fn test_serialized_field_names() {
        let claim =
            Claim::new("Intro", Category::DataPrivacy, Severity::Medium, "PII is encrypted", true);
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["sourceSection"], "Intro");
        assert_eq!(json["category"], "data-privacy");
        assert!(json.get("supersedes").is_none());
    }
}
