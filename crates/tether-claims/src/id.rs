//! Content-derived identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Marker the regenerator attaches to claims that are not yet true.
pub const ASPIRATIONAL_MARKER: &str = "[aspirational]";

const CLAIM_PREFIX: &str = "clm_";
const TASK_PREFIX: &str = "rem_";
const HASH_LEN: usize = 16;

/// Error parsing an ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid {kind} id: {value}")]
    InvalidFormat { kind: &'static str, value: String },
}

/// Normalise claim text for hashing.
///
/// Lowercases, drops the aspirational marker and list bullets, collapses
/// whitespace and strips trailing punctuation, so cosmetic rewrites of a claim
/// keep its identity.
pub fn normalize_claim_text(text: &str) -> String {
    let lowered = text.to_lowercase().replace(ASPIRATIONAL_MARKER, " ");
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let unbulleted = collapsed
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '+') || c.is_whitespace());
    unbulleted
        .trim_end_matches(|c: char| {
            matches!(c, '.' | '!' | '?' | ';' | ':' | ',') || c.is_whitespace()
        })
        .to_string()
}

/// Identity of a claim: `clm_` followed by 16 hex chars of SHA-256 over the normalised text.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimId(String);

impl ClaimId {
    /// Derive the id for a claim text.
    pub fn from_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_claim_text(text).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{}{}", CLAIM_PREFIX, &digest[..HASH_LEN]))
    }

    /// Parse a rendered id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        validate(s, CLAIM_PREFIX, "claim").map(|_| Self(s.to_string()))
    }

    /// The hex digest without prefix.
    pub fn hash_suffix(&self) -> &str {
        &self.0[CLAIM_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimId({})", self.0)
    }
}

impl TryFrom<String> for ClaimId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ClaimId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identity of a remediation task, derived from the claim it fixes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn for_claim(claim: &ClaimId) -> Self {
        Self(format!("{}{}", TASK_PREFIX, claim.hash_suffix()))
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        validate(s, TASK_PREFIX, "task").map(|_| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

fn validate(s: &str, prefix: &str, kind: &'static str) -> Result<(), IdError> {
    let valid = s
        .strip_prefix(prefix)
        .map(|hex| {
            hex.len() == HASH_LEN && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(IdError::InvalidFormat { kind, value: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalization() {
        assert_eq!(
            normalize_claim_text("  The API   MUST rate-limit logins. "),
            "the api must rate-limit logins"
        );
        assert_eq!(
            normalize_claim_text("- [aspirational] Exports are signed!"),
            "exports are signed"
        );
    }

    #[test]
    fn test_cosmetic_changes_keep_identity() {
        let a = ClaimId::from_text("Passwords are hashed with argon2.");
        let b = ClaimId::from_text("passwords are   hashed with argon2");
        let c = ClaimId::from_text("[aspirational] Passwords are hashed with argon2.");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, ClaimId::from_text("Passwords are hashed with bcrypt."));
    }

    #[test]
    fn test_claim_id_format() {
        let id = ClaimId::from_text("anything");
        assert!(id.as_str().starts_with("clm_"));
        assert_eq!(id.hash_suffix().len(), 16);
        assert_eq!(ClaimId::parse(id.as_str()).unwrap(), id);
        assert!(ClaimId::parse("clm_XYZ").is_err());
        assert!(ClaimId::parse("rem_0123456789abcdef").is_err());
    }

    #[test]
    fn test_task_id_follows_claim() {
        let claim = ClaimId::from_text("Sessions expire after 30 minutes");
        let task = TaskId::for_claim(&claim);
        assert_eq!(&task.as_str()[4..], claim.hash_suffix());
        assert!(TaskId::parse(task.as_str()).is_ok());
    }

    #[test]
    fn test_serde_rejects_malformed_ids() {
        let id = ClaimId::from_text("x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<ClaimId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<ClaimId>("\"clm_nothex\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(text in "[ -~]{0,80}") {
            let once = normalize_claim_text(&text);
            prop_assert_eq!(normalize_claim_text(&once), once.clone());
        }

        #[test]
        fn prop_whitespace_does_not_change_identity(
            words in proptest::collection::vec("[a-z]{1,8}", 1..8)
        ) {
            let tight = words.join(" ");
            let loose = format!("  {}  ", words.join("   "));
            prop_assert_eq!(ClaimId::from_text(&tight), ClaimId::from_text(&loose));
        }
    }
}
