//! Claim identity across iterations.
//!
//! Identical normalised text yields the identical id, so unchanged claims
//! need no link. A reworded claim is linked to its predecessor by recording
//! `supersedes`: the unmatched previous claim of the same category with the
//! highest token Jaccard similarity, if that reaches [`SIMILARITY_THRESHOLD`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tether_claims::{normalize_claim_text, Claim, ClaimId};
use tracing::debug;

/// Minimum token similarity for a reworded claim to count as a successor.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

fn token_set(text: &str) -> HashSet<String> {
    normalize_claim_text(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token Jaccard similarity of two claim texts, in `[0, 1]`.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let (a, b) = (token_set(a), token_set(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Links between the claims of two consecutive iterations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimLineage {
    /// Claims present with the same id in both iterations.
    carried: BTreeSet<ClaimId>,
    /// Current claim id to the previous claim it supersedes.
    superseded: BTreeMap<ClaimId, ClaimId>,
}

impl ClaimLineage {
    /// Match `claims` against `previous`, setting `supersedes` on reworded claims.
    pub fn link(previous: &[Claim], claims: &mut [Claim]) -> Self {
        let previous_ids: HashSet<&ClaimId> = previous.iter().map(|c| &c.id).collect();
        let mut lineage = Self::default();

        for claim in claims.iter() {
            if previous_ids.contains(&claim.id) {
                lineage.carried.insert(claim.id.clone());
            }
        }

        let open_previous: Vec<&Claim> =
            previous.iter().filter(|c| !lineage.carried.contains(&c.id)).collect();
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (current_index, claim) in claims.iter().enumerate() {
            if lineage.carried.contains(&claim.id) {
                continue;
            }
            for (previous_index, candidate) in open_previous.iter().enumerate() {
                if candidate.category != claim.category {
                    continue;
                }
                let score = jaccard(&candidate.text, &claim.text);
                if score >= SIMILARITY_THRESHOLD {
                    pairs.push((score, current_index, previous_index));
                }
            }
        }

        // Best pairs first; ties resolve on ids so linking is reproducible.
        pairs.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| claims[a.1].id.cmp(&claims[b.1].id))
                .then_with(|| open_previous[a.2].id.cmp(&open_previous[b.2].id))
        });

        let mut taken_current = HashSet::new();
        let mut taken_previous = HashSet::new();
        let mut links = Vec::new();
        for (score, current_index, previous_index) in pairs {
            if taken_current.contains(&current_index) || taken_previous.contains(&previous_index) {
                continue;
            }
            taken_current.insert(current_index);
            taken_previous.insert(previous_index);
            links.push((current_index, open_previous[previous_index].id.clone(), score));
        }

        for (current_index, predecessor, score) in links {
            let claim = &mut claims[current_index];
            debug!(
                claim = %claim.id,
                supersedes = %predecessor,
                similarity = score,
                "linked reworded claim"
            );
            claim.supersedes = Some(predecessor.clone());
            lineage.superseded.insert(claim.id.clone(), predecessor);
        }

        lineage
    }

    /// Rebuild the lineage of two committed iterations from their recorded ids and links.
    pub fn from_recorded(previous: &[Claim], current: &[Claim]) -> Self {
        let previous_ids: HashSet<&ClaimId> = previous.iter().map(|c| &c.id).collect();
        let mut lineage = Self::default();
        for claim in current {
            if previous_ids.contains(&claim.id) {
                lineage.carried.insert(claim.id.clone());
                continue;
            }
            if let Some(predecessor) =
                claim.supersedes.as_ref().filter(|p| previous_ids.contains(p))
            {
                lineage.superseded.insert(claim.id.clone(), predecessor.clone());
            }
        }
        lineage
    }

    /// The claim in the current iteration that continues `previous`.
    pub fn successor_of(&self, previous: &ClaimId) -> Option<&ClaimId> {
        if let Some(carried) = self.carried.get(previous) {
            return Some(carried);
        }
        self.superseded
            .iter()
            .find(|(_, predecessor)| *predecessor == previous)
            .map(|(current, _)| current)
    }

    /// The previous claim that `current` continues.
    pub fn predecessor_of(&self, current: &ClaimId) -> Option<&ClaimId> {
        self.carried.get(current).or_else(|| self.superseded.get(current))
    }

    pub fn carried_count(&self) -> usize {
        self.carried.len()
    }

    pub fn superseded_count(&self) -> usize {
        self.superseded.len()
    }
}
