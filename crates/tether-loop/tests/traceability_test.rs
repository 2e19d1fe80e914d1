//! A failing claim that gets fixed between iterations keeps its identity.

mod common;

use common::*;
use std::sync::Arc;
use tether_claims::{ClaimId, VerdictState};
use tether_loop::prompts::markers;
use tether_loop::{FsSnapshot, PassInput, ScoreTrend};
use tether_store::{FsIterationStore, IterationStore};
use tether_test_utils::{assert_ok, temp_codebase, temp_dir, write_file, Reply, ScriptedProvider};

const REGENERATED: &str = "\
# Widget Service

## Authentication
Passwords are hashed with argon2.

## Widgets
Widgets are persisted in SQLite.
Users can export widgets as CSV files.
";

/// A regeneration that echoes the marker it was shown on its input.
const REGENERATED_WITH_MARKER: &str = "\
# Widget Service

## Authentication
Passwords are hashed with argon2.

## Widgets
Widgets are persisted in SQLite.
[aspirational] Users can export widgets as CSV files.
";

#[tokio::test]
async fn test_failed_claim_passes_after_fix() {
    let codebase =
        temp_codebase(&[("src/auth/password.rs", AUTH_RS), ("src/widgets.rs", WIDGETS_RS)]);
    let store_dir = temp_dir();
    let store = Arc::new(assert_ok!(FsIterationStore::open(store_dir.path())));
    let snapshot = Arc::new(assert_ok!(FsSnapshot::new(codebase.path(), &[])));
    let provider = Arc::new(
        ScriptedProvider::new()
            .on_replies(markers::EXTRACT, vec![echo_extractor()])
            .on_replies(markers::ADJUDICATE, vec![judging_oracle(widget_judge)])
            .on_replies(
                markers::REGENERATE,
                vec![Reply::text(REGENERATED), Reply::text(REGENERATED_WITH_MARKER)],
            ),
    );
    let orchestrator = orchestrator(fast_config(), provider.clone(), snapshot, store.clone());

    let first = assert_ok!(orchestrator.run_pass(None, PassInput::document(WIDGET_SPEC)).await);
    let export_id = ClaimId::from_text("Users can export widgets as CSV files.");
    assert_eq!(first.iteration.verdict_for(&export_id).unwrap().state, VerdictState::Fail);

    // The regenerated document keeps the failed claim, tagged as not yet real.
    assert!(first
        .next_document
        .contains("[aspirational] Users can export widgets as CSV files."));
    assert!(first.next_document.contains("Passwords are hashed with argon2."));

    // External fix between iterations.
    write_file(codebase.path(), "src/widgets.rs", WIDGETS_WITH_EXPORT_RS);

    let second = assert_ok!(
        orchestrator
            .run_pass(Some(&first.iteration), PassInput::document(first.next_document.clone()))
            .await
    );

    assert_eq!(second.iteration.index, 2);
    // The claim was read from the tagged document and now verifies.
    let fixed = second.iteration.claim(&export_id).unwrap();
    assert!(fixed.is_aspirational());
    assert_eq!(second.iteration.verdict_for(&export_id).unwrap().state, VerdictState::Pass);

    // Once verified, the next document states it as fact again.
    assert!(second
        .next_document
        .lines()
        .any(|line| line == "Users can export widgets as CSV files."));
    assert!(!second.next_document.contains("[aspirational]"));

    // No unrelated regressions.
    for claim in &first.iteration.claims {
        let before = first.iteration.verdict_for(&claim.id).unwrap().state;
        let after = second.iteration.verdict_for(&claim.id).unwrap().state;
        if before == VerdictState::Pass {
            assert_eq!(after, VerdictState::Pass, "{} regressed", claim.text);
        }
    }

    let readiness = second.report.readiness.as_ref().unwrap();
    assert_eq!(readiness.iterations, 2);
    assert_eq!(readiness.trend, ScoreTrend::Improving);
    assert_eq!(readiness.resolved, vec![export_id]);
    assert!(readiness.regressions.is_empty());

    assert_eq!(assert_ok!(store.indices().await), vec![1, 2]);
    assert_eq!(assert_ok!(store.verify_chain().await), 2);
    assert_eq!(provider.call_count(markers::REGENERATE), 2);
}

#[tokio::test]
async fn test_reworded_claim_supersedes_predecessor() {
    let codebase =
        temp_codebase(&[("src/auth/password.rs", AUTH_RS), ("src/widgets.rs", WIDGETS_RS)]);
    let snapshot = Arc::new(assert_ok!(FsSnapshot::new(codebase.path(), &[])));
    let store = Arc::new(tether_store::MemoryIterationStore::new());
    let provider = Arc::new(provider_with(judging_oracle(widget_judge), REGENERATED));
    let orchestrator = orchestrator(fast_config(), provider, snapshot, store);

    let first = assert_ok!(orchestrator.run_pass(None, PassInput::document(WIDGET_SPEC)).await);

    let reworded = WIDGET_SPEC.replace(
        "Widgets are persisted in SQLite.",
        "Widgets are persisted in an SQLite database.",
    );
    let second = assert_ok!(
        orchestrator
            .run_pass(Some(&first.iteration), PassInput::document(reworded))
            .await
    );

    let old_id = ClaimId::from_text("Widgets are persisted in SQLite.");
    let successor = second
        .iteration
        .claims
        .iter()
        .find(|c| c.text.contains("SQLite database"))
        .unwrap();
    assert_ne!(successor.id, old_id);
    assert_eq!(successor.supersedes.as_ref(), Some(&old_id));
    assert_eq!(second.iteration.verdict_for(&successor.id).unwrap().state, VerdictState::Pass);
}
