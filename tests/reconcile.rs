mod support;

use std::time::Duration;

use binder_sync::{EntrySource, Game, ReconcileOutcome, Session, SyncConfig, SyncError};
use support::{Harness, OP_CATALOG, OP_LEDGER};

fn instance_ids(h: &Harness, container_id: &str) -> Vec<String> {
    h.sync
        .partition(container_id, Game::OnePiece)
        .unwrap()
        .entries()
        .map(|e| e.instance_id.clone())
        .collect()
}

#[tokio::test]
async fn luffy_scenario() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);

    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    let entries: Vec<_> = partition.entries().collect();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].instance_id.ends_with("-copy1"));
    assert!(entries[1].instance_id.ends_with("-copy2"));
    assert!(entries.iter().all(|e| e.card.display_name == "Luffy"));
    assert!(entries.iter().all(|e| e.card.rarity.as_deref() == Some("SR")));
}

#[tokio::test]
async fn reconcile_is_idempotent_within_a_session() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);
    h.seed_ledger(Game::OnePiece, "b1", "OP01-001", 1);

    let first = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();
    let after_first = instance_ids(&h, "b1");
    let second = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    assert!(matches!(first, ReconcileOutcome::Applied { entries: 3, .. }));
    assert_eq!(second, ReconcileOutcome::Skipped);
    assert_eq!(h.remote.select_count(OP_LEDGER), 1);
    assert_eq!(h.remote.select_count(OP_CATALOG), 1);
    assert_eq!(instance_ids(&h, "b1"), after_first);
}

#[tokio::test]
async fn force_refresh_refetches_without_duplicating() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);

    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();
    let before = instance_ids(&h, "b1");
    h.sync.reconcile("b1", Game::OnePiece, true).await.unwrap();

    assert_eq!(h.remote.select_count(OP_LEDGER), 2);
    assert_eq!(instance_ids(&h, "b1"), before);
}

#[tokio::test]
async fn quantity_three_expands_to_three_copies() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "OP01-002", 3);

    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    let ordinals: Vec<u32> = partition.entries().map(|e| e.copy_ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
    assert!(partition.entries().all(|e| e.catalog_id() == "OP01-002"));
    assert!(partition.entries().all(|e| e.source == EntrySource::Ledger));
    assert_eq!(partition.detail_cache.len(), 3);
}

#[tokio::test]
async fn dangling_reference_is_skipped_and_left_in_ledger() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 1);
    h.seed_ledger(Game::OnePiece, "b1", "GHOST-404", 2);
    h.seed_ledger(Game::OnePiece, "b1", "OP01-001", 1);

    let outcome = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            ledger_rows: 3,
            entries: 2,
            dangling: vec!["GHOST-404".to_string()],
        }
    );
    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    assert!(partition.entries().all(|e| e.catalog_id() != "GHOST-404"));
    assert_eq!(h.ledger_qty("b1", "GHOST-404"), Some(2));
}

#[tokio::test]
async fn entries_follow_ledger_order() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "OP01-002", 1);
    h.seed_ledger(Game::OnePiece, "b1", "X1", 1);
    h.seed_ledger(Game::OnePiece, "b1", "OP01-001", 1);

    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    let ids: Vec<&str> = partition.entries().map(|e| e.catalog_id()).collect();
    assert_eq!(ids, vec!["OP01-002", "X1", "OP01-001"]);
}

#[tokio::test]
async fn concurrent_reconciles_fetch_once() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);
    h.remote.set_latency(Duration::from_millis(20));

    let (a, b) = tokio::join!(
        h.sync.reconcile("b1", Game::OnePiece, false),
        h.sync.reconcile("b1", Game::OnePiece, false),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes.iter().filter(|o| **o == ReconcileOutcome::Skipped).count(),
        1
    );
    assert_eq!(h.remote.select_count(OP_LEDGER), 1);
    assert_eq!(h.sync.partition("b1", Game::OnePiece).unwrap().entry_count(), 2);
}

#[tokio::test]
async fn late_result_for_switched_container_is_discarded() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);
    h.sync.switch_container("b1", Game::OnePiece).unwrap();
    h.remote.set_latency(Duration::from_millis(50));

    let (outcome, switched) = tokio::join!(
        h.sync.reconcile("b1", Game::OnePiece, false),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.sync.switch_container("b2", Game::OnePiece)
        }
    );

    switched.unwrap();
    assert_eq!(outcome.unwrap(), ReconcileOutcome::Stale);
    assert_eq!(h.sync.partition("b1", Game::OnePiece).unwrap().entry_count(), 0);
}

#[tokio::test]
async fn remote_failure_surfaces_and_allows_retry() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 1);
    h.remote
        .fail_with(SyncError::RemoteUnavailable("connection reset".into()));

    let err = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap_err();
    assert!(err.is_retryable());

    h.remote.recover();
    let outcome = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { entries: 1, .. }));
}

#[tokio::test]
async fn signed_out_session_is_not_authenticated() {
    let h = Harness::new();
    h.session.sign_out();

    let err = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap_err();
    assert_eq!(err, SyncError::NotAuthenticated);

    let anonymous = binder_sync::BinderSync::new(
        h.remote.clone(),
        h.kv.clone(),
        Session::new(),
        binder_sync::SyncConfig::default(),
    );
    assert!(anonymous.reconcile("b1", Game::OnePiece, false).await.is_err());
}

#[tokio::test]
async fn empty_ledger_clears_stale_ledger_entries_only() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 2);
    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    let zoro = binder_sync::CanonicalCard::new("OP01-001", "Roronoa Zoro", Game::OnePiece);
    h.sync.add_manual_card("b1", &zoro, None).unwrap();
    h.sync.ledger().clear_all(Game::OnePiece, "b1").await.unwrap();

    let outcome = h.sync.reconcile("b1", Game::OnePiece, true).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Applied { ledger_rows: 0, .. }));
    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    assert_eq!(partition.entry_count(), 1);
    assert_eq!(partition.entries().next().unwrap().source, EntrySource::Manual);
}

#[tokio::test]
async fn reconcile_leaves_other_games_alone() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 1);
    h.seed_ledger(Game::Pokemon, "b1", "sv1-25", 2);

    h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();
    h.sync.reconcile("b1", Game::Pokemon, false).await.unwrap();
    h.sync.reconcile("b1", Game::OnePiece, true).await.unwrap();

    let partition = h.sync.partition("b1", Game::OnePiece).unwrap();
    assert_eq!(partition.entries().filter(|e| e.game() == Game::Pokemon).count(), 2);
    assert_eq!(partition.entries().filter(|e| e.game() == Game::OnePiece).count(), 1);
}

#[tokio::test]
async fn prune_dangling_deletes_only_orphaned_rows() {
    let h = Harness::new();
    h.seed_ledger(Game::OnePiece, "b1", "X1", 1);
    h.seed_ledger(Game::OnePiece, "b1", "GHOST-404", 1);

    let pruned = h.sync.prune_dangling("b1", Game::OnePiece).await.unwrap();

    assert_eq!(pruned, vec!["GHOST-404".to_string()]);
    assert_eq!(h.ledger_qty("b1", "GHOST-404"), None);
    assert_eq!(h.ledger_qty("b1", "X1"), Some(1));
}

#[tokio::test]
async fn whole_float_quantities_expand_and_survive_the_sweep() {
    let h = Harness::new();
    h.seed_ledger_value(Game::OnePiece, "b1", "X1", serde_json::json!(2.0));

    let outcome = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { entries: 2, .. }));

    let swept = h.sync.sweep_invalid_quantities("b1", Game::OnePiece).await.unwrap();
    assert_eq!(swept, 0);
    assert_eq!(h.remote.rows(OP_LEDGER).len(), 1);
}

#[tokio::test]
async fn oversized_quantity_is_clamped_to_configured_limit() {
    let h = Harness::with_config(SyncConfig::default().with_max_copies_per_card(4));
    h.seed_ledger(Game::OnePiece, "b1", "X1", i64::from(u32::MAX) + 10);

    let outcome = h.sync.reconcile("b1", Game::OnePiece, false).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Applied { entries: 4, .. }));
}
