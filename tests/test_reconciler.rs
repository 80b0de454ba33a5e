//! Reconciliation of transfer rows left `pending`.

mod common;

use common::FakeLedger;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use swarms_settlement::app::reconciler::{ReconcileSummary, EXPIRED_REASON};
use swarms_settlement::domain::settlement::{NewSettlement, SettlementStatus};
use swarms_settlement::solana::SignatureState;
use swarms_settlement::storage::AgentStore;
use swarms_settlement::{MemoryStore, Reconciler};

async fn pending_row(store: &MemoryStore, hash: &str) {
    store
        .insert_settlement(&NewSettlement {
            agent_id: "agent-1".into(),
            transaction_hash: hash.into(),
            amount: 1.0,
            recipient: "recipient".into(),
            status: SettlementStatus::Pending,
        })
        .await
        .unwrap();
}

fn reconciler(store: Arc<MemoryStore>, ledger: Arc<FakeLedger>) -> Reconciler {
    Reconciler::new(store, ledger, Duration::from_secs(30), Duration::from_secs(300))
}

async fn status_of(store: &MemoryStore, hash: &str) -> (SettlementStatus, Option<String>) {
    let row = store.find_settlement(hash).await.unwrap().unwrap();
    (row.status, row.error)
}

#[tokio::test]
async fn settles_confirmed_and_failed_signatures() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());
    ledger.state.lock().await.default_state = SignatureState::Unknown;

    let confirmed = Signature::new_unique();
    let failed = Signature::new_unique();
    let waiting = Signature::new_unique();
    for sig in [&confirmed, &failed, &waiting] {
        pending_row(&store, &sig.to_string()).await;
    }
    ledger.set_status(confirmed, SignatureState::Confirmed).await;
    ledger
        .set_status(failed, SignatureState::Failed("insufficient funds".into()))
        .await;

    let summary = reconciler(store.clone(), ledger).reconcile_once().await.unwrap();
    assert_eq!(
        summary,
        ReconcileSummary {
            completed: 1,
            failed: 1,
            still_pending: 1
        }
    );

    assert_eq!(status_of(&store, &confirmed.to_string()).await.0, SettlementStatus::Completed);
    assert_eq!(
        status_of(&store, &failed.to_string()).await,
        (SettlementStatus::Failed, Some("insufficient funds".to_string()))
    );
    assert_eq!(status_of(&store, &waiting.to_string()).await.0, SettlementStatus::Pending);
}

#[tokio::test]
async fn unknown_signatures_expire_after_the_window() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());
    ledger.state.lock().await.default_state = SignatureState::Unknown;

    let old = Signature::new_unique().to_string();
    pending_row(&store, &old).await;
    store
        .set_settlement_created_at(&old, chrono::Utc::now() - chrono::Duration::minutes(10))
        .await;

    let summary = reconciler(store.clone(), ledger).reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(
        status_of(&store, &old).await,
        (SettlementStatus::Failed, Some(EXPIRED_REASON.to_string()))
    );
}

#[tokio::test]
async fn malformed_hashes_are_failed() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());
    pending_row(&store, "not-a-signature").await;

    let summary = reconciler(store.clone(), ledger).reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(status_of(&store, "not-a-signature").await.0, SettlementStatus::Failed);
}

#[tokio::test]
async fn status_lookup_errors_do_not_stop_the_pass() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());

    let flaky = Signature::new_unique();
    let confirmed = Signature::new_unique();
    pending_row(&store, &flaky.to_string()).await;
    pending_row(&store, &confirmed.to_string()).await;
    ledger.state.lock().await.status_errors.insert(flaky);

    let summary = reconciler(store.clone(), ledger).reconcile_once().await.unwrap();
    assert_eq!(
        summary,
        ReconcileSummary {
            completed: 1,
            failed: 0,
            still_pending: 1
        }
    );
    assert_eq!(status_of(&store, &flaky.to_string()).await.0, SettlementStatus::Pending);
    assert_eq!(status_of(&store, &confirmed.to_string()).await.0, SettlementStatus::Completed);
}

#[tokio::test]
async fn completed_rows_are_left_alone() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());
    let sig = Signature::new_unique().to_string();
    pending_row(&store, &sig).await;
    store
        .update_settlement_status(&sig, SettlementStatus::Completed, None)
        .await
        .unwrap();

    let summary = reconciler(store, ledger).reconcile_once().await.unwrap();
    assert_eq!(summary, ReconcileSummary::default());
}

#[tokio::test(start_paused = true)]
async fn background_task_runs_until_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FakeLedger::new());
    let sig = Signature::new_unique().to_string();
    pending_row(&store, &sig).await;

    let reconciler = Arc::new(reconciler(store.clone(), ledger));
    let handle = reconciler.clone().start_background_task();

    // the first tick fires immediately
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(status_of(&store, &sig).await.0, SettlementStatus::Completed);

    reconciler.shutdown();
    handle.await.unwrap();
}
