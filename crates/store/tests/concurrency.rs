//! Concurrent access tests for both store backends

use std::sync::Arc;

use dicebank_core::{Amount, DepositEvent, TxHash, UserKey};
use dicebank_store::{
    AccountStore, DebitOutcome, DepositApplied, DepositStore, ExclusiveCredit, LedgerStore,
    MemoryStore, SqliteStore,
};
use tempfile::TempDir;

fn ada(whole: u64) -> Amount {
    Amount::from_whole(whole).unwrap()
}

/// 40 concurrent 1 ADA debits against a 25 ADA balance: exactly 25 succeed.
async fn debits_never_overdraw(store: Arc<dyn LedgerStore>) {
    let user = UserKey::from("racer");
    store.credit(&user, ada(25), "seed-funds").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve_and_debit(&user, ada(1), &format!("bet-{i}:stake"))
                .await
                .unwrap()
        }));
    }

    let mut debited = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            DebitOutcome::Debited(receipt) => {
                assert!(!receipt.replayed);
                debited += 1;
            }
            DebitOutcome::InsufficientFunds { available } => {
                assert!(available < ada(1));
                rejected += 1;
            }
        }
    }

    assert_eq!(debited, 25);
    assert_eq!(rejected, 15);
    let account = store.account(&user).await.unwrap();
    assert_eq!(account.balance, Amount::ZERO);
    assert_eq!(account.version, 26);
}

/// The same deposit delivered concurrently is credited once.
async fn concurrent_duplicate_deposit(store: Arc<dyn LedgerStore>) {
    let user = UserKey::from("depositor");
    let deposit = DepositEvent::new(TxHash::from("tx-dup"), user.clone(), ada(5), 3);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let deposit = deposit.clone();
        handles.push(tokio::spawn(async move { store.apply_deposit(&deposit).await.unwrap() }));
    }

    let mut credited = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), DepositApplied::Credited(_)) {
            credited += 1;
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(store.account(&user).await.unwrap().balance, ada(5));
}

/// Payouts and refunds of the same bets race; each bet ends with exactly one.
async fn payout_and_refund_race(store: Arc<dyn LedgerStore>) {
    let user = UserKey::from("gambler");

    let mut handles = Vec::new();
    for bet in 0..20 {
        for (key, rival, amount) in [
            (format!("bet-{bet}"), format!("bet-{bet}:refund"), ada(11)),
            (format!("bet-{bet}:refund"), format!("bet-{bet}"), ada(2)),
        ] {
            let store = store.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                store.credit_unless(&user, amount, &key, &rival).await.unwrap()
            }));
        }
    }

    let mut expected = Amount::ZERO;
    for handle in handles {
        if let ExclusiveCredit::Credited(receipt) = handle.await.unwrap() {
            expected = expected.checked_add(receipt.op.amount).unwrap();
        }
    }

    for bet in 0..20 {
        let payout = store.find_op(&format!("bet-{bet}")).await.unwrap();
        let refund = store.find_op(&format!("bet-{bet}:refund")).await.unwrap();
        assert!(payout.is_some() != refund.is_some(), "bet-{bet} credited twice or never");
    }
    assert_eq!(store.account(&user).await.unwrap().balance, expected);
}

/// Accounts do not interfere with each other.
async fn independent_accounts(store: Arc<dyn LedgerStore>) {
    let mut handles = Vec::new();
    for u in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let user = UserKey::new(format!("user-{u}"));
            for i in 0..5 {
                store.credit(&user, ada(2), &format!("u{u}-c{i}")).await.unwrap();
                store
                    .reserve_and_debit(&user, ada(1), &format!("u{u}-d{i}"))
                    .await
                    .unwrap();
            }
            store.account(&user).await.unwrap()
        }));
    }

    for handle in handles {
        let account = handle.await.unwrap();
        assert_eq!(account.balance, ada(5));
        assert_eq!(account.version, 10);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_debits_never_overdraw() {
    debits_never_overdraw(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_debits_never_overdraw() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("race.db")).await.unwrap();
    debits_never_overdraw(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_duplicate_deposit() {
    concurrent_duplicate_deposit(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_duplicate_deposit() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("dup.db")).await.unwrap();
    concurrent_duplicate_deposit(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_independent_accounts() {
    independent_accounts(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_independent_accounts() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("indep.db")).await.unwrap();
    independent_accounts(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_payout_and_refund_race() {
    payout_and_refund_race(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_payout_and_refund_race() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("rival.db")).await.unwrap();
    payout_and_refund_race(Arc::new(store)).await;
}
