//! Integration tests for DiceBank
//!
//! These tests open the on-disk context the CLI uses and drive it through
//! deposits, bets, webhooks and restarts.

use dicebank_core::{op_key, Amount, BetId, BetRecord, BetStatus, UserKey};
use dicebank_engine::{
    BetOutcome, CommandInput, CommandReply, DepositOutcome, EngineConfig, WebhookRequest,
    WebhookSigner, WebhookVerifier,
};
use dicebank_rpc::{commands, AppContext};
use dicebank_store::{AccountStore, BetStore, SqliteStore};
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn ada(whole: u64) -> Amount {
    Amount::from_whole(whole).unwrap()
}

async fn open(dir: &TempDir) -> AppContext {
    AppContext::with_config(dir.path(), EngineConfig::default(), None)
        .await
        .unwrap()
}

/// Test: Deposit → Bet → Restart → Balance check
#[tokio::test]
async fn test_full_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let user = UserKey::from("alice");

    let ctx = open(&temp_dir).await;
    assert!(ctx.db_path().exists());

    // 1. Deposit 10 ADA
    commands::deposit(&ctx, "alice", dec!(10), "tx-1", 3).await.unwrap();
    assert_eq!(ctx.core.balance(&user).await.unwrap(), ada(10));

    // 2. Bet 2 ADA through the registry
    let input = CommandInput::new(user.clone())
        .with("amount", "2")
        .with("prediction", "3")
        .with("seed", "hello");
    let CommandReply::Bet(BetOutcome::Settled(bet)) = ctx.run("dice", &input).await.unwrap() else {
        panic!("expected a settled bet");
    };
    let expected = if bet.won { ada(19) } else { ada(8) };
    assert_eq!(bet.balance, expected);
    ctx.close().await;

    // 3. Everything survives a restart
    let ctx = open(&temp_dir).await;
    assert_eq!(ctx.core.balance(&user).await.unwrap(), expected);
    let record = ctx.core.wagers().bet(&bet.bet_id).await.unwrap();
    assert_eq!(record.status, BetStatus::Settled);
    assert_eq!(ctx.core.wagers().verify(&bet.bet_id).await.unwrap(), bet.proof);

    // 4. Replaying the deposit changes nothing
    commands::deposit(&ctx, "alice", dec!(10), "tx-1", 3).await.unwrap();
    assert_eq!(ctx.core.balance(&user).await.unwrap(), expected);
    ctx.close().await;
}

/// Test: a bet interrupted after its debit is refunded when the context opens
#[tokio::test]
async fn test_startup_recovery_refunds_stranded_bet() {
    let temp_dir = TempDir::new().unwrap();
    let user = UserKey::from("bob");

    {
        let store = SqliteStore::open(&temp_dir.path().join("dicebank.db")).await.unwrap();
        store.credit(&user, ada(5), "deposit:tx-b").await.unwrap();

        let bet = BetRecord::new(BetId::generate(), user.clone(), ada(2), 4, "s".into());
        store.insert_bet(&bet).await.unwrap();
        store
            .reserve_and_debit(&user, ada(2), &op_key::stake(&bet.bet_id))
            .await
            .unwrap();
        store.close().await;
    }

    let config = EngineConfig {
        recovery_grace_secs: 0,
        ..EngineConfig::default()
    };
    let ctx = AppContext::with_config(temp_dir.path(), config, None).await.unwrap();

    assert_eq!(ctx.recovered().refunded, 1);
    assert_eq!(ctx.core.balance(&user).await.unwrap(), ada(5));
    ctx.close().await;
}

/// Test: signed webhooks are accepted once, unsigned ones refused
#[tokio::test]
async fn test_signed_webhook() {
    let temp_dir = TempDir::new().unwrap();
    let signer = WebhookSigner::generate();
    let verifier = WebhookVerifier::from_hex(&signer.public_key_hex()).unwrap();
    let ctx = AppContext::with_config(temp_dir.path(), EngineConfig::default(), Some(verifier))
        .await
        .unwrap();

    let body = br#"{"txHash":"abc","userKey":"carol","amount":5000000,"confirmations":3}"#;
    let unsigned = WebhookRequest {
        body,
        timestamp: None,
        signature: None,
    };
    assert!(ctx.webhook.handle(unsigned).await.is_err());

    let signature = signer.sign("1700000000", body);
    let signed = WebhookRequest {
        body,
        timestamp: Some("1700000000"),
        signature: Some(signature.as_str()),
    };
    assert!(matches!(
        ctx.webhook.handle(signed).await.unwrap(),
        DepositOutcome::Credited { .. }
    ));
    assert!(matches!(
        ctx.webhook.handle(signed).await.unwrap(),
        DepositOutcome::AlreadyProcessed { .. }
    ));
    assert_eq!(ctx.core.balance(&UserKey::from("carol")).await.unwrap(), ada(5));

    // The file-based CLI path goes through the same handler
    let body_path = temp_dir.path().join("body.json");
    std::fs::write(&body_path, body).unwrap();
    commands::webhook(&ctx, &body_path, Some("1700000000"), Some(signature.as_str()))
        .await
        .unwrap();
    assert_eq!(ctx.core.balance(&UserKey::from("carol")).await.unwrap(), ada(5));
    ctx.close().await;
}

/// Test: command line options reach the registry
#[tokio::test]
async fn test_run_with_args() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = open(&temp_dir).await;

    commands::deposit(&ctx, "dave", dec!(3), "tx-d", 3).await.unwrap();
    let args = vec!["amount=1.5".to_string(), "prediction=2".into(), "seed=abc".into()];
    commands::run(&ctx, "dice", "dave", &args).await.unwrap();

    let bets = ctx.core.wagers().recent_bets(&UserKey::from("dave"), 10).await.unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].stake, Amount::from_minor(1_500_000));

    assert!(commands::run(&ctx, "slots", "dave", &[]).await.is_err());
    assert!(commands::run(&ctx, "dice", "dave", &["amount=1".to_string()]).await.is_err());
    ctx.close().await;
}

/// Test: operator recovery defaults to the configured grace period
#[tokio::test]
async fn test_recover_respects_configured_grace() {
    let temp_dir = TempDir::new().unwrap();
    let user = UserKey::from("erin");
    let bet = BetRecord::new(BetId::generate(), user.clone(), ada(2), 4, "s".into());

    {
        let store = SqliteStore::open(&temp_dir.path().join("dicebank.db")).await.unwrap();
        store.credit(&user, ada(5), "deposit:tx-e").await.unwrap();
        store.insert_bet(&bet).await.unwrap();
        store
            .reserve_and_debit(&user, ada(2), &op_key::stake(&bet.bet_id))
            .await
            .unwrap();
        store.close().await;
    }

    // The bet is younger than the default 60s grace: neither startup nor a bare recover touch it
    let ctx = open(&temp_dir).await;
    assert_eq!(ctx.recovered().refunded, 0);
    commands::recover(&ctx, None).await.unwrap();
    assert_eq!(ctx.core.wagers().bet(&bet.bet_id).await.unwrap().status, BetStatus::Pending);
    assert_eq!(ctx.core.balance(&user).await.unwrap(), ada(3));

    commands::recover(&ctx, Some(0)).await.unwrap();
    assert_eq!(ctx.core.wagers().bet(&bet.bet_id).await.unwrap().status, BetStatus::Failed);
    assert_eq!(ctx.core.balance(&user).await.unwrap(), ada(5));

    assert!(commands::recover(&ctx, Some(u64::MAX)).await.is_err());
    ctx.close().await;
}
