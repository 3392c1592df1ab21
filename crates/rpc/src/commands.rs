//! CLI commands

use std::path::Path;

use dicebank_core::{Amount, RoundId, TxHash, UserKey};
use dicebank_engine::{
    recovery_grace_from_secs, BetOutcome, CommandInput, CommandReply, DepositConfirmation,
    DepositOutcome, Rejection, WebhookRequest,
};
use rust_decimal::Decimal;

use crate::context::AppContext;

/// Run a registry command and print its reply
pub async fn run(ctx: &AppContext, name: &str, user: &str, args: &[String]) -> Result<(), anyhow::Error> {
    let input = CommandInput::from_args(UserKey::from(user), args)?;
    let reply = ctx.run(name, &input).await?;
    print_reply(&reply);
    Ok(())
}

/// List the commands a front end can dispatch
pub fn list(ctx: &AppContext) {
    for (name, description) in ctx.registry.describe() {
        println!("  {:<12} {}", name, description);
    }
}

pub fn print_reply(reply: &CommandReply) {
    match reply {
        CommandReply::Balance {
            user_key,
            balance,
            pending_deposits,
        } => {
            println!("💰 Balance for {}: {} ADA", user_key, balance);
            if *pending_deposits > 0 {
                println!("   {} deposit(s) awaiting confirmations", pending_deposits);
            }
        }
        CommandReply::DepositAddress(address) => {
            println!("📥 Deposit address for {}", address.user_key);
            println!("   {}", address.address);
            println!("   Minimum deposit: {} ADA", address.min_deposit);
            println!("   Expires: {}", address.expires_at.format("%Y-%m-%d %H:%M UTC"));
        }
        CommandReply::Commitment(commitment) => {
            println!("🔒 Next round {}", commitment.round_id);
            println!("   Server seed hash: {}", commitment.server_seed_hash);
        }
        CommandReply::Bet(BetOutcome::Settled(bet)) => {
            if bet.won {
                println!("🎉 Rolled {}! You won {} ADA", bet.outcome, bet.payout);
            } else {
                println!("🎲 Rolled {} (you picked {}). Better luck next time", bet.outcome, bet.prediction);
            }
            println!("   Balance: {} ADA", bet.balance);
            println!("   Bet: {}", bet.bet_id);
            println!("   Server seed: {}", bet.proof.server_seed);
            println!("   Server seed hash: {}", bet.proof.server_seed_hash);
            println!("   Client seed: {} (nonce {})", bet.proof.client_seed, bet.proof.nonce);
        }
        CommandReply::Bet(BetOutcome::Rejected(rejection)) => print_rejection(rejection),
        CommandReply::Stats { user_key, stats } => {
            println!("📊 Stats for {}", user_key);
            println!("   Bets: {} ({} won, {}%)", stats.total_bets, stats.wins, stats.win_rate);
            println!("   Wagered: {} ADA", stats.total_wagered);
            println!("   Won: {} ADA (biggest {} ADA)", stats.total_won, stats.biggest_win);
            println!("   Profit: {} ADA", stats.profit);
        }
        CommandReply::Verified(proof) => {
            println!("✅ Roll verified: {}", proof.outcome);
            println!("   sha256({}) = {}", proof.server_seed, proof.server_seed_hash);
            println!("   client seed {}, nonce {}", proof.client_seed, proof.nonce);
        }
    }
}

fn print_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::InsufficientFunds { available, required } => {
            println!("❌ Insufficient balance: have {} ADA, need {} ADA", available, required);
        }
        Rejection::InsufficientConfirmations { have, need } => {
            println!("⏳ Waiting for confirmations: {}/{}", have, need);
        }
    }
}

fn print_deposit(outcome: &DepositOutcome) {
    match outcome {
        DepositOutcome::Credited {
            tx_hash,
            user_key,
            amount,
            balance,
        } => {
            println!("✅ Credited {} ADA to {} (tx: {})", amount, user_key, tx_hash);
            println!("   Balance: {} ADA", balance);
        }
        DepositOutcome::AlreadyProcessed { tx_hash, processed_at } => {
            println!("ℹ️  Deposit {} already processed at {}", tx_hash, processed_at);
        }
        DepositOutcome::Rejected(rejection) => print_rejection(rejection),
    }
}

/// Feed a confirmed deposit straight to the reconciler
pub async fn deposit(
    ctx: &AppContext,
    user: &str,
    amount: Decimal,
    tx_hash: &str,
    confirmations: u32,
) -> Result<(), anyhow::Error> {
    let confirmation = DepositConfirmation {
        tx_hash: TxHash::from(tx_hash),
        user_key: UserKey::from(user),
        amount: Amount::from_decimal(amount)?,
        confirmations,
    };
    let outcome = ctx.core.on_deposit_confirmed(&confirmation).await?;
    print_deposit(&outcome);
    Ok(())
}

/// Deliver a webhook body read from a file
pub async fn webhook(
    ctx: &AppContext,
    body_path: &Path,
    timestamp: Option<&str>,
    signature: Option<&str>,
) -> Result<(), anyhow::Error> {
    let body = std::fs::read(body_path)?;
    let outcome = ctx
        .webhook
        .handle(WebhookRequest {
            body: &body,
            timestamp,
            signature,
        })
        .await?;
    print_deposit(&outcome);
    Ok(())
}

/// Print a user's recent balance operations
pub async fn history(ctx: &AppContext, user: &str, limit: usize) -> Result<(), anyhow::Error> {
    let user = UserKey::from(user);
    let ops = ctx.core.history(&user, limit).await?;

    if ops.is_empty() {
        println!("No operations for {}", user);
        return Ok(());
    }

    println!("{:<20} {:<8} {:>14} {:>14}  KEY", "TIME", "KIND", "AMOUNT", "BALANCE");
    for op in ops {
        println!(
            "{:<20} {:<8} {:>14} {:>14}  {}",
            op.created_at.format("%Y-%m-%d %H:%M:%S"),
            op.kind.to_string(),
            op.amount.to_string(),
            op.balance_after.to_string(),
            op.key
        );
    }
    Ok(())
}

/// Print a user's recent bets
pub async fn bets(ctx: &AppContext, user: &str, limit: usize) -> Result<(), anyhow::Error> {
    let user = UserKey::from(user);
    let bets = ctx.core.wagers().recent_bets(&user, limit).await?;

    if bets.is_empty() {
        println!("No bets for {}", user);
        return Ok(());
    }

    println!("{:<36} {:>10} {:>4} {:>4} {:>10}  STATUS", "BET", "STAKE", "PICK", "ROLL", "PAYOUT");
    for bet in bets {
        let roll = bet.outcome.map(|o| o.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<36} {:>10} {:>4} {:>4} {:>10}  {}",
            bet.bet_id.to_string(),
            bet.stake.to_string(),
            bet.prediction,
            roll,
            bet.payout.to_string(),
            bet.status
        );
    }
    Ok(())
}

/// Run the recovery sweep; without a grace period the configured one applies
pub async fn recover(ctx: &AppContext, grace_secs: Option<u64>) -> Result<(), anyhow::Error> {
    let grace = match grace_secs {
        Some(secs) => recovery_grace_from_secs(secs)?,
        None => ctx.core.config().recovery_grace()?,
    };
    let report = ctx.core.wagers().recover_pending(grace).await?;
    println!(
        "✅ Recovery: {} discarded, {} settled, {} refunded",
        report.discarded, report.settled, report.refunded
    );
    Ok(())
}

/// Show a round's seed if it has been revealed
pub async fn audit(ctx: &AppContext, round: &str) -> Result<(), anyhow::Error> {
    let round_id = RoundId::from(round);
    match ctx.core.seeds().audit(&round_id).await? {
        Some(revealed) => {
            println!("✅ Round {} revealed", revealed.round_id);
            println!("   Server seed: {}", revealed.server_seed);
            println!("   Server seed hash: {}", revealed.server_seed_hash);
            if let Some(bet) = revealed.claimed_by {
                println!("   Bet: {}", bet);
            }
        }
        None => println!("🔒 Round {} is still sealed", round_id),
    }
    Ok(())
}
