//! DiceBank CLI - Main entry point

use dicebank_engine::WebhookSigner;
use dicebank_rpc::{commands, AppContext};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dicebank")]
#[command(about = "DiceBank - provably fair dice over a custodial ADA balance", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Engine config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the commands available to players
    Commands,

    /// Check balance for a user
    Balance {
        /// User key
        user: String,
    },

    /// Roll the dice
    Dice {
        /// User key
        user: String,
        /// Stake in ADA
        amount: Decimal,
        /// Predicted face (1-6)
        prediction: u8,
        /// Client seed
        seed: String,
    },

    /// Show a deposit address for a user
    DepositAddress {
        /// User key
        user: String,
    },

    /// Show the server seed hash for a user's next roll
    Commitment {
        /// User key
        user: String,
    },

    /// Betting statistics for a user
    Stats {
        /// User key
        user: String,
    },

    /// Verify a settled bet
    Verify {
        /// User key that placed the bet
        user: String,
        /// Bet id
        bet: String,
    },

    /// Run any registered command with name=value options
    Run {
        /// Command name
        name: String,
        /// User key
        user: String,
        /// Options as name=value
        args: Vec<String>,
    },

    // === Operator commands ===

    /// Apply a confirmed deposit
    Deposit {
        /// User key
        user: String,
        /// Amount in ADA
        amount: Decimal,
        /// Transaction hash
        #[arg(long)]
        tx: String,
        /// Confirmation count
        #[arg(long, default_value = "3")]
        confirmations: u32,
    },

    /// Deliver a deposit webhook body from a file
    Webhook {
        /// JSON body file
        body: PathBuf,
        /// Timestamp header value
        #[arg(long)]
        timestamp: Option<String>,
        /// Hex Ed25519 signature header value
        #[arg(long)]
        signature: Option<String>,
    },

    /// Balance operations of a user
    History {
        /// User key
        user: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Recent bets of a user
    Bets {
        /// User key
        user: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Resolve bets left pending
    Recover {
        /// Only touch bets older than this many seconds [default: configured grace]
        #[arg(long)]
        grace_secs: Option<u64>,
    },

    /// Show a round's seed once revealed
    Audit {
        /// Round id
        round: String,
    },

    /// Generate a webhook signing key pair
    Keygen {
        /// Output file path for the private seed
        #[arg(long, default_value = "webhook.key")]
        output: PathBuf,
    },

    /// Sign a webhook body with a key file
    Sign {
        /// JSON body file
        body: PathBuf,
        /// Private seed file written by keygen
        #[arg(long, default_value = "webhook.key")]
        key: PathBuf,
        /// Timestamp to sign
        #[arg(long)]
        timestamp: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Key handling needs no database
    match &cli.command {
        Commands::Keygen { output } => {
            let signer = WebhookSigner::generate();
            let seed = signer.seed_hex();
            std::fs::write(output, &seed)?;
            println!("✅ Generated webhook signing key");
            println!("   Private key saved to: {}", output.display());
            println!("   Public key: {}", signer.public_key_hex());
            println!();
            println!("To verify webhooks: export DICEBANK_WEBHOOK_PUBKEY={}", signer.public_key_hex());
            return Ok(());
        }
        Commands::Sign { body, key, timestamp } => {
            let signer = WebhookSigner::from_hex(std::fs::read_to_string(key)?.trim())?;
            let body = std::fs::read(body)?;
            println!("{}", signer.sign(timestamp, &body));
            return Ok(());
        }
        _ => {}
    }

    // Create application context
    let ctx = AppContext::new(&cli.data, cli.config.as_deref()).await?;

    match cli.command {
        Commands::Commands => commands::list(&ctx),

        Commands::Balance { user } => {
            commands::run(&ctx, "balance", &user, &[]).await?;
        }

        Commands::Dice {
            user,
            amount,
            prediction,
            seed,
        } => {
            let args = [
                format!("amount={amount}"),
                format!("prediction={prediction}"),
                format!("seed={seed}"),
            ];
            commands::run(&ctx, "dice", &user, &args).await?;
        }

        Commands::DepositAddress { user } => {
            commands::run(&ctx, "deposit", &user, &[]).await?;
        }

        Commands::Commitment { user } => {
            commands::run(&ctx, "commitment", &user, &[]).await?;
        }

        Commands::Stats { user } => {
            commands::run(&ctx, "stats", &user, &[]).await?;
        }

        Commands::Verify { user, bet } => {
            commands::run(&ctx, "verify", &user, &[format!("bet={bet}")]).await?;
        }

        Commands::Run { name, user, args } => {
            commands::run(&ctx, &name, &user, &args).await?;
        }

        Commands::Deposit {
            user,
            amount,
            tx,
            confirmations,
        } => {
            commands::deposit(&ctx, &user, amount, &tx, confirmations).await?;
        }

        Commands::Webhook {
            body,
            timestamp,
            signature,
        } => {
            commands::webhook(&ctx, &body, timestamp.as_deref(), signature.as_deref()).await?;
        }

        Commands::History { user, limit } => {
            commands::history(&ctx, &user, limit).await?;
        }

        Commands::Bets { user, limit } => {
            commands::bets(&ctx, &user, limit).await?;
        }

        Commands::Recover { grace_secs } => {
            commands::recover(&ctx, grace_secs).await?;
        }

        Commands::Audit { round } => {
            commands::audit(&ctx, &round).await?;
        }

        Commands::Keygen { .. } | Commands::Sign { .. } => {}
    }

    ctx.close().await;
    Ok(())
}
