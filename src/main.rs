//! Block-triggered deposit runner.
//!
//! ```text
//! block-deposit --config deposit.toml check    validate config, derive the signer (offline)
//! block-deposit --config deposit.toml status   chain id, block, allowance, nonce
//! block-deposit --config deposit.toml run      deposit on every new block until Ctrl-C
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use block_deposit::config::{load_config, read_secret, BroadcastStrategy, DepositConfig};
use block_deposit::deposit::task::connect_node;
use block_deposit::deposit::{DepositEngine, DepositTask, StopReason};
use block_deposit::lifecycle::shutdown_signal;
use block_deposit::observability::{init_logging, init_metrics};
use block_deposit::NodeClient;

#[derive(Parser)]
#[command(name = "block-deposit")]
#[command(about = "Submit a token deposit on every new block", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "deposit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the deposit task and run until stopped
    Run,
    /// Validate the configuration and secrets without touching the network
    Check,
    /// Print chain id, latest block, allowance and nonce for the signer
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability);

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Check => check(&config),
        Commands::Status => status(&config).await,
    }
}

async fn run(config: DepositConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = DepositEngine::from_config(&config).await?;
    let mut handle = engine.start();

    let signalled = tokio::select! {
        _ = shutdown_signal() => true,
        _ = handle.finished() => false,
    };
    if signalled {
        handle.stop();
    }

    let outcome = handle.join().await;
    tracing::info!(
        submissions = outcome.submissions.len(),
        nonce_cursor = ?outcome.nonce_cursor,
        "Shutdown complete"
    );

    match outcome.reason {
        StopReason::Failed(e) => Err(e.into()),
        StopReason::Cancelled | StopReason::Completed => Ok(()),
    }
}

fn check(config: &DepositConfig) -> Result<(), Box<dyn std::error::Error>> {
    let task = DepositTask::from_env(config)?;

    if config.broadcast.strategy == BroadcastStrategy::RelayBundle {
        read_secret(&config.broadcast.relay.auth_env)?;
    }

    println!("signer:    {}", task.identity.address());
    println!("token:     {}", task.token);
    println!("target:    {}", task.target);
    println!("amount:    {} base units", task.amount);
    println!("gas:       {} @ {} wei", task.gas_limit, task.deposit_gas_price());
    println!("broadcast: {:?}", config.broadcast.strategy);
    println!("mode:      {:?}", task.mode);
    println!("Configuration OK");
    Ok(())
}

async fn status(config: &DepositConfig) -> Result<(), Box<dyn std::error::Error>> {
    let task = DepositTask::from_env(config)?;
    let node = connect_node(config).await?;
    let owner = task.identity.address();

    let chain_id = node.chain_id().await?;
    let block = node.block_number().await?;
    let allowance = node.allowance(task.token, owner, task.target).await?;
    let nonce = node.transaction_count(owner).await?;

    println!("chain id:  {}", chain_id);
    println!("block:     {}", block);
    println!("signer:    {}", owner);
    println!("allowance: {} (required {})", allowance, task.amount);
    println!("nonce:     {}", nonce);
    Ok(())
}
