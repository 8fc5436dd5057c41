//! Auto-miner CLI
//!
//! Keeps a dev node mining only while it has pending transactions.

use clap::{Parser, Subcommand};
use dev_automine::config::AutomineConfig;
use dev_automine::control::{Controller, Reconciler};
use dev_automine::ledger::{MiningService, RpcClient, TxPool};
use std::num::NonZeroU32;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "automine")]
#[command(version)]
#[command(about = "Mine on a dev node only while transactions are pending", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node WebSocket endpoint (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Mining thread count (overrides the config file)
    #[arg(short, long)]
    threads: Option<NonZeroU32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the node and toggle mining until Ctrl-C (default)
    Run,

    /// Reconcile once and exit
    Check,

    /// Show pending transactions and mining state without changing anything
    Status,

    /// Print the effective configuration as JSON
    Config {
        /// Write it to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AutomineConfig::load(path)?,
        None => AutomineConfig::default(),
    }
    .with_overrides(cli.endpoint, cli.threads);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config { output } => cmd_config(&config, output),
        Commands::Run => tokio::runtime::Runtime::new()?.block_on(cmd_run(&config)),
        Commands::Check => tokio::runtime::Runtime::new()?.block_on(cmd_check(&config)),
        Commands::Status => tokio::runtime::Runtime::new()?.block_on(cmd_status(&config)),
    }
}

fn cmd_config(
    config: &AutomineConfig,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            config.save(&path)?;
            println!("✅ Configuration written to {:?}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

async fn cmd_run(config: &AutomineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = RpcClient::connect(config).await?;
    log::info!(
        "Auto-mining on {} with {} thread(s)",
        client.endpoint(),
        config.threads
    );

    let controller = Controller::new(client, config);
    controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn cmd_check(config: &AutomineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = RpcClient::connect(config).await?;
    let reconciler = Reconciler::new(client, config.threads);

    match reconciler.reconcile().await? {
        Some(status) => println!("{}", status),
        None => println!("== Pending transactions, already mining."),
    }

    Ok(())
}

async fn cmd_status(config: &AutomineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = RpcClient::connect(config).await?;
    let pending = client.pending_count().await?;
    let mining = client.is_mining().await?;

    println!("📡 Node: {}", client.endpoint());
    println!("   ├─ Pending transactions: {}", pending);
    println!("   └─ Mining: {}", if mining { "yes" } else { "no" });

    Ok(())
}
