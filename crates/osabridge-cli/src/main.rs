use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::BridgeConfig;
use osabridge_core::{Dispatcher, Handlers, ScriptExecutor, create_automation};

#[derive(Parser)]
#[command(name = "osabridge")]
#[command(version)]
#[command(about = "Line-oriented JSON bridge for macOS UI automation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (also OSABRIDGE_DEBUG=1)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin and write results to stdout (default)
    Serve,

    /// Show the effective configuration
    Config,
}

fn debug_from_env() -> bool {
    std::env::var("OSABRIDGE_DEBUG")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug || debug_from_env();

    // stdout carries the protocol; logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(&cli.config, debug).await,
        Commands::Config => cmd_config(&cli.config),
    }
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = BridgeConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>, debug: bool) -> Result<()> {
    let cfg = BridgeConfig::load(config_path)?;

    let executor = Arc::new(ScriptExecutor::new(cfg.executor_config()));
    let automation = create_automation(Arc::clone(&executor), cfg.automation_config());
    let handlers = Handlers::new(executor, automation, cfg.handler_config());
    let dispatcher = Dispatcher::new(handlers).with_debug(debug);

    info!(
        "osabridge {} started (interpreter: {})",
        env!("CARGO_PKG_VERSION"),
        cfg.executor.interpreter
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = dispatcher.run(stdin, stdout) => {
            result.context("Command loop I/O failed")?;
        }
        _ = signal::ctrl_c() => {
            // dropping the loop kills any interpreter still running
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("osabridge stopped");
    Ok(())
}
