//! Wipe the conversation memory database.

use std::path::PathBuf;

use clap::Parser;
use elysia::config::ElysiaConfig;
use elysia::memory::SqliteMemory;
use tracing_subscriber::EnvFilter;

/// Delete every stored message from Elysia's memory.
#[derive(Parser)]
#[command(name = "elysia-clear-memory", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database to clear instead of the configured one.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(ElysiaConfig::default_config_path);
    let mut config = ElysiaConfig::load_or_default(&config_path)?;
    config.apply_env_overrides();

    let db_path = cli.db.unwrap_or(config.memory.db_path);
    let store = SqliteMemory::open(&db_path, config.memory.recall_max_results)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", db_path.display()))?;
    let removed = store
        .clear()
        .map_err(|e| anyhow::anyhow!("failed to clear {}: {e}", db_path.display()))?;

    tracing::info!(removed, "memory cleared: {}", db_path.display());
    Ok(())
}
