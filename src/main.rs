
use crate::load_test::{LoadTestConfig, run_load_test};
use anyhow::{Context, Result};
use atomic_upsert::{MemoryStoreConfig, UpsertConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "atomic-upsert")]
#[command(about = "Concurrent upsert convergence bench against the in-memory store")]
struct Cli {
    /// Concurrent tasks issuing upserts
    #[arg(long, default_value_t = 8)]
    workers: usize,
    /// Distinct identity keys shared by all workers
    #[arg(long, default_value_t = 16)]
    keys: usize,
    /// Upserts per worker
    #[arg(long, default_value_t = 500)]
    ops: usize,
    /// Every n-th key starts soft-deleted (0 disables)
    #[arg(long, default_value_t = 4)]
    soft_deleted_every: usize,
    /// Overrides the attempt budget from the config file
    #[arg(long)]
    max_attempts: Option<usize>,
    #[arg(long, default_value_t = 5000)]
    lock_timeout_ms: u64,
    /// JSON upsert configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut upsert = match &cli.config {
        Some(path) => UpsertConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => UpsertConfig::default(),
    };
    if let Some(max_attempts) = cli.max_attempts {
        upsert = upsert.max_attempts(max_attempts);
    }

    let report = run_load_test(LoadTestConfig {
        workers: cli.workers.max(1),
        keys: cli.keys,
        ops_per_worker: cli.ops,
        soft_deleted_every: cli.soft_deleted_every,
        upsert,
        store: MemoryStoreConfig::new()
            .lock_wait_timeout(Duration::from_millis(cli.lock_timeout_ms)),
    })
    .await
    .context("upsert bench failed")?;

    report.print();
    Ok(())
}
