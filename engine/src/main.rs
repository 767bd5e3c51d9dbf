//! Call lifecycle decision engine over stdin/stdout.
//!
//! Reads one JSON [`CallEvent`] per line from stdin and writes one JSON
//! [`DecisionRecord`] per line to stdout. Logs go to stderr so the output
//! stream stays machine-readable.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (in-memory state, concurrency limit 3)
//! echo '{"call_id":"c-1","event_type":"CALL_STARTED"}' | callflow
//!
//! # Custom limits and policy
//! MAX_CONCURRENCY=10 callflow --policy-path ./policy.json
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use callflow::{CallEvent, EngineConfig, MemoryStore, Orchestrator, PolicyTable};
#[cfg(feature = "durable-state")]
use callflow::{DegradedStore, RocksStore};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum concurrently active calls (overrides MAX_CONCURRENCY)
    #[arg(long)]
    max_concurrency: Option<i64>,

    /// Path to a JSON healing policy table (defaults to the built-in matrix)
    #[arg(long)]
    policy_path: Option<std::path::PathBuf>,

    /// SLA sliding-window length in seconds (overrides SLA_WINDOW_SECONDS)
    #[arg(long)]
    window_secs: Option<u64>,

    /// Path to the RocksDB state directory for durable call state
    #[cfg(feature = "durable-state")]
    #[arg(long)]
    state_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env();
    if let Some(max) = args.max_concurrency {
        config.max_concurrency = max;
    }
    if let Some(window) = args.window_secs {
        config.sla.window_secs = window;
    }

    let table = match &args.policy_path {
        Some(path) => PolicyTable::from_json_file(path)
            .with_context(|| format!("loading policy table from {}", path.display()))?,
        None => PolicyTable::builtin(),
    };

    let engine = build_engine(&args, config, table)?;

    info!("decision engine ready; reading events from stdin");

    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: CallEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "skipping malformed event");
                continue;
            }
        };
        let decision = engine.handle_event(&event);
        let mut payload = serde_json::to_vec(&decision)?;
        payload.push(b'\n');
        out.write_all(&payload).await?;
        out.flush().await?;
    }

    Ok(())
}

#[cfg(feature = "durable-state")]
fn build_engine(args: &Args, config: EngineConfig, table: PolicyTable) -> Result<Orchestrator> {
    match &args.state_path {
        Some(path) => {
            let primary = RocksStore::open(path.clone())
                .with_context(|| format!("opening state store at {}", path.display()))?;
            Ok(Orchestrator::with_policy(
                Arc::new(DegradedStore::new(primary)),
                config,
                table,
            ))
        }
        None => Ok(Orchestrator::with_policy(
            Arc::new(MemoryStore::new()),
            config,
            table,
        )),
    }
}

#[cfg(not(feature = "durable-state"))]
fn build_engine(_args: &Args, config: EngineConfig, table: PolicyTable) -> Result<Orchestrator> {
    Ok(Orchestrator::with_policy(
        Arc::new(MemoryStore::new()),
        config,
        table,
    ))
}
