//! Pumuki collection backend.
//!
//! Receives hotspot ingestion payloads over HTTP, deduplicates them by
//! idempotency key and serves cross-repository federation views.

#![forbid(unsafe_code)]

mod analytics;
mod collector;
mod federation;
mod http_api;
mod metrics;
mod reconcile;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use pumuki_common::logging::{LogConfig, init_logging};
use pumuki_ingest::governance::{fingerprint, load_policy};
use tracing::info;

use collector::Collector;
use http_api::HttpState;
use metrics::IngestMetrics;

#[derive(Parser)]
#[command(name = "pumukid")]
#[command(author, version, about = "Pumuki collection backend - hotspot ingestion and federation")]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1", env = "PUMUKID_BIND")]
    bind: IpAddr,

    /// HTTP port
    #[arg(short, long, default_value = "8417", env = "PUMUKID_PORT")]
    port: u16,

    /// Governance policy file to enforce (repeatable, one per repository)
    #[arg(long = "policy")]
    policies: Vec<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    info!("Starting pumukid...");

    let collector = Arc::new(Collector::new());
    for path in &cli.policies {
        let policy = load_policy(path)
            .with_context(|| format!("failed to load governance policy {}", path.display()))?;
        info!(
            path = %path.display(),
            fingerprint = %fingerprint(&policy),
            "Loaded governance policy"
        );
        collector.register_policy(policy).await;
    }

    let registry = Registry::new();
    let state = HttpState {
        collector,
        metrics: IngestMetrics::new(&registry)?,
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
    };

    let addr = SocketAddr::new(cli.bind, cli.port);
    let server = http_api::start_server(addr, state).await;
    server.await??;

    info!("pumukid stopped");
    Ok(())
}
