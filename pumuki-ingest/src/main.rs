//! Hotspot ingestion CLI.
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pumuki_common::contract::{self, ContractArtifact, PayloadBuilder, SourceMode};
use pumuki_common::errors::ErrorCode;
use pumuki_common::report::{LocalHotspotsReport, TddBddSnapshot};
use pumuki_common::{EnvParser, LogConfig, init_logging};
use pumuki_ingest::audit::AuditLog;
use pumuki_ingest::config::IngestConfig;
use pumuki_ingest::diagnostics::{DiagnosticsStatus, diagnose};
use pumuki_ingest::metrics::{MetricsSnapshot, write_metrics};
use pumuki_ingest::transport::{HttpIngestionClient, IngestionTransport, SendRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pumuki-ingest", about = "Build and publish Pumuki hotspot ingestion payloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root that relative artifact paths resolve against
    #[arg(long, global = true, default_value = ".")]
    repo_root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the contract artifact from a local hotspots report
    Build {
        /// Local hotspots report (JSON)
        #[arg(long)]
        report: PathBuf,

        #[arg(long)]
        tenant_id: String,

        #[arg(long)]
        repository_id: String,

        /// Display name; defaults to the repository id
        #[arg(long)]
        repository_name: Option<String>,

        #[arg(long)]
        default_branch: Option<String>,

        /// Collection mode (local, hook or ci)
        #[arg(long, default_value = "local")]
        mode: SourceMode,

        /// TDD/BDD compliance snapshot (JSON)
        #[arg(long)]
        tdd_bdd: Option<PathBuf>,

        /// Pin generated_at (RFC 3339) instead of using the current time
        #[arg(long)]
        generated_at: Option<String>,

        /// Override the payload artifact path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Publish the contract artifact and record the outcome
    Publish {
        /// Override the configured endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Explicit idempotency key
        #[arg(long)]
        idempotency_key: Option<String>,

        /// Extra request header as NAME=VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },

    /// Aggregate the audit log into the metrics artifact
    Metrics,

    /// Report publish health
    Diagnostics,

    /// Audit log maintenance
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Print the payload JSON Schema
    Schema,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Drop events older than the governance audit retention
    Prune,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

fn catalog_error(code: ErrorCode, detail: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}\n{}", detail, code.entry().format_full())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut env = EnvParser::new();
    let mut log_config = LogConfig::from_parser(&mut env, "info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = IngestConfig::load(&cli.repo_root, &mut env)
        .map_err(|err| catalog_error(err.catalog_code(), &err))?;

    match cli.command {
        Commands::Build {
            report,
            tenant_id,
            repository_id,
            repository_name,
            default_branch,
            mode,
            tdd_bdd,
            generated_at,
            output,
        } => {
            let report = LocalHotspotsReport::from_path(&report)
                .map_err(|err| catalog_error(ErrorCode::ContractReportUnreadable, err))?;
            let name = repository_name.unwrap_or_else(|| repository_id.clone());
            let mut builder =
                PayloadBuilder::new(tenant_id, repository_id, name, env!("CARGO_PKG_VERSION"))
                    .source_mode(mode);
            if let Some(branch) = default_branch {
                builder = builder.default_branch(branch);
            }
            if let Some(generated_at) = generated_at {
                builder = builder.generated_at(generated_at);
            }
            if let Some(path) = tdd_bdd {
                let snapshot = TddBddSnapshot::from_path(&path)
                    .map_err(|err| catalog_error(ErrorCode::ContractReportUnreadable, err))?;
                builder = builder.tdd_bdd(snapshot);
            }
            let payload = builder
                .build(&report)
                .map_err(|err| catalog_error(err.catalog_code(), &err))?;

            let path = output.map_or(config.paths.payload.clone(), |p| resolve(&cli.repo_root, p));
            contract::write_artifact(&path, &payload)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), payload_hash = %payload.integrity.payload_hash, "Wrote contract artifact");
            println!("{}", path.display());
        }

        Commands::Publish {
            endpoint,
            idempotency_key,
            headers,
        } => return publish(&config, endpoint, idempotency_key, headers).await,

        Commands::Metrics => {
            let events = AuditLog::new(&config.paths.audit).read_events()?;
            let snapshot = MetricsSnapshot::new(&config.paths.audit, &events, Utc::now());
            write_metrics(&config.paths.metrics, &snapshot)
                .map_err(|err| catalog_error(ErrorCode::AuditMetricsWriteFailed, err))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Commands::Diagnostics => {
            let report = diagnose(&config.paths, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == DiagnosticsStatus::Blocked {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Audit {
            command: AuditCommands::Prune,
        } => {
            let Some(governance) = config
                .governance()
                .map_err(|err| catalog_error(err.catalog_code(), &err))?
            else {
                bail!("audit prune needs a governance_policy in the ingestion config");
            };
            let report = AuditLog::new(&config.paths.audit)
                .prune(&governance.policy, Utc::now())
                .map_err(|err| catalog_error(err.catalog_code(), &err))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&contract::contract_json_schema())?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve(repo_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { repo_root.join(path) }
}

async fn publish(
    config: &IngestConfig,
    endpoint: Option<String>,
    idempotency_key: Option<String>,
    headers: Vec<(String, String)>,
) -> Result<ExitCode> {
    let Some(endpoint) = endpoint
        .filter(|e| !e.trim().is_empty())
        .or_else(|| config.endpoint.value.clone())
    else {
        return Err(catalog_error(ErrorCode::ConfigMissingEndpoint, "no endpoint"));
    };

    let payload = match contract::read_artifact(&config.paths.payload) {
        ContractArtifact::Valid { contract, .. } => contract,
        ContractArtifact::Missing { path } => {
            return Err(catalog_error(ErrorCode::ContractMissing, path.display()));
        }
        ContractArtifact::Invalid { path, reason, .. } => {
            return Err(catalog_error(
                ErrorCode::ContractInvalidSchema,
                format!("{}: {reason}", path.display()),
            ));
        }
    };

    let governance = config
        .governance()
        .map_err(|err| catalog_error(err.catalog_code(), &err))?;
    if let Some(governance) = &governance {
        governance
            .validate(&payload)
            .map_err(|violation| catalog_error(violation.catalog_code(), &violation))?;
    }

    let client = HttpIngestionClient::new().context("building HTTP client")?;
    let transport = IngestionTransport::new(client, config.limits());

    let mut request = SendRequest::new(&endpoint, &payload)
        .credentials(config.credentials.clone())
        .auth_policy(config.auth_policy.as_ref());
    if let Some(key) = idempotency_key.as_deref() {
        request = request.idempotency_key(key);
    }
    for (name, value) in headers {
        request = request.header(name, value);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; aborting publish");
            on_interrupt.cancel();
        }
    });

    let result = transport.send(&request, &cancel).await;

    AuditLog::new(&config.paths.audit)
        .record(&endpoint, &payload, &result, governance.as_ref(), Utc::now())
        .map_err(|err| catalog_error(err.catalog_code(), &err))?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    match result.catalog_code() {
        None => Ok(ExitCode::SUCCESS),
        Some(code) => {
            eprintln!("{}", code.entry().format_brief());
            Ok(ExitCode::FAILURE)
        }
    }
}
