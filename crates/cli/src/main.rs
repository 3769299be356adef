//! esign - operator CLI for the e-sign persistence core
//!
//! Commands run against the snapshot store selected by `ESIGN_DATABASE_DSN`:
//! - issue-signing-token: mint a token and print the raw value
//! - dispatch-outbox: run one dispatch batch through the logging publisher
//! - outbox-stats: print outbox counts per status
//!
//! Logs go to stderr; stdout carries only command output.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use esign_server_application::{DispatchRequest, OutboxDispatcher, SigningTokenService};
use esign_server_domain::Scope;
use esign_server_domain::outbox::OutboxRepository;
use esign_server_infrastructure::SqliteSnapshotStore;
use esign_server_infrastructure::messaging::LoggingPublisher;
use esign_server_infrastructure::observability::init_tracing;
use esign_shared::config::{ConfigLoader, EsignConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "esign")]
#[command(about = "Operator CLI for the e-sign persistence core", long_about = None)]
#[command(version)]
struct Cli {
    /// Optional .env file loaded before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Output format for outbox commands
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args, Clone)]
struct ScopeArgs {
    #[arg(long)]
    tenant_id: String,
    #[arg(long)]
    org_id: String,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::new(self.tenant_id.clone(), self.org_id.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a signing token and print it
    IssueSigningToken {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        agreement_id: String,
        #[arg(long)]
        recipient_id: String,
    },
    /// Run one outbox dispatch batch
    DispatchOutbox {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Claim limit (default: ESIGN_OUTBOX_BATCH_SIZE)
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Print outbox counts per status
    OutboxStats {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::new(cli.env_file.clone())
        .load()
        .context("loading configuration")?;
    let logging = init_tracing(&config.logging);
    for err in &logging.errors {
        eprintln!("warning: {}", err);
    }

    let store = Arc::new(
        SqliteSnapshotStore::from_config(&config.database)
            .await
            .context("opening snapshot store")?,
    );

    let outcome = execute(&cli, &config, store.clone()).await;
    let closed = store.close().await.context("closing snapshot store");
    outcome.and(closed)
}

async fn execute(cli: &Cli, config: &EsignConfig, store: Arc<SqliteSnapshotStore>) -> Result<()> {
    match &cli.command {
        Commands::IssueSigningToken {
            scope,
            agreement_id,
            recipient_id,
        } => {
            let service = SigningTokenService::from_config(store, &config.signing);
            let issued = service
                .issue(&scope.scope(), agreement_id, recipient_id)
                .await
                .context("issuing signing token")?;
            let raw = issued
                .token
                .expose_str()
                .context("token is not valid UTF-8")?;
            info!(
                token_id = %issued.record.id,
                expires_at = %issued.record.expires_at,
                "Token issued"
            );
            println!("{}", raw);
        }
        Commands::DispatchOutbox {
            scope,
            limit,
            topic,
        } => {
            let dispatcher = OutboxDispatcher::new(store, Arc::new(LoggingPublisher))
                .with_publish_timeout(Duration::from_secs(config.outbox.publish_timeout_secs));
            let mut request = DispatchRequest::from_config(scope.scope(), &config.outbox);
            if let Some(limit) = limit {
                request.limit = *limit;
            }
            if let Some(topic) = topic {
                request = request.with_topic(topic.clone());
            }
            let result = dispatcher
                .dispatch_batch(request)
                .await
                .context("dispatching outbox batch")?;
            if let Some(err) = result.error() {
                warn!(error = %err, "Some outbox rows could not be settled");
            }
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
                OutputFormat::Text => println!(
                    "claimed={} published={} retrying={} failed={}",
                    result.claimed, result.published, result.retrying, result.failed
                ),
            }
            if let Some(err) = result.error() {
                return Err(err).context("settling outbox rows");
            }
        }
        Commands::OutboxStats { scope } => {
            let stats = store
                .outbox_stats(&scope.scope())
                .await
                .context("reading outbox stats")?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&stats)?),
                OutputFormat::Text => println!(
                    "pending={} processing={} retrying={} succeeded={} failed={} backlog={}",
                    stats.pending,
                    stats.processing,
                    stats.retrying,
                    stats.succeeded,
                    stats.failed,
                    stats.backlog()
                ),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_issue_signing_token_args() {
        let cli = Cli::try_parse_from([
            "esign",
            "issue-signing-token",
            "--tenant-id",
            "t1",
            "--org-id",
            "o1",
            "--agreement-id",
            "a1",
            "--recipient-id",
            "r1",
        ])
        .unwrap();
        match cli.command {
            Commands::IssueSigningToken {
                scope,
                agreement_id,
                recipient_id,
            } => {
                assert_eq!(scope.scope(), Scope::new("t1", "o1"));
                assert_eq!((agreement_id.as_str(), recipient_id.as_str()), ("a1", "r1"));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_scope_flags_are_required() {
        assert!(Cli::try_parse_from(["esign", "outbox-stats", "--tenant-id", "t1"]).is_err());
    }
}
