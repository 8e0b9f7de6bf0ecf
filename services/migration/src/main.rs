use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use migration_service::config::Config;
use migration_service::enumerator::{EntityKindSpec, ReferenceEnumerator};
use migration_service::fetcher::AssetFetcher;
use migration_service::orchestrator::{MigrationMode, MigrationOrchestrator, MigrationSettings};
use migration_service::publisher::{AssetPublisher, DestinationKeyPolicy};
use migration_service::updater::ReferenceUpdater;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    DryRun,
    Apply,
}

impl From<ModeArg> for MigrationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DryRun => MigrationMode::DryRun,
            ModeArg::Apply => MigrationMode::Apply,
        }
    }
}

/// Migrate stored image assets to the destination bucket and rewrite record paths
#[derive(Debug, Parser)]
#[command(name = "migration-service", version)]
struct Cli {
    /// Run mode; prompts interactively when omitted
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Configuration file overriding the default lookup locations
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A configuration error is the only fatal condition; per-item failures
    // only show up in the summary
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.service.log_level, &config.service.log_file)?;

    info!(
        service = %config.service.name,
        "Starting image asset migration"
    );

    let mode = match cli.mode {
        Some(mode) => mode.into(),
        None => prompt_for_mode()?,
    };

    let enumerator = ReferenceEnumerator::new(&config.record_store, EntityKindSpec::defaults())
        .context("Failed to initialize reference enumerator")?;
    let fetcher =
        AssetFetcher::new(&config.source).context("Failed to initialize asset fetcher")?;
    let publisher = AssetPublisher::new(&config.destination).await;
    let updater = ReferenceUpdater::new(&config.record_store)
        .context("Failed to initialize reference updater")?;

    let settings = MigrationSettings {
        pause: config.pause(),
        key_policy: DestinationKeyPolicy::from_prefix(config.destination.key_prefix.clone()),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let orchestrator =
        MigrationOrchestrator::new(enumerator, fetcher, publisher, updater, settings, cancel);

    let summary = orchestrator.run(mode).await;

    if summary.update_failures > 0 {
        warn!(
            update_failures = summary.update_failures,
            "Some assets are published but their records still point at the old path; reconcile manually"
        );
    }

    info!(
        mode = summary.mode.as_str(),
        migrated = summary.migrated,
        planned = summary.planned,
        failed = summary.failed(),
        total = summary.total,
        "Done"
    );

    Ok(())
}

/// Initialize tracing with a console layer and an append-only audit log file
fn init_tracing(log_level: &str, log_file: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let audit_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open audit log file {}", log_file))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(audit_file)))
        .init();

    Ok(())
}

/// Ask the operator for the run mode; anything but an explicit yes stays dry-run
fn prompt_for_mode() -> Result<MigrationMode> {
    print!("Apply changes? [y/N]: ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read run mode")?;

    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(MigrationMode::Apply),
        _ => Ok(MigrationMode::DryRun),
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
