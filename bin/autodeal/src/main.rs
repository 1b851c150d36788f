//! Autodeal daemon binary
//!
//! Runs in one of two modes:
//! - run: process every task assigned to this provider, once or on an interval
//! - task: process a single task by UUID

mod config;

use anyhow::{Context, Result};
use autodeal_artifacts::ArtifactWriter;
use autodeal_engine::{
    AutoDealService, BatchSummary, CoordinationClient, DriverConfig, EngineMetrics, NodeProposer,
    NodeProposerConfig, SubmissionDriver, TaskReconciler,
};
use clap::{Parser, Subcommand};
use config::Config;
use prometheus::{Encoder, Registry, TextEncoder};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type Service = AutoDealService<CoordinationClient, NodeProposer>;

#[derive(Parser)]
#[command(name = "autodeal")]
#[command(about = "Auto-bid storage deal submission", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(short, long, default_value = "autodeal.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Override the output directory from the config file
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Process every assigned task
    Run {
        /// Run a single batch and exit
        #[arg(long)]
        once: bool,
    },
    /// Process one task
    Task {
        /// Task UUID
        #[arg(long)]
        uuid: String,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn build_service(
    config: &Config,
    metrics: EngineMetrics,
    shutdown: watch::Receiver<bool>,
) -> Result<Service> {
    let coordinator = CoordinationClient::new(&config.coordinator_url)
        .context("failed to create coordination client")?;

    let proposer = NodeProposer::new(NodeProposerConfig {
        rpc_url: config.node_rpc_url.clone(),
        auth_token: config.node_auth_token.clone(),
        request_timeout: config.request_timeout(),
    })
    .context("failed to create storage node client")?;

    let driver = SubmissionDriver::new(DriverConfig {
        max_attempts: config.max_attempts,
        retry_delay: config.retry_delay(),
    });
    let reconciler = TaskReconciler::new(
        config.deal.clone(),
        driver,
        ArtifactWriter::new(&config.output_dir),
    )
    .with_metrics(metrics)
    .with_shutdown(shutdown);

    Ok(AutoDealService::new(coordinator, proposer, reconciler))
}

/// Rewrite the Prometheus text file, if one is configured.
fn export_metrics(registry: &Registry, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return;
    }
    if let Err(e) = std::fs::write(path, buffer) {
        warn!(path = %path.display(), error = %e, "Failed to write metrics file");
    }
}

fn log_summary(summary: &BatchSummary) {
    for outcome in &summary.completed {
        info!(
            task_id = %outcome.task.uuid,
            task_name = %outcome.task.task_name,
            sent = outcome.success_count(),
            total = outcome.total_offers(),
            summary = %outcome.artifacts.summary_path.display(),
            "Task result"
        );
    }
    for failure in &summary.failed {
        warn!(
            task_id = %failure.task_uuid,
            task_name = %failure.task_name,
            error = %failure.error,
            "Task not processed"
        );
    }
    if summary.interrupted {
        warn!("Batch interrupted, remaining tasks left for the next run");
    }
}

/// Flip `shutdown` on the first Ctrl+C.
///
/// The engine checks the flag between offers, so the proposal in flight
/// and its task's artifacts are always completed.
fn spawn_interrupt_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, finishing current offer");
                shutdown.send_replace(true);
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

async fn run_daemon(
    service: &mut Service,
    config: &Config,
    registry: &Registry,
    mut shutdown: watch::Receiver<bool>,
    once: bool,
) -> Result<()> {
    loop {
        match service.run_batch().await {
            Ok(summary) => log_summary(&summary),
            Err(e) if once => return Err(e.into()),
            Err(e) => error!(error = %e, "Batch failed"),
        }

        export_metrics(registry, config.metrics_file.as_deref());

        if once || *shutdown.borrow() {
            break;
        }

        tokio::select! {
            Ok(()) = shutdown.changed() => {
                info!("Interrupt received, stopping");
                break;
            }
            _ = tokio::time::sleep(config.poll_interval()) => {}
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json_logs)?;

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    info!("Starting autodeal");
    info!("Config: {}", cli.config.display());
    info!("Output directory: {}", config.output_dir.display());

    let registry = Registry::new();
    let metrics = EngineMetrics::new(&registry)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut service = build_service(&config, metrics, shutdown_rx.clone())?;
    spawn_interrupt_handler(shutdown_tx);

    match cli.command {
        Command::Run { once } => {
            run_daemon(&mut service, &config, &registry, shutdown_rx, once).await?;
        }
        Command::Task { uuid } => {
            let result = service.run_single(&uuid).await;
            export_metrics(&registry, config.metrics_file.as_deref());

            let outcome = result?;
            info!(
                task_id = %outcome.task.uuid,
                sent = outcome.success_count(),
                total = outcome.total_offers(),
                status = ?outcome.status,
                interrupted = outcome.interrupted,
                summary = %outcome.artifacts.summary_path.display(),
                "Task processed"
            );
        }
    }

    info!("Autodeal stopped");
    Ok(())
}
