mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use intake::queue::{FileQueue, QueueError, TaskQueue};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "taskgate", about = "Task intake gateway")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the intake gateway
    Serve {
        /// YAML config file. Configuration is read from the environment when omitted.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Remove every queued task and print them as a JSON array
    Drain {
        #[arg(long)]
        queue: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("intake error: {0}")]
    Intake(#[from] intake::errors::IntakeError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("could not serialize queue: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Serve { config } => {
            let config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::from_env()?,
            };
            let _sentry = init_logging(config.common.logging.as_ref());
            init_metrics(config.common.metrics.as_ref())?;

            // Handlers yield at every network or disk operation
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(intake::run(config.intake))?;
        }
        CliCommand::Drain { queue } => {
            let _sentry = init_logging(None);
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let queue = FileQueue::new(queue);
            let records = rt.block_on(queue.drain())?;
            tracing::info!(count = records.len(), path = %queue.path().display(), "Drained queue");
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// Logs go to stderr so `drain` output stays machine readable.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(metrics_config: Option<&MetricsConfig>) -> Result<(), CliError> {
    let Some(metrics_config) = metrics_config else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(metrics_config.statsd_host.as_str(), metrics_config.statsd_port)
        .build(Some("taskgate"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_metrics(intake::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
