use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use companyhub_api::app::{self, services, AppServices};
use companyhub_events::PublishQueue;
use companyhub_infra::{kafka, Config};

/// Config file picked up from the working directory when `-c` is not given.
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Parser)]
#[command(name = "companyhub", version, about = "Company registry with gRPC and REST APIs")]
struct Cli {
    /// Path to the configuration file (default: ./config.toml when present).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Overrides `general.log_level` (trace, debug, info, warn, error).
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the API server (default).
    Run,
    /// Print the effective configuration as TOML.
    Configfile,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = dispatch(cli).await {
        tracing::error!(error = ?err, "fatal");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let path = cli
        .config
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });
    let mut config = Config::load(path.as_deref()).context("load configuration")?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Configfile => {
            print!("{}", config.to_toml().context("render configuration")?);
            Ok(())
        }
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    companyhub_observability::init(&config.general.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting companyhub");

    let stores = services::connect_stores(&config.postgresql)
        .await
        .context("setup storage")?;
    let publisher = kafka::setup(&config.kafka).context("setup kafka")?;
    let queue = PublishQueue::start(publisher, config.kafka.queue());

    let services = AppServices::new(stores, &config.external_api.jwt_secret, queue.notifier())
        .context("setup api")?;
    let server = app::start(&config.external_api, services)
        .await
        .context("setup api")?;

    shutdown_signal().await;
    tracing::info!("stopping gracefully");

    server.shutdown().await;
    if !queue.shutdown(config.kafka.drain_timeout()).await {
        tracing::warn!("not every event was published before the drain deadline");
    }

    tracing::info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
