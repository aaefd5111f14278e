//! zknode bootstrap runner.
//!
//! Starts one embedded coordination server on the client port (2181 unless
//! configured otherwise) and serves until SIGINT/SIGTERM.
//!
//! ```text
//!   CLI flags ──┐
//!               ▼
//!   config file ─▶ ServerConfig ─▶ startup::run_best_effort
//!                                     │
//!                    ┌────────────────┴────────────────┐
//!                    ▼                                 ▼
//!          TestingServer ready               StartupError
//!          serve until signal                diagnostic → stderr
//!          release port                      exit 0 (policy "log")
//!                                            exit 1 (policy "fail")
//! ```

use std::path::PathBuf;

use clap::Parser;

use zknode::config::{load_config, FailurePolicy, ServerConfig};
use zknode::lifecycle::{signals, startup};
use zknode::observability::{logging, metrics};
use zknode::StartupError;

#[derive(Parser)]
#[command(name = "zknode", version)]
#[command(about = "Standalone in-memory coordination server for tests", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Exit with a failure status when startup fails.
    #[arg(long)]
    fail_on_error: bool,

    /// Log output format: pretty or json.
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(host) = &self.host {
            config.listener.host = host.clone();
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format = format.clone();
        }
        if self.fail_on_error {
            config.startup.failure_policy = FailurePolicy::Fail;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => load_config(path),
        None => Ok(ServerConfig::default()),
    };

    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => {
            // Report with default logging; there is no usable config to run.
            let mut fallback = ServerConfig::default();
            cli.apply(&mut fallback);
            logging::init(&fallback.observability)?;
            startup::handle_failure(StartupError::Config(err), fallback.startup.failure_policy)?;
            return Ok(());
        }
    };
    cli.apply(&mut config);

    logging::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "zknode starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::warn!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run_best_effort(config, signals::shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
