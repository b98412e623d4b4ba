//! IoT hub gateway - Main Entry Point

use clap::{Parser, Subcommand};
use iothub::config::GatewayConfig;
use iothub::gateway::Gateway;
use iothub::{GatewayError, GatewayResult};
use iothub::observability::{init_default_logging, LogFormat};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, Level};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["iothub.toml", "config/iothub.toml"];

/// Exit code when the hub cannot start
const EXIT_STARTUP: i32 = 1;
/// Exit code when the hub stops on a runtime failure
const EXIT_RUNTIME: i32 = 2;

/// MQTT hub bridging a temperature sensor, a fan controller and a cloud relay
#[derive(Parser)]
#[command(name = "iothub")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format: json, pretty or compact
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    /// Running under a service manager; the EXIT command is refused
    #[arg(long, global = true)]
    service: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub (default)
    Run {
        /// Configuration file path
        #[arg(value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Validate configuration
    Config {
        /// Show the resolved configuration with secrets masked
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    init_default_logging(level, cli.log_format.as_deref().map(LogFormat::parse));

    info!("Starting iothub v{}", env!("CARGO_PKG_VERSION"));

    let command = cli.command.unwrap_or(Commands::Run { config: None });
    let config_path = match &command {
        Commands::Run { config: Some(path) } => Some(path.clone()),
        _ => cli.config.clone(),
    };

    let config = match load_configuration(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(EXIT_STARTUP);
        }
    };

    match command {
        Commands::Run { .. } => {
            let service_mode = cli.service || std::env::var_os("INVOCATION_ID").is_some();
            if let Err(e) = run_gateway(config, service_mode).await {
                let code = if e.is_startup_fatal() {
                    EXIT_STARTUP
                } else {
                    EXIT_RUNTIME
                };
                error!(exit_code = code, "Gateway failed: {}", e);
                process::exit(code);
            }
        }
        Commands::Config { show } => {
            if let Err(e) = handle_config_command(config, show) {
                error!("Command failed: {}", e);
                process::exit(EXIT_STARTUP);
            }
        }
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(GatewayConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(GatewayConfig::load_from_file(path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create iothub.toml".into())
}

async fn run_gateway(config: GatewayConfig, service_mode: bool) -> GatewayResult<()> {
    info!(
        gateway_id = %config.gateway.id,
        broker = %config.broker.url,
        service_mode,
        "Application starting"
    );

    let mut gateway = Gateway::from_config(&config, service_mode)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| GatewayError::internal_error(format!("SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| GatewayError::internal_error(format!("SIGTERM handler: {e}")))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
    });

    gateway.run(shutdown_rx).await
}

fn handle_config_command(
    mut config: GatewayConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        const MASK: &str = "********";
        if config.broker.password.is_some() {
            config.broker.password = Some(MASK.to_string());
        }
        if let Some(cloud) = config.cloud.as_mut() {
            if cloud.api_key.is_some() {
                cloud.api_key = Some(MASK.to_string());
            }
        }

        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
