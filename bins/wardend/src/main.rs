use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use warden_supervisor::{Supervisor, SupervisorConfig};

/// warden - minimal process supervisor for worker fleets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // A malformed config must exit nonzero before anything launches
    let config = SupervisorConfig::load_from_file(&args.config)?;

    initialize_logging(if args.debug {
        "debug"
    } else {
        &config.supervisor.log_level
    })?;

    info!("Starting warden");
    info!("Config file: {}", args.config);
    info!("Loaded configuration for {} programs", config.programs.len());

    let mut supervisor = Supervisor::new();
    let shutdown_signal = setup_signal_handlers();

    match supervisor.start_from_config(&config) {
        Ok(started) => {
            info!("Launched {} instances", started.len());
        }
        Err(e) => {
            error!("Failed to start programs: {}", e);
            return Err(anyhow::anyhow!("Start failed: {}", e));
        }
    }

    if let Some(duration) = args.run_duration {
        info!("Running for {} seconds (test mode)", duration);
        tokio::time::sleep(tokio::time::Duration::from_secs(duration)).await;
    } else {
        shutdown_signal.await;
    }

    info!("Shutting down...");
    supervisor.shutdown(config.supervisor.shutdown_timeout).await;
    info!("Shutdown complete");

    Ok(())
}

fn initialize_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}

async fn setup_signal_handlers() {
    use tokio::signal;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to create SIGTERM handler");
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("Failed to create SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal");
        }
    }
}
