/*!
 * Process Supervisor - Main Entry Point
 *
 * Loads the configuration, serves JSON commands over HTTP and runs the
 * termination coordinator until SIGINT or SIGTERM.
 */

use anyhow::{Context, Result};
use clap::Parser;
use proc_supervisor::{api, init_tracing, Config, InstanceRegistry, TerminationCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "supervisor", version, about = "Supervise named executables")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long = "cfg", default_value = "cfg.json")]
    cfg: PathBuf,

    /// Address the command server listens on
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = Config::from_file(&args.cfg)
        .with_context(|| format!("Failed to load configuration from {}", args.cfg.display()))?;
    info!(
        cfg = %args.cfg.display(),
        instances_dir = %config.instances_dir.display(),
        termination_timeout_secs = config.termination_timeout.as_secs(),
        "Configuration loaded"
    );

    let registry = Arc::new(InstanceRegistry::new(Arc::new(config)));

    let listener = TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (failed_tx, failed_rx) = oneshot::channel::<()>();
    let server_registry = Arc::clone(&registry);
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.await;
        };
        if let Err(e) = api::serve(listener, server_registry, shutdown).await {
            error!(error = %e, "Command server failed");
            let _ = failed_tx.send(());
        }
    });

    // Resolves only on failure; a clean exit drops the sender
    let intake_exit = async move {
        if failed_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let intake_shutdown = async move {
        let _ = stop_tx.send(());
        if let Err(e) = server.await {
            error!(error = %e, "Command server task failed");
        }
    };

    let mut coordinator = TerminationCoordinator::builder(Arc::clone(&registry))
        .with_os_signals()
        .with_intake_shutdown(intake_shutdown)
        .with_intake_exit(intake_exit)
        .spawn()
        .context("Failed to install signal handlers")?;

    info!(addr = %args.addr, "Supervisor running");
    coordinator.completed().await;

    info!("Supervisor exited");
    Ok(())
}
