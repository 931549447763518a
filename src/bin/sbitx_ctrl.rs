//! sBitx control process
//!
//! Owns the radio hardware and serves the tuning/PTT line protocol on TCP.
//!
//! Usage: `sbitx-ctrl [config.toml]`

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbitx_iq::{
    config::AppConfig,
    control::{ControlServer, RadioController, SimulatedDriver},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref()).context("loading configuration")?;

    tracing::info!("Starting sBitx control server");

    let ip: IpAddr = config
        .control
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.control.bind_address))?;
    let addr = SocketAddr::new(ip, config.control.port);

    // Forces RX, then applies the initial frequency
    let driver = SimulatedDriver::new(config.hardware.clone());
    let controller = Arc::new(RadioController::new(
        Box::new(driver),
        config.control.initial_frequency_hz,
    ));

    let server = match ControlServer::bind(addr, controller.clone()).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{}", e);
            controller.shutdown();
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to install signal handlers: {}", e);
                // Dropping the sender would stop the server
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await;

    controller.shutdown();
    tracing::info!("sBitx control server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received, stopping");
    Ok(())
}
