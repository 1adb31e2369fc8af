//! tapbridge agent
//!
//! Serves the guest interface RPC endpoint on a hypervisor host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tapbridge_agent::{
    api,
    command::HostRunner,
    config::{Cli, Config, NamingMode},
    network::{NetdevTaps, Networkd},
    state::AppState,
    switch::OvsSwitch,
    workflow::{GuestInterfaces, Naming},
};
use tapbridge_networking::{NameAllocator, SysfsLinks};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound on draining in-flight requests after Ctrl+C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from(Cli::parse());

    // Initialize tracing (prefer RUST_LOG, fallback to --log-level)
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tapbridge agent");
    info!(
        listen_addr = %config.listen_addr,
        bridge = %config.bridge,
        netdev_dir = %config.netdev_dir.display(),
        naming = ?config.naming,
        "Configuration loaded"
    );

    let runner = Arc::new(HostRunner::new(config.command_timeout));
    let switch = Arc::new(OvsSwitch::new(runner.clone()));
    let stack = Arc::new(Networkd::new(runner));
    let taps = Arc::new(NetdevTaps::new(&config.netdev_dir, stack));

    let naming = match config.naming {
        NamingMode::Allocated => {
            let links = Arc::new(SysfsLinks::new(&config.sysfs_net_dir));
            let allocator = NameAllocator::seed(&config.iface_prefix, links)
                .context("failed to seed interface name allocator")?;
            info!(
                prefix = %allocator.prefix(),
                next = %allocator.name_for(allocator.peek_next()),
                "Interface name allocator seeded"
            );
            Naming::allocated(allocator)
        }
        NamingMode::Derived => Naming::Derived,
    };

    let service = Arc::new(GuestInterfaces::new(
        switch.clone(),
        taps,
        naming,
        &config.bridge,
    ));
    let state = AppState::new(service, switch, &config.bridge);

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C) or an early server exit
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("HTTP server did not shut down in time");
                    Ok(Ok(()))
                }
            }
        }
        result = &mut server_handle => result,
    };

    match result {
        Ok(Ok(())) => info!("Server exited normally"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }

    info!("Agent shutdown complete");
    Ok(())
}
