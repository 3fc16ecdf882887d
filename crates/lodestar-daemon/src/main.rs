//! lodestar-daemon: registry notification host for one Lodestar process.
//!
//! Single OS process running a Tokio async runtime. Watched services are
//! mirrored into local directories, and the process's own service instance
//! is announced through the same dispatcher on start and withdrawn on exit.

mod config;
mod feed;

use std::sync::Arc;

use lodestar_net::SystemResolver;
use lodestar_registry::{Registrar, RegistryPaths, ServiceDirectory, WatchBridge};
use lodestar_remoting::Dispatcher;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("lodestar={}", config.log.level).parse()?),
        )
        .init();

    info!("Lodestar daemon starting");

    // 3. Dispatcher and local directories
    let dispatcher = Dispatcher::new();
    let paths = RegistryPaths::new(&config.registry.root);
    let mut directories = Vec::with_capacity(config.registry.watch.len());
    for service in &config.registry.watch {
        let providers = paths.providers_path(service);
        let directory = Arc::new(ServiceDirectory::new(&providers));
        dispatcher.subscribe_subtree(&providers, directory.clone())?;
        info!(%service, path = %providers, "watching service providers");
        directories.push(directory);
    }

    // 4. Watch bridge
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (sink, bridge) = WatchBridge::channel(
        dispatcher.clone(),
        config.registry.channel_capacity,
        shutdown_rx,
    );
    let bridge_handle = bridge.spawn();
    if config.registry.stdin_feed {
        info!("reading raw changes from stdin");
        tokio::spawn(feed::stdin_feed(sink.clone()));
    }

    // 5. Self-registration
    let resolver = Arc::new(SystemResolver::new(config.net.clone()));
    let registrar = Registrar::new(paths, resolver);
    let registration = match config.service.instance() {
        Some(instance) => {
            let registration = registrar.register(instance)?;
            let report = dispatcher.notify(&registration.event)?;
            info!(
                path = %registration.path,
                url = %registration.event.content(),
                listeners = report.delivered,
                "service registered"
            );
            Some(registration)
        }
        None => {
            warn!("no service name configured; skipping self-registration");
            None
        }
    };

    // 6. Run until Ctrl-C
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }

    // Graceful shutdown
    if let Some(registration) = registration {
        let event = registration.deregistration_event()?;
        dispatcher.notify(&event)?;
        info!(path = %registration.path, "service deregistered");
    }

    drop(sink);
    let _ = shutdown_tx.send(());
    match bridge_handle.await {
        Ok(stats) => info!(
            changes = stats.changes,
            events = stats.events,
            "watch bridge joined"
        ),
        Err(e) => error!("Watch bridge task failed: {}", e),
    }

    for directory in &directories {
        info!(root = %directory.root(), instances = directory.len(), "final directory state");
    }

    info!("Daemon stopped");
    Ok(())
}
