//! Geofence gateway - zone breach detection for UWB-tracked tags
//!
//! Listens for position reports on a multicast group, decides which zones
//! each tag is in, and lights the tag's LED in the zone colors.
//!
//! Module structure:
//! - `domain/` - Geometry, zones and core types
//! - `io/` - Wire codec, multicast transport, command worker, egress
//! - `services/` - Breach tracking and dispatch
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use geofence_gateway::infra::{Config, Metrics};
use geofence_gateway::io::{bind_multicast, bind_sender, create_command_worker, start_position_listener, BreachEgress};
use geofence_gateway::services::Dispatcher;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence gateway - zone breach detection and LED signalling
#[derive(Parser, Debug)]
#[command(name = "geofence-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-report visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "geofence-gateway starting");

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(config_file = %args.config, error = %format!("{:#}", e), "config_load_failed");
            std::process::exit(1);
        }
    };

    info!(
        config_file = %config.config_file(),
        zones = ?config.zone_names(),
        hysteresis = %config.hysteresis(),
        led_slot_ms = %config.led_slot_ms(),
        listen = %SocketAddrV4::new(config.listen().group, config.listen().port),
        command = %SocketAddrV4::new(config.command().group, config.command().port),
        tag_idle_timeout_secs = ?config.tag_idle_timeout().map(|d| d.as_secs()),
        egress_file = ?config.egress_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Bind both sockets before spawning anything so startup failures are fatal
    let listen_socket = bind_multicast(config.listen())?;
    let command_socket = bind_sender(config.command())?;
    let command_target = SocketAddr::V4(SocketAddrV4::new(config.command().group, config.command().port));

    // Start command worker (drains until the dispatcher drops its sender)
    let (command_sender, command_worker) = create_command_worker(command_socket, command_target, metrics.clone());
    let worker_handle = tokio::spawn(command_worker.run());

    // Create report channel (bounded for backpressure)
    let (report_tx, report_rx) = mpsc::channel(1000);

    // Start position listener
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_position_listener(listen_socket, report_tx, listener_metrics, listener_shutdown).await {
            error!(error = %e, "position listener error");
        }
    });

    // Start metrics reporter (lock-free reads)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut dispatcher = Dispatcher::new(
        config.zones().clone(),
        config.tracker_settings(),
        command_sender,
        metrics.clone(),
    )
    .with_idle_timeout(config.tag_idle_timeout());
    if let Some(path) = config.egress_file() {
        dispatcher = dispatcher.with_egress(BreachEgress::new(path));
    }
    info!("dispatcher_started");

    // Run dispatcher until shutdown, then let the worker flush the clears
    dispatcher.run(report_rx, shutdown_rx).await;
    drop(dispatcher);
    if let Err(e) = worker_handle.await {
        error!(error = %e, "command worker join error");
    }

    metrics.report().log();
    info!("geofence-gateway shutdown complete");
    Ok(())
}
