//! Bus Node Allocator
//!
//! Runs the dynamic node-ID allocation server over the JSON-over-UDP
//! reference transport. Devices handshake for an address in three fragment
//! stages; live nodes are tracked from their status broadcasts and asked to
//! describe themselves on first sight or restart.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bus_node_allocator::{
    AllocatorConfig, AllocatorService, NodeAddress, UdpBusTransport,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Dynamic node-ID allocation server for shared broadcast buses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP address to bind the bus socket on
    #[arg(long, env = "BUS_BIND_ADDR", default_value = "0.0.0.0:14550")]
    bind_addr: String,

    /// UDP broadcast address outbound frames are sent to
    #[arg(long, env = "BUS_BROADCAST_ADDR", default_value = "255.255.255.255:14550")]
    broadcast_addr: String,

    /// The server's own node address (never granted to devices)
    #[arg(long, env = "OWN_ADDRESS", default_value = "127")]
    own_address: u8,

    /// Seconds of node silence before a reappearance triggers an info refresh
    #[arg(long, env = "STATUS_TIMEOUT_SECS", default_value = "30")]
    status_timeout_secs: u64,

    /// Seconds of handshake inactivity before the session resets
    #[arg(long, env = "QUERY_TIMEOUT_SECS", default_value = "3")]
    query_timeout_secs: u64,

    /// Bottom of the dynamic address range
    #[arg(long, env = "RANGE_LOW", default_value = "1")]
    range_low: u8,

    /// Top of the dynamic address range
    #[arg(long, env = "RANGE_HIGH", default_value = "127")]
    range_high: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Bus Node Allocator");
    info!("  Version: {}", bus_node_allocator::VERSION);
    info!("  Bus bind: {}", args.bind_addr);
    info!("  Bus broadcast: {}", args.broadcast_addr);
    info!("  Own address: {}", args.own_address);
    info!("  Dynamic range: [{}, {}]", args.range_low, args.range_high);

    let config = AllocatorConfig {
        own_address: NodeAddress::new(args.own_address)
            .context("Invalid own node address")?,
        status_timeout: Duration::from_secs(args.status_timeout_secs),
        query_timeout: Duration::from_secs(args.query_timeout_secs),
        range_low: args.range_low,
        range_high: args.range_high,
    };

    let bind_addr: SocketAddr = args
        .bind_addr
        .parse()
        .context("Invalid bus bind address")?;
    let broadcast_addr: SocketAddr = args
        .broadcast_addr
        .parse()
        .context("Invalid bus broadcast address")?;

    let transport = UdpBusTransport::bind(bind_addr, broadcast_addr)
        .await
        .context("Failed to bind bus socket")?;

    let service = AllocatorService::new(config, transport.clone())
        .context("Failed to create allocation service")?;

    let shutdown = CancellationToken::new();
    let (event_sender, event_receiver) = mpsc::channel(1024);

    let listener = transport.spawn_listener(event_sender, shutdown.clone());

    let service_task = tokio::spawn(service.run(event_receiver, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    shutdown.cancel();

    let _ = futures::future::join(service_task, listener).await;

    info!("Allocation server shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
