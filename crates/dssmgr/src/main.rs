//! dssmgr — DSS coordination daemon.
//!
//! Keeps the registries of users and disk nodes, allocates volumes
//! over free disks, and serializes structural changes through a
//! single critical section:
//! - register / deregister of users and disks
//! - DSS configuration and listing
//! - phase-1/phase-2 brokering for copy, read, disk-failure and
//!   decommission
//!
//! Usage:
//!   dssmgr [OPTIONS]

mod handler;
mod state;

use clap::Parser;
use dss_proto::defaults::DEFAULT_MANAGER_PORT;
use tracing::{error, info};

/// DSS coordination daemon
#[derive(Parser, Debug)]
#[command(name = "dssmgr", version, about = "DSS coordinator")]
struct Args {
    /// Listen address for control requests
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind_addr: String,

    /// Listen port
    #[arg(short = 'p', long, default_value_t = DEFAULT_MANAGER_PORT)]
    port: u16,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("dssmgr v{} starting", env!("CARGO_PKG_VERSION"));

    let manager = handler::Manager::new(handler::ManagerConfig {
        bind_addr: args.bind_addr,
        port: args.port,
    });

    tokio::select! {
        result = manager.run() => {
            if let Err(e) = result {
                error!("manager error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
    }

    info!("dssmgr stopped");
}
