//! dssdisk — DSS disk node daemon.
//!
//! Registers itself with the manager, then serves the block protocol
//! on its command port: block writes and reads, volume failure, and
//! XOR reconstruction from its peers.
//!
//! Usage:
//!   dssdisk --name <name> [OPTIONS]

mod handler;
mod recover;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dss_core::net::{request_text, ExchangePolicy};
use dss_proto::defaults::{
    DEFAULT_DISK_CMD_PORT, DEFAULT_DISK_MGMT_PORT, DEFAULT_MANAGER_PORT,
};
use dss_proto::message::{parse_plain, ManagerRequest};
use dss_proto::DssResult;
use tracing::{error, info, warn};

/// DSS disk node daemon
#[derive(Parser, Debug)]
#[command(name = "dssdisk", version, about = "DSS disk node")]
struct Args {
    /// Registered disk name (alphabetic, at most 15 characters)
    #[arg(short = 'n', long)]
    name: String,

    /// Manager address
    #[arg(short = 'm', long, default_value = "127.0.0.1")]
    manager: String,

    /// Manager port
    #[arg(long, default_value_t = DEFAULT_MANAGER_PORT)]
    manager_port: u16,

    /// Listen address
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind_addr: String,

    /// Address to advertise to the manager
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    advertise: String,

    /// Management port
    #[arg(long, default_value_t = DEFAULT_DISK_MGMT_PORT)]
    mgmt_port: u16,

    /// Command (block protocol) port
    #[arg(long, default_value_t = DEFAULT_DISK_CMD_PORT)]
    cmd_port: u16,

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

    info!("dssdisk v{} starting as '{}'", env!("CARGO_PKG_VERSION"), args.name);

    if let Err(e) = run(args).await {
        error!("dssdisk error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> DssResult<()> {
    let manager: SocketAddr = format!("{}:{}", args.manager, args.manager_port)
        .parse()
        .map_err(|_| dss_proto::DssError::BadFrame)?;

    // Bind both ports before registering so the advertised endpoints
    // are live by the time the manager hands them out.
    let mgmt_sock = dss_core::net::bind_udp(&args.bind_addr, args.mgmt_port).await?;
    let cmd_sock = Arc::new(dss_core::net::bind_udp(&args.bind_addr, args.cmd_port).await?);

    let register = ManagerRequest::RegisterDisk {
        name: args.name.clone(),
        ip: args.advertise.clone(),
        mgmt_port: args.mgmt_port,
        cmd_port: args.cmd_port,
    };
    let reply = request_text(manager, &register.encode(), ExchangePolicy::default()).await?;
    parse_plain(&reply)?;
    info!(
        "registered with manager {} (mgmt:{} cmd:{})",
        manager, args.mgmt_port, args.cmd_port
    );

    let store = Arc::new(store::BlockStore::new());
    tokio::spawn(handler::serve_mgmt(mgmt_sock));

    tokio::select! {
        _ = handler::serve_commands(store, cmd_sock) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
            deregister(manager, &args.name).await;
        }
    }

    info!("dssdisk stopped");
    Ok(())
}

/// Best-effort: a disk still assigned to a volume is refused and
/// stays registered.
async fn deregister(manager: SocketAddr, name: &str) {
    let request = ManagerRequest::DeregisterDisk {
        name: name.to_string(),
    };
    match request_text(manager, &request.encode(), ExchangePolicy::default()).await {
        Ok(reply) => match parse_plain(&reply) {
            Ok(()) => info!("deregistered from manager"),
            Err(e) => warn!("manager refused deregistration: {}", e),
        },
        Err(e) => warn!("could not reach manager to deregister: {}", e),
    }
}
