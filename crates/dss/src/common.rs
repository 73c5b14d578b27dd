//! Shared utilities for the dss CLI tool.

use std::net::SocketAddr;

use dss_core::net::{request_text, ExchangePolicy};
use dss_proto::message::ManagerRequest;
use dss_proto::{DssError, DssResult};

/// Resolve the manager endpoint from the CLI options.
pub fn manager_addr(addr: &str, port: u16) -> DssResult<SocketAddr> {
    format!("{}:{}", addr, port)
        .parse()
        .map_err(|_| DssError::Network)
}

/// One request/reply exchange with the manager.
pub async fn manager_request(manager: SocketAddr, request: &ManagerRequest) -> DssResult<String> {
    request_text(manager, &request.encode(), ExchangePolicy::default()).await
}

/// Print an error message and exit.
pub fn exit_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

/// Format a byte count as a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
