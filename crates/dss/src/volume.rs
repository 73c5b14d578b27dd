//! Registration and volume management commands.

use std::net::SocketAddr;

use dss_proto::message::{parse_listing, parse_plain, ManagerRequest, VolumeListing};
use dss_proto::DssResult;

use crate::common::{format_size, manager_request};

pub async fn register_user(
    manager: SocketAddr,
    name: &str,
    advertise: &str,
    mgmt_port: u16,
    cmd_port: u16,
) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::RegisterUser {
            name: name.to_string(),
            ip: advertise.to_string(),
            mgmt_port,
            cmd_port,
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("registered user '{}'", name);
    Ok(())
}

pub async fn deregister_user(manager: SocketAddr, name: &str) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::DeregisterUser {
            name: name.to_string(),
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("deregistered user '{}'", name);
    Ok(())
}

pub async fn configure(
    manager: SocketAddr,
    name: &str,
    n: usize,
    striping_unit: usize,
) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::ConfigureDss {
            name: name.to_string(),
            n,
            striping_unit,
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("configured DSS '{}' over {} disks (su={})", name, n, striping_unit);
    Ok(())
}

pub async fn ls(manager: SocketAddr) -> DssResult<()> {
    let volumes = fetch_listing(manager).await?;
    for v in &volumes {
        println!(
            "DSS {}  n={}  su={}  disks: {}",
            v.name,
            v.n,
            v.striping_unit,
            v.disks.join(", ")
        );
        if v.files.is_empty() {
            println!("  (no files)");
        }
        for f in &v.files {
            println!("  {}  {}  owner={}", f.name, format_size(f.size), f.owner);
        }
    }
    Ok(())
}

/// Fetch the volume listing without printing it.
pub async fn fetch_listing(manager: SocketAddr) -> DssResult<Vec<VolumeListing>> {
    let reply = manager_request(manager, &ManagerRequest::Ls).await?;
    parse_listing(&reply)
}

pub async fn dump_state(manager: SocketAddr) -> DssResult<()> {
    let reply = manager_request(manager, &ManagerRequest::DumpState).await?;
    let fields = reply.strip_prefix("SUCCESS|").unwrap_or(&reply);
    parse_plain(&reply)?;
    println!("{}", fields);
    Ok(())
}
