//! Structural operations: simulated disk failure with recovery, and
//! decommissioning.
//!
//! Both are phase-1/phase-2 exchanges: the manager grants the volume's
//! critical section and hands back the layout, the client drives the
//! disks directly, then reports completion to release the section.

use std::net::SocketAddr;
use std::time::Duration;

use dss_core::net::{request_frame, ExchangePolicy};
use dss_proto::block::{parse_fail_complete, parse_recover_complete, DiskRequest};
use dss_proto::message::{parse_layout, parse_plain, ManagerRequest};
use dss_proto::{DssError, DssResult};
use rand::Rng;
use tracing::info;

use crate::common::manager_request;
use crate::volume::fetch_listing;

/// Recovery walks every stripe of every file, so it gets a far longer
/// per-attempt budget than a single-block exchange. Resends are safe:
/// a repeated rebuild overwrites the same blocks.
fn recover_policy() -> ExchangePolicy {
    ExchangePolicy {
        timeout: Duration::from_secs(30),
        attempts: 2,
    }
}

/// Fail one randomly chosen member disk of `volume`, then direct it to
/// rebuild its blocks from the survivors.
pub async fn disk_failure(manager: SocketAddr, volume: &str) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::DiskFailure {
            volume: volume.to_string(),
        },
    )
    .await?;
    let layout = parse_layout(&reply, volume)?;

    let slot = rand::thread_rng().gen_range(0..layout.n);
    let victim = &layout.disks[slot];
    info!("failing disk {} (slot {}) of {}", victim.name, slot, volume);

    let fail = DiskRequest::Fail {
        volume: volume.to_string(),
    };
    let reply = request_frame(
        victim.socket_addr(),
        &fail.encode(),
        ExchangePolicy::default(),
    )
    .await?;
    parse_fail_complete(&reply, volume)?;

    // The listing provides the file table the rebuild has to walk.
    let listing = fetch_listing(manager).await?;
    let files: Vec<(String, u64)> = listing
        .iter()
        .find(|v| v.name == volume)
        .ok_or(DssError::NoSuchDss)?
        .files
        .iter()
        .map(|f| (f.name.clone(), f.size))
        .collect();

    let recover = DiskRequest::Recover {
        volume: volume.to_string(),
        slot,
        striping_unit: layout.striping_unit,
        files,
        peers: layout.disks.clone(),
    };
    let reply = request_frame(victim.socket_addr(), &recover.encode(), recover_policy()).await?;
    parse_recover_complete(&reply, volume)?;

    let reply = manager_request(
        manager,
        &ManagerRequest::RecoveryComplete {
            volume: volume.to_string(),
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("disk {} of {} failed and recovered", victim.name, volume);
    Ok(())
}

/// Tear down `volume`: discard its blocks on every member disk and
/// release the disks back to the free pool.
pub async fn decommission(manager: SocketAddr, volume: &str) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::DecommissionDss {
            volume: volume.to_string(),
        },
    )
    .await?;
    let layout = parse_layout(&reply, volume)?;

    for disk in &layout.disks {
        let fail = DiskRequest::Fail {
            volume: volume.to_string(),
        };
        let reply = request_frame(
            disk.socket_addr(),
            &fail.encode(),
            ExchangePolicy::default(),
        )
        .await?;
        parse_fail_complete(&reply, volume)?;
        info!("cleared {} on {}", volume, disk.name);
    }

    let reply = manager_request(
        manager,
        &ManagerRequest::DecommissionComplete {
            volume: volume.to_string(),
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("decommissioned {}", volume);
    Ok(())
}
