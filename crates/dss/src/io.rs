//! File transfer: striped writes with rotating parity, verified reads.
//!
//! `copy` and `read` are two-phase exchanges with the manager wrapped
//! around direct block traffic with the member disks. Within a stripe
//! the n block transfers run concurrently on their own tasks; stripes
//! themselves are sequential.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use dss_core::fault::FaultInjector;
use dss_core::net::{request_frame, ExchangePolicy};
use dss_core::stripe::StripeGeometry;
use dss_proto::block::{parse_block, parse_write_ack, BlockKey, DiskRequest};
use dss_proto::defaults::{DEFAULT_OUTPUT_SUFFIX, DEFAULT_STRIPE_RETRIES};
use dss_proto::message::{
    parse_copy_target, parse_plain, parse_read_target, ManagerRequest,
};
use dss_proto::{DssError, DssResult, VolumeLayout};
use tracing::{debug, info, warn};

use crate::common::manager_request;

/// Copy a local file into the DSS chosen by the manager.
pub async fn copy(manager: SocketAddr, path: &Path, owner: &str) -> DssResult<()> {
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or(DssError::BadFrame)?
        .to_string();
    let data = tokio::fs::read(path).await.map_err(|e| {
        eprintln!("cannot read {}: {}", path.display(), e);
        DssError::Network
    })?;

    let reply = manager_request(
        manager,
        &ManagerRequest::Copy {
            file: file.clone(),
            size: data.len() as u64,
            owner: owner.to_string(),
        },
    )
    .await?;
    let layout = parse_copy_target(&reply)?;
    info!(
        "copying {} ({} bytes) to {} [{}]",
        file,
        data.len(),
        layout.volume,
        layout
            .disks
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    store_file(&layout, &file, &data).await?;

    let reply = manager_request(
        manager,
        &ManagerRequest::CopyComplete {
            owner: owner.to_string(),
        },
    )
    .await?;
    parse_plain(&reply)?;
    println!("copied {} to {}", file, layout.volume);
    Ok(())
}

/// Read a file back, verify parity, and write it to a local path.
pub async fn read(
    manager: SocketAddr,
    volume: &str,
    file: &str,
    user: &str,
    output: Option<PathBuf>,
    corrupt_probability: f64,
) -> DssResult<()> {
    let reply = manager_request(
        manager,
        &ManagerRequest::Read {
            volume: volume.to_string(),
            file: file.to_string(),
            user: user.to_string(),
        },
    )
    .await?;
    let (layout, size) = parse_read_target(&reply, volume)?;

    let injector = FaultInjector::new(corrupt_probability);
    if injector.is_enabled() {
        warn!(
            "fault injection enabled: corrupting blocks with probability {}",
            corrupt_probability
        );
    }

    let result = fetch_file(&layout, file, size, injector).await;

    // Drop out of the read set even when verification failed.
    let reply = manager_request(
        manager,
        &ManagerRequest::ReadComplete {
            user: user.to_string(),
            volume: volume.to_string(),
        },
    )
    .await?;
    parse_plain(&reply)?;

    let data = result?;
    let output = output.unwrap_or_else(|| PathBuf::from(format!("{file}{DEFAULT_OUTPUT_SUFFIX}")));
    tokio::fs::write(&output, &data).await.map_err(|e| {
        eprintln!("cannot write {}: {}", output.display(), e);
        DssError::Network
    })?;
    println!("read {}/{} ({} bytes) into {}", volume, file, data.len(), output.display());
    Ok(())
}

/// Stripe `data` across the volume's disks, one stripe at a time.
pub async fn store_file(layout: &VolumeLayout, file: &str, data: &[u8]) -> DssResult<()> {
    let geometry = StripeGeometry::new(layout.n, layout.striping_unit);
    let policy = ExchangePolicy::default();

    for stripe in 0..geometry.stripe_count(data.len() as u64) {
        let placed = geometry.build_stripe(stripe, geometry.stripe_source(data, stripe));
        let mut writers = Vec::with_capacity(layout.n);
        for (slot, block_type, payload) in placed {
            let target = layout.disks[slot].socket_addr();
            let key = BlockKey {
                volume: layout.volume.clone(),
                file: file.to_string(),
                stripe,
                slot,
            };
            writers.push(tokio::spawn(async move {
                let request = DiskRequest::WriteBlock {
                    key: key.clone(),
                    block_type,
                    payload,
                };
                let reply = request_frame(target, &request.encode(), policy).await?;
                parse_write_ack(&reply, &key)
            }));
        }
        for writer in writers {
            writer.await.map_err(|_| DssError::Internal)??;
        }
        debug!("stripe {} of {} written", stripe, file);
    }
    Ok(())
}

/// Fetch and verify every stripe of a file, retrying a stripe whose
/// parity check fails, and truncate to the declared size.
pub async fn fetch_file(
    layout: &VolumeLayout,
    file: &str,
    size: u64,
    injector: FaultInjector,
) -> DssResult<Vec<u8>> {
    let geometry = StripeGeometry::new(layout.n, layout.striping_unit);
    let mut data = Vec::with_capacity(size as usize);

    for stripe in 0..geometry.stripe_count(size) {
        let mut verified = None;
        for attempt in 1..=DEFAULT_STRIPE_RETRIES {
            let slots = fetch_stripe(layout, file, stripe, injector).await?;
            match geometry.verify_and_extract(stripe, &slots) {
                Ok(bytes) => {
                    verified = Some(bytes);
                    break;
                }
                Err(DssError::ParityMismatch) => {
                    warn!(
                        "parity mismatch on stripe {} of {} (attempt {}/{})",
                        stripe, file, attempt, DEFAULT_STRIPE_RETRIES
                    );
                }
                Err(e) => return Err(e),
            }
        }
        data.extend(verified.ok_or(DssError::ParityMismatch)?);
    }

    data.truncate(size as usize);
    Ok(data)
}

/// Fetch the n blocks of one stripe concurrently.
async fn fetch_stripe(
    layout: &VolumeLayout,
    file: &str,
    stripe: u64,
    injector: FaultInjector,
) -> DssResult<Vec<Vec<u8>>> {
    let policy = ExchangePolicy::default();
    let mut readers = Vec::with_capacity(layout.n);
    for (slot, disk) in layout.disks.iter().enumerate() {
        let target = disk.socket_addr();
        let key = BlockKey {
            volume: layout.volume.clone(),
            file: file.to_string(),
            stripe,
            slot,
        };
        readers.push(tokio::spawn(async move {
            let request = DiskRequest::ReadBlock { key };
            let reply = request_frame(target, &request.encode(), policy).await?;
            let mut block = parse_block(&reply)?;
            if block.is_empty() {
                return Err(DssError::Internal);
            }
            injector.maybe_corrupt(&mut block);
            Ok(block)
        }));
    }

    let mut slots = Vec::with_capacity(layout.n);
    for reader in readers {
        slots.push(reader.await.map_err(|_| DssError::Internal)??);
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_proto::block::DiskReply;
    use dss_proto::constants::MAX_DATAGRAM;
    use dss_proto::DiskTarget;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::{Arc, Mutex};

    type Shared = Arc<Mutex<HashMap<BlockKey, Vec<u8>>>>;

    /// Minimal in-process disk: serves WRITE_BLOCK and READ_BLOCK from
    /// a shared map, optionally corrupting the first read of each key.
    async fn spawn_fake_disk(blocks: Shared, corrupt_first_read: bool) -> (IpAddr, u16) {
        let sock = dss_core::net::bind_udp("127.0.0.1", 0).await.unwrap();
        let addr = sock.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let mut served: HashMap<BlockKey, bool> = HashMap::new();
            loop {
                let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
                let reply = match DiskRequest::parse(&buf[..len]) {
                    Ok(DiskRequest::WriteBlock { key, payload, .. }) => {
                        blocks.lock().unwrap().insert(key.clone(), payload);
                        DiskReply::WriteAck { key }
                    }
                    Ok(DiskRequest::ReadBlock { key }) => {
                        let mut block = blocks
                            .lock()
                            .unwrap()
                            .get(&key)
                            .cloned()
                            .unwrap_or_default();
                        let first = !served.insert(key, true).unwrap_or(false);
                        if corrupt_first_read && first && !block.is_empty() {
                            block[0] ^= 0x01;
                        }
                        DiskReply::Block(block)
                    }
                    Ok(_) => DiskReply::Failure(DssError::UnknownCommand),
                    Err(e) => DiskReply::Failure(e),
                };
                sock.send_to(&reply.encode(), peer).await.unwrap();
            }
        });
        (addr.ip(), addr.port())
    }

    async fn fake_layout(n: usize, su: usize, corrupt_first_read: bool) -> (VolumeLayout, Vec<Shared>) {
        let mut disks = Vec::new();
        let mut stores = Vec::new();
        for _ in 0..n {
            let store: Shared = Arc::new(Mutex::new(HashMap::new()));
            let (ip, port) = spawn_fake_disk(store.clone(), corrupt_first_read).await;
            disks.push(DiskTarget::new("d", ip, port));
            stores.push(store);
        }
        (
            VolumeLayout {
                volume: "vol".into(),
                n,
                striping_unit: su,
                disks,
            },
            stores,
        )
    }

    #[tokio::test]
    async fn test_store_then_fetch_round_trip() {
        let (layout, stores) = fake_layout(3, 128, false).await;
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 256) as u8).collect();

        store_file(&layout, "f.bin", &data).await.unwrap();

        // Every disk holds one block per stripe
        let geometry = StripeGeometry::new(3, 128);
        let stripes = geometry.stripe_count(data.len() as u64) as usize;
        for store in &stores {
            assert_eq!(store.lock().unwrap().len(), stripes);
        }

        let fetched = fetch_file(&layout, "f.bin", data.len() as u64, FaultInjector::disabled())
            .await
            .unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_transient_corruption_is_retried() {
        let (layout, _stores) = fake_layout(3, 128, true).await;
        let data = vec![0x42u8; 700];

        store_file(&layout, "f.bin", &data).await.unwrap();

        // First fetch of every block is corrupted; the retry gets the
        // clean copy and verification succeeds.
        let fetched = fetch_file(&layout, "f.bin", data.len() as u64, FaultInjector::disabled())
            .await
            .unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_persistent_corruption_exhausts_retries() {
        let (layout, _stores) = fake_layout(3, 128, false).await;
        let data = vec![0x17u8; 300];
        store_file(&layout, "f.bin", &data).await.unwrap();

        // Injector at probability 1 flips a bit in every fetched block,
        // so no attempt can verify.
        let err = fetch_file(&layout, "f.bin", data.len() as u64, FaultInjector::new(1.0))
            .await
            .unwrap_err();
        assert_eq!(err, DssError::ParityMismatch);
    }

    #[tokio::test]
    async fn test_missing_block_aborts_the_read() {
        let (layout, stores) = fake_layout(3, 128, false).await;
        let data = vec![0x99u8; 256];
        store_file(&layout, "f.bin", &data).await.unwrap();
        stores[1].lock().unwrap().clear();

        let err = fetch_file(&layout, "f.bin", data.len() as u64, FaultInjector::disabled())
            .await
            .unwrap_err();
        assert_eq!(err, DssError::Internal);
    }
}
