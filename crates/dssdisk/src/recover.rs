//! Block reconstruction after a simulated disk failure.
//!
//! The rebuilding disk walks every stripe of every file in the volume,
//! fetches the n−1 surviving blocks from its peers, and recomputes its
//! own block as their bytewise XOR. Rotating parity makes the same
//! rule work whether the lost block held data or parity: any one block
//! of a stripe is the XOR of the other n−1.

use std::sync::Arc;

use dss_core::net::{exchange, ExchangePolicy};
use dss_core::stripe::{xor_parity, StripeGeometry};
use dss_proto::block::{parse_block, BlockKey, DiskRequest, FileSpec};
use dss_proto::{DiskTarget, DssError, DssResult};
use tracing::{debug, info, warn};

use crate::store::BlockStore;

/// Rebuild this disk's blocks for `volume`. `slot` is our own slot
/// index in `peers`, which lists the full membership in slot order.
/// Returns the number of blocks reconstructed.
pub async fn rebuild(
    store: &Arc<BlockStore>,
    volume: &str,
    slot: usize,
    striping_unit: usize,
    files: &[FileSpec],
    peers: &[DiskTarget],
) -> DssResult<usize> {
    let n = peers.len();
    if slot >= n || n < 2 {
        return Err(DssError::BadFrame);
    }
    let geometry = StripeGeometry::new(n, striping_unit);
    let sock = dss_core::net::ephemeral_udp().await?;
    let policy = ExchangePolicy::default();

    let mut rebuilt = 0usize;
    for (file, size) in files {
        for stripe in 0..geometry.stripe_count(*size) {
            let mut survivors = Vec::with_capacity(n - 1);
            for (peer_slot, peer) in peers.iter().enumerate() {
                if peer_slot == slot {
                    continue;
                }
                let request = DiskRequest::ReadBlock {
                    key: BlockKey {
                        volume: volume.to_string(),
                        file: file.clone(),
                        stripe,
                        slot: peer_slot,
                    },
                };
                let reply =
                    exchange(&sock, peer.socket_addr(), &request.encode(), policy).await?;
                let block = parse_block(&reply)?;
                if block.is_empty() {
                    warn!(
                        "peer {} has no block for {}/{}[{}.{}], cannot rebuild",
                        peer.name, volume, file, stripe, peer_slot
                    );
                    return Err(DssError::Internal);
                }
                survivors.push(block);
            }
            store.put(
                BlockKey {
                    volume: volume.to_string(),
                    file: file.clone(),
                    stripe,
                    slot,
                },
                xor_parity(&survivors),
            );
            rebuilt += 1;
        }
        debug!("rebuilt {} ({} bytes) in {}", file, size, volume);
    }
    info!(
        "recovery of slot {} in {} complete: {} blocks rebuilt",
        slot, volume, rebuilt
    );
    Ok(rebuilt)
}
