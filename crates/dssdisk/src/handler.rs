//! Disk node command handlers.
//!
//! The command port speaks the block protocol: `WRITE_BLOCK`,
//! `READ_BLOCK`, `FAIL`, `RECOVER`. Each datagram is served on its own
//! task against the shared store, so a long-running `RECOVER` does not
//! stall reads addressed to other volumes.

use std::sync::Arc;

use dss_proto::block::{DiskReply, DiskRequest};
use dss_proto::constants::MAX_DATAGRAM;
use tokio::net::UdpSocket;
use tracing::{debug, error, trace, warn};

use crate::recover;
use crate::store::BlockStore;

/// Serve block requests on `sock` until the task is dropped.
pub async fn serve_commands(store: Arc<BlockStore>, sock: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match sock.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                let frame = buf[..len].to_vec();
                let store = store.clone();
                let sock = sock.clone();
                tokio::spawn(async move {
                    let reply = handle_request(&store, &frame).await;
                    if let Err(e) = sock.send_to(&reply.encode(), peer).await {
                        error!("failed to answer {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("recv error on command port: {}", e);
            }
        }
    }
}

async fn handle_request(store: &Arc<BlockStore>, frame: &[u8]) -> DiskReply {
    let request = match DiskRequest::parse(frame) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed request: {}", e.token());
            return DiskReply::Failure(e);
        }
    };

    match request {
        DiskRequest::WriteBlock {
            key,
            block_type,
            payload,
        } => {
            trace!("write {} ({}, {} bytes)", key, block_type.as_str(), payload.len());
            store.put(key.clone(), payload);
            DiskReply::WriteAck { key }
        }
        DiskRequest::ReadBlock { key } => {
            let block = store.get(&key).unwrap_or_default();
            trace!("read {} -> {} bytes", key, block.len());
            DiskReply::Block(block)
        }
        DiskRequest::Fail { volume } => {
            store.fail_volume(&volume);
            DiskReply::FailComplete { volume }
        }
        DiskRequest::Recover {
            volume,
            slot,
            striping_unit,
            files,
            peers,
        } => {
            debug!(
                "recover requested: {} slot {} ({} files, {} peers)",
                volume,
                slot,
                files.len(),
                peers.len()
            );
            match recover::rebuild(store, &volume, slot, striping_unit, &files, &peers).await {
                Ok(_) => DiskReply::RecoverComplete { volume },
                Err(e) => {
                    error!("recovery of {} failed: {}", volume, e);
                    DiskReply::Failure(e)
                }
            }
        }
    }
}

/// Answer registration-plane pings on the management port. Nothing in
/// the protocol is routed here today; the port exists so the manager's
/// records carry a live endpoint for each disk.
pub async fn serve_mgmt(sock: UdpSocket) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match sock.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                debug!("mgmt datagram from {} ({} bytes)", peer, len);
                let _ = sock.send_to(b"SUCCESS", peer).await;
            }
            Err(e) => {
                error!("recv error on mgmt port: {}", e);
            }
        }
    }
}
