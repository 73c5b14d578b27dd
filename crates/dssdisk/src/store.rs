//! In-memory block store.
//!
//! Blocks are kept in a concurrent map keyed by
//! (volume, file, stripe, slot). Writes overwrite, which makes a
//! re-sent `WRITE_BLOCK` harmless. `FAIL` discards a whole volume in
//! one sweep, simulating the loss of this disk's contents for it.

use dashmap::DashMap;
use dss_proto::block::BlockKey;
use tracing::info;

#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: DashMap<BlockKey, Vec<u8>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: BlockKey, payload: Vec<u8>) {
        self.blocks.insert(key, payload);
    }

    pub fn get(&self, key: &BlockKey) -> Option<Vec<u8>> {
        self.blocks.get(key).map(|b| b.value().clone())
    }

    /// Drop every block belonging to `volume`. Returns how many were
    /// discarded.
    pub fn fail_volume(&self, volume: &str) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|key, _| key.volume != volume);
        let dropped = before - self.blocks.len();
        info!("volume {} failed: {} blocks discarded", volume, dropped);
        dropped
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
