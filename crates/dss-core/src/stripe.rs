//! Striping and rotating-parity math.
//!
//! A file is cut into stripes of (n−1)·su source bytes. Each stripe
//! yields n−1 data blocks of exactly su bytes (the tail zero-padded)
//! plus one parity block, the bytewise XOR of the data blocks. The
//! parity slot rotates backward through the n slots:
//!
//!   parity_slot(s) = n − ((s mod n) + 1)
//!
//! so no single disk becomes a parity hotspot. Data blocks fill the
//! remaining slots in increasing slot order.
//!
//! Everything here is pure; the network drivers in `dssdisk` and the
//! client live elsewhere.

use dss_proto::block::BlockType;
use dss_proto::{DssError, DssResult};

/// Stripe geometry of one volume: member count and striping unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeGeometry {
    pub n: usize,
    pub su: usize,
}

impl StripeGeometry {
    pub fn new(n: usize, su: usize) -> Self {
        Self { n, su }
    }

    /// Source bytes consumed by one full stripe.
    pub fn data_per_stripe(&self) -> usize {
        (self.n - 1) * self.su
    }

    /// Number of stripes needed for a file of `size` bytes.
    pub fn stripe_count(&self, size: u64) -> u64 {
        size.div_ceil(self.data_per_stripe() as u64)
    }

    /// Slot holding parity for the given stripe index.
    pub fn parity_slot(&self, stripe: u64) -> usize {
        self.n - ((stripe as usize % self.n) + 1)
    }

    /// Slot holding data block `index` (0..n-1) of the given stripe.
    pub fn slot_for_data_index(&self, stripe: u64, index: usize) -> usize {
        if index < self.parity_slot(stripe) {
            index
        } else {
            index + 1
        }
    }

    /// Data block index stored at `slot` for the given stripe, or
    /// `None` if the slot holds parity.
    pub fn data_index_for_slot(&self, stripe: u64, slot: usize) -> Option<usize> {
        let parity = self.parity_slot(stripe);
        match slot.cmp(&parity) {
            std::cmp::Ordering::Less => Some(slot),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(slot - 1),
        }
    }

    /// The slice of `data` covered by stripe `stripe`.
    pub fn stripe_source<'a>(&self, data: &'a [u8], stripe: u64) -> &'a [u8] {
        let per = self.data_per_stripe();
        let start = (stripe as usize) * per;
        let end = (start + per).min(data.len());
        &data[start..end]
    }

    /// Cut one stripe's source bytes into n−1 data blocks of exactly
    /// su bytes, zero-padding the tail.
    pub fn split_stripe(&self, source: &[u8]) -> Vec<Vec<u8>> {
        (0..self.n - 1)
            .map(|i| {
                let start = (i * self.su).min(source.len());
                let end = ((i + 1) * self.su).min(source.len());
                let mut block = source[start..end].to_vec();
                block.resize(self.su, 0);
                block
            })
            .collect()
    }

    /// Build the n placed blocks for stripe `stripe`: each entry is
    /// (slot, role, payload), with parity at the rotated slot and data
    /// blocks at the remaining slots in increasing order.
    pub fn build_stripe(&self, stripe: u64, source: &[u8]) -> Vec<(usize, BlockType, Vec<u8>)> {
        let data = self.split_stripe(source);
        let parity = xor_parity(&data);
        let parity_slot = self.parity_slot(stripe);

        let mut placed = Vec::with_capacity(self.n);
        for slot in 0..self.n {
            match self.data_index_for_slot(stripe, slot) {
                Some(idx) => placed.push((slot, BlockType::Data, data[idx].clone())),
                None => placed.push((slot, BlockType::Parity, parity.clone())),
            }
        }
        debug_assert_eq!(placed[parity_slot].1, BlockType::Parity);
        placed
    }

    /// Verify one fetched stripe and extract its (n−1)·su data bytes.
    ///
    /// `slots[i]` is the block fetched from slot i. Every block must be
    /// exactly su bytes and the XOR of the data slots must equal the
    /// parity slot; otherwise the stripe is reported as a parity
    /// mismatch and the caller re-fetches.
    pub fn verify_and_extract(&self, stripe: u64, slots: &[Vec<u8>]) -> DssResult<Vec<u8>> {
        if slots.len() != self.n || slots.iter().any(|b| b.len() != self.su) {
            return Err(DssError::ParityMismatch);
        }
        let parity_slot = self.parity_slot(stripe);

        let mut xor = vec![0u8; self.su];
        for (slot, block) in slots.iter().enumerate() {
            if slot == parity_slot {
                continue;
            }
            xor_into(&mut xor, block);
        }
        if xor != slots[parity_slot] {
            return Err(DssError::ParityMismatch);
        }

        let mut out = Vec::with_capacity(self.data_per_stripe());
        for (slot, block) in slots.iter().enumerate() {
            if slot != parity_slot {
                out.extend_from_slice(block);
            }
        }
        Ok(out)
    }
}

/// Bytewise XOR of all blocks. All blocks must share one length.
pub fn xor_parity(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut acc = vec![0u8; blocks.first().map_or(0, Vec::len)];
    for block in blocks {
        xor_into(&mut acc, block);
    }
    acc
}

/// XOR `src` into `acc` in place.
pub fn xor_into(acc: &mut [u8], src: &[u8]) {
    for (a, b) in acc.iter_mut().zip(src) {
        *a ^= b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parity_rotation_cycles_with_period_n() {
        for n in 3..=6 {
            let geom = StripeGeometry::new(n, 128);
            // First n stripes hit every slot exactly once, backward
            let first: Vec<usize> = (0..n as u64).map(|s| geom.parity_slot(s)).collect();
            let expected: Vec<usize> = (0..n).rev().collect();
            assert_eq!(first, expected, "n={n}");
            // Period n
            for s in 0..(3 * n as u64) {
                assert_eq!(geom.parity_slot(s), geom.parity_slot(s + n as u64));
            }
        }
    }

    #[test]
    fn test_slot_mapping_is_a_bijection() {
        let geom = StripeGeometry::new(5, 128);
        for stripe in 0..10u64 {
            let parity = geom.parity_slot(stripe);
            let mut seen = vec![false; 5];
            seen[parity] = true;
            for idx in 0..4 {
                let slot = geom.slot_for_data_index(stripe, idx);
                assert!(!seen[slot], "slot {slot} mapped twice");
                seen[slot] = true;
                assert_eq!(geom.data_index_for_slot(stripe, slot), Some(idx));
            }
            assert_eq!(geom.data_index_for_slot(stripe, parity), None);
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_split_stripe_pads_tail_with_zeros() {
        // The 1500-byte example: n=3, su=512 → 2 stripes of 1024
        let geom = StripeGeometry::new(3, 512);
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(geom.stripe_count(1500), 2);

        let last = geom.stripe_source(&data, 1);
        assert_eq!(last.len(), 476);
        let blocks = geom.split_stripe(last);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 512);
        assert_eq!(blocks[1].len(), 512);
        assert_eq!(&blocks[0][..476], last);
        assert!(blocks[0][476..].iter().all(|&b| b == 0));
        assert!(blocks[1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parity_invariant_per_stripe() {
        let geom = StripeGeometry::new(4, 256);
        let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        for stripe in 0..geom.stripe_count(data.len() as u64) {
            let placed = geom.build_stripe(stripe, geom.stripe_source(&data, stripe));
            let parity_slot = geom.parity_slot(stripe);
            let xor = xor_parity(
                &placed
                    .iter()
                    .filter(|(slot, _, _)| *slot != parity_slot)
                    .map(|(_, _, b)| b.clone())
                    .collect::<Vec<_>>(),
            );
            assert_eq!(xor, placed[parity_slot].2);
        }
    }

    #[test]
    fn test_round_trip_arbitrary_lengths() {
        for (n, su, len) in [(3, 512, 1500usize), (3, 128, 1), (4, 256, 4096), (5, 128, 700)] {
            let geom = StripeGeometry::new(n, su);
            let data: Vec<u8> = (0..len as u32).map(|i| (i % 255) as u8).collect();

            // Stripe out into a simulated store keyed by (stripe, slot)
            let mut store: HashMap<(u64, usize), Vec<u8>> = HashMap::new();
            for stripe in 0..geom.stripe_count(len as u64) {
                for (slot, _, block) in geom.build_stripe(stripe, geom.stripe_source(&data, stripe))
                {
                    store.insert((stripe, slot), block);
                }
            }

            // Reconstruct and truncate to the declared size
            let mut out = Vec::new();
            for stripe in 0..geom.stripe_count(len as u64) {
                let slots: Vec<Vec<u8>> =
                    (0..n).map(|slot| store[&(stripe, slot)].clone()).collect();
                out.extend(geom.verify_and_extract(stripe, &slots).unwrap());
            }
            out.truncate(len);
            assert_eq!(out, data, "n={n} su={su} len={len}");
        }
    }

    #[test]
    fn test_corruption_is_detected() {
        let geom = StripeGeometry::new(3, 512);
        let data = vec![0xabu8; 1024];
        let placed = geom.build_stripe(0, &data);
        let mut slots: Vec<Vec<u8>> = placed.into_iter().map(|(_, _, b)| b).collect();
        slots[1][17] ^= 0x04; // one flipped bit
        assert_eq!(
            geom.verify_and_extract(0, &slots),
            Err(DssError::ParityMismatch)
        );
    }

    #[test]
    fn test_missing_slot_equals_xor_of_survivors() {
        // Single-disk reconstruction: any one slot is the XOR of the
        // other n−1, whether it held data or parity.
        let geom = StripeGeometry::new(4, 128);
        let data: Vec<u8> = (0..384u32).map(|i| (i * 13 % 256) as u8).collect();
        for stripe in 0..4u64 {
            let placed = geom.build_stripe(stripe, geom.stripe_source(&data, 0));
            let blocks: Vec<Vec<u8>> = placed.into_iter().map(|(_, _, b)| b).collect();
            for lost in 0..4 {
                let survivors: Vec<Vec<u8>> = blocks
                    .iter()
                    .enumerate()
                    .filter(|(slot, _)| *slot != lost)
                    .map(|(_, b)| b.clone())
                    .collect();
                assert_eq!(xor_parity(&survivors), blocks[lost]);
            }
        }
    }
}
