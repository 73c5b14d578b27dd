//! Fault injection for read verification.
//!
//! A testing affordance, not production behavior: with a configured
//! per-block probability, one pseudo-random bit of a fetched block is
//! flipped before parity verification runs. Disabled by default (zero
//! probability); enabled per invocation via a CLI flag.

use rand::Rng;

/// Per-block single-bit corruptor.
#[derive(Debug, Clone, Copy)]
pub struct FaultInjector {
    probability: f64,
}

impl FaultInjector {
    /// `probability` is clamped to [0, 1]; 0 disables injection.
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn is_enabled(&self) -> bool {
        self.probability > 0.0
    }

    /// With the configured probability, flip one random bit of
    /// `block`. Returns whether a flip happened.
    pub fn maybe_corrupt(&self, block: &mut [u8]) -> bool {
        if block.is_empty() || self.probability <= 0.0 {
            return false;
        }
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.probability) {
            return false;
        }
        let bit = rng.gen_range(0..block.len() * 8);
        block[bit / 8] ^= 1 << (bit % 8);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_injector_never_corrupts() {
        let injector = FaultInjector::disabled();
        let mut block = vec![0x5au8; 256];
        for _ in 0..100 {
            assert!(!injector.maybe_corrupt(&mut block));
        }
        assert_eq!(block, vec![0x5au8; 256]);
    }

    #[test]
    fn test_certain_injector_flips_exactly_one_bit() {
        let injector = FaultInjector::new(1.0);
        for _ in 0..20 {
            let original = vec![0u8; 64];
            let mut block = original.clone();
            assert!(injector.maybe_corrupt(&mut block));
            let flipped: u32 = block
                .iter()
                .zip(&original)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
            assert_eq!(flipped, 1);
        }
    }

    #[test]
    fn test_probability_is_clamped() {
        assert!(FaultInjector::new(7.5).is_enabled());
        assert!(!FaultInjector::new(-1.0).is_enabled());
    }
}
