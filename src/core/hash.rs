//! State Hashing for Verification
//!
//! Provides deterministic hashing of world state for:
//! - Cross-replica desync detection (clients report folded hashes)
//! - Replay validation of recorded turns

use serde::Serialize;
use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for world state.
///
/// Wraps SHA-256 with helpers for the primitive types the world stores.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world state.
    pub fn for_world_state() -> Self {
        Self::new(b"WARFRONT_STATE_V1")
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u16 value (little-endian).
    #[inline]
    pub fn update_u16(&mut self, value: u16) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with the canonical bincode encoding of a record.
    ///
    /// Records must only contain ordered collections (`Vec`, `BTreeMap`,
    /// `BTreeSet`) so the encoding is identical on every replica.
    pub fn update_encoded<T: Serialize>(&mut self, value: &T) -> Result<(), bincode::Error> {
        let bytes = bincode::serialize(value)?;
        self.update_u32(bytes.len() as u32);
        self.hasher.update(&bytes);
        Ok(())
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Fold a 256-bit hash to the 64-bit value clients report over the wire.
pub fn fold_hash(hash: &StateHash) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(word)
}

/// Compute world state hash.
///
/// The tick is always hashed first, then whatever the closure adds.
pub fn compute_state_hash<F>(tick: u32, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_world_state();
    hasher.update_u32(tick);
    add_state(&mut hasher);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_world_state();
            hasher.update_u32(100);
            hasher.update_u16(12345);
            hasher.update_encoded(&("player", -7i64)).unwrap();
            hasher.update_bool(true);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_encoded_btreemap_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert(3u16, 10i32);
        a.insert(1u16, 20i32);
        let mut b = BTreeMap::new();
        b.insert(1u16, 20i32);
        b.insert(3u16, 10i32);

        let mut ha = StateHasher::new(b"test");
        ha.update_encoded(&a).unwrap();
        let mut hb = StateHasher::new(b"test");
        hb.update_encoded(&b).unwrap();

        assert_eq!(ha.finalize(), hb.finalize());
    }

    #[test]
    fn test_compute_state_hash() {
        let hash = compute_state_hash(100, |hasher| hasher.update_bool(true));
        let hash2 = compute_state_hash(100, |hasher| hasher.update_bool(true));
        let hash3 = compute_state_hash(101, |hasher| hasher.update_bool(true));

        assert_eq!(hash, hash2);
        assert_ne!(hash, hash3);
        assert_eq!(fold_hash(&hash), fold_hash(&hash2));
    }
}
