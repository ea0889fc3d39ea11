use proptest::prelude::*;

use raze_types::BlockHash;
use raze_work::{work_validate, work_value};

proptest! {
    /// Zero threshold accepts any nonce.
    #[test]
    fn zero_threshold_always_passes(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
    ) {
        let root = BlockHash::new(hash_bytes);
        prop_assert!(work_validate(&root, nonce, 0));
    }

    /// Validation is exactly `work_value >= threshold`.
    #[test]
    fn validate_matches_value(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
        threshold in any::<u64>(),
    ) {
        let root = BlockHash::new(hash_bytes);
        let value = work_value(&root, nonce);
        prop_assert_eq!(work_validate(&root, nonce, threshold), value >= threshold);
    }

    /// The value function is deterministic.
    #[test]
    fn value_is_deterministic(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
    ) {
        let root = BlockHash::new(hash_bytes);
        prop_assert_eq!(work_value(&root, nonce), work_value(&root, nonce));
    }

    /// Changing the root changes the value (collisions are negligible).
    #[test]
    fn value_depends_on_root(
        hash_bytes in prop::array::uniform32(0u8..),
        nonce in any::<u64>(),
    ) {
        let root = BlockHash::new(hash_bytes);
        let mut flipped = hash_bytes;
        flipped[0] ^= 0x01;
        let other = BlockHash::new(flipped);
        prop_assert_ne!(work_value(&root, nonce), work_value(&other, nonce));
    }
}
