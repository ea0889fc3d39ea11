//! Work value computation.

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

use raze_types::BlockHash;

type Blake2b64 = Blake2b<U8>;

/// The difficulty achieved by `work` against `root`:
/// the 8-byte Blake2b digest of `work_le ‖ root`, read little-endian.
pub fn work_value(root: &BlockHash, work: u64) -> u64 {
    let mut hasher = Blake2b64::new();
    hasher.update(work.to_le_bytes());
    hasher.update(root.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest.into())
}

/// Whether `work` meets `threshold` for `root`.
pub fn work_validate(root: &BlockHash, work: u64, threshold: u64) -> bool {
    work_value(root, work) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_deterministic() {
        let root = BlockHash::new([0x42; 32]);
        assert_eq!(work_value(&root, 1234), work_value(&root, 1234));
    }

    #[test]
    fn value_depends_on_root_and_nonce() {
        let a = BlockHash::new([1; 32]);
        let b = BlockHash::new([2; 32]);
        assert_ne!(work_value(&a, 7), work_value(&b, 7));
        assert_ne!(work_value(&a, 7), work_value(&a, 8));
    }

    #[test]
    fn validate_is_threshold_inclusive() {
        let root = BlockHash::new([3; 32]);
        let value = work_value(&root, 99);
        assert!(work_validate(&root, 99, value));
        assert!(!work_validate(&root, 99, value.saturating_add(1)));
        assert!(work_validate(&root, 99, 0));
    }
}
