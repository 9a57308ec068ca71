//! SHA-256 hashing for ledger events.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Size of a SHA-256 hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte hash.
pub type Hash = [u8; HASH_SIZE];

/// Hasher for ledger events.
///
/// An event's digest is computed over its canonical preimage, which embeds
/// the previous event's hash; the ledger writer builds the preimage, this
/// type only digests and compares.
pub struct EventHasher;

impl EventHasher {
    /// Digests a preimage.
    #[must_use]
    pub fn digest(preimage: &[u8]) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(preimage);
        hasher.finalize().into()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn matches(computed: &Hash, stored: &Hash) -> bool {
        computed[..].ct_eq(&stored[..]).into()
    }
}

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Converts a stored blob into a [`Hash`], if it has the right length.
#[must_use]
pub fn hash_from_slice(bytes: &[u8]) -> Option<Hash> {
    <Hash>::try_from(bytes).ok()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        let a = EventHasher::digest(b"preimage");
        let b = EventHasher::digest(b"preimage");
        assert_eq!(a, b);

        let c = EventHasher::digest(b"different");
        assert_ne!(a, c);
    }

    #[test]
    fn test_digest_known_vector() {
        // SHA-256 of the empty string.
        let empty = EventHasher::digest(b"");
        assert_eq!(
            encode_hex(&empty),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_matches() {
        let a = EventHasher::digest(b"x");
        let b = EventHasher::digest(b"x");
        let c = EventHasher::digest(b"y");
        assert!(EventHasher::matches(&a, &b));
        assert!(!EventHasher::matches(&a, &c));
    }

    #[test]
    fn test_encode_hex() {
        assert_eq!(encode_hex(&[0x00, 0xff, 0x0a]), "00ff0a");
        assert_eq!(encode_hex(&[]), "");
    }

    #[test]
    fn test_hash_from_slice() {
        assert!(hash_from_slice(&[0u8; 32]).is_some());
        assert!(hash_from_slice(&[0u8; 31]).is_none());
        assert!(hash_from_slice(&[]).is_none());
    }
}
