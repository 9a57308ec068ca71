//! Cryptographic primitives for the event ledger.
//!
//! The ledger chains events with SHA-256 digests; this module owns the digest
//! type, the hashing entry point, and the constant-time comparison used when
//! verifying stored hashes.

mod hash;

pub use hash::{EventHasher, HASH_SIZE, Hash, encode_hex, hash_from_slice};
