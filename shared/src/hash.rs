use std::ops::Range;

use sha2::{Digest, Sha256};

/// SHA-256 of `"{data} {nonce}"`, truncated to the first 8 bytes (big endian).
pub fn hash(data: &str, nonce: u64) -> u64 {
    let digest = Sha256::digest(format!("{data} {nonce}").as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Minimum `(hash, nonce)` over `range`. On equal hashes the smaller nonce wins.
pub fn search(data: &str, range: Range<u64>) -> Option<(u64, u64)> {
    range.map(|nonce| (hash(data, nonce), nonce)).min()
}
