//! Shared primitive types and hashing helpers

use ethereum_types::{H160, H256};
use sha3::{Digest, Keccak256};

/// On-chain account / contract address
pub type Address = H160;

/// 32-byte content hash, used as the durable identifier of
/// envelopes, records and transactions
pub type Hash = H256;

/// Keccak-256 digest of arbitrary bytes
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Check that a string is non-empty and contains only hexadecimal
/// characters (no `0x` prefix expected)
pub fn is_hex_string(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Lowercase hex rendering without a `0x` prefix
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
