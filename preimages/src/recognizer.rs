//! Structural recognition of storage-slot nodes.
//!
//! The unitrie's fixed key layout puts every storage cell below a 42-byte
//! prefix: a domain marker, the 10-byte secure key, the 20-byte account
//! address, a storage marker, then the storage key's own secure key. Any
//! terminal node keyed deeper than that prefix is a storage cell, and the
//! path bytes beyond the prefix are the raw storage key a contract used.

use alloy_primitives::{keccak256, B256};
use unitrie::IterationElement;

/// Byte width of the hashed-key component embedded in every secure path.
pub const SECURE_KEY_SIZE: usize = 10;
/// Byte width of an account address.
pub const ADDRESS_LENGTH: usize = 20;
/// Byte offset at which the raw storage key starts inside an encoded
/// storage-cell path.
pub const STORAGE_KEY_OFFSET: usize = 1 + SECURE_KEY_SIZE + ADDRESS_LENGTH + 1 + SECURE_KEY_SIZE;

/// Extracts the raw storage key from a visited node, if the node is a
/// storage cell.
///
/// Non-terminal nodes and nodes at or above the storage depth yield `None`;
/// most of the trie (accounts, code, branch nodes) is expected to fall out
/// here.
pub fn storage_key(element: &IterationElement) -> Option<Vec<u8>> {
    if !element.node.is_terminal() {
        return None;
    }
    if element.key.len() <= STORAGE_KEY_OFFSET * 8 {
        return None;
    }
    let encoded = element.key.encode();
    Some(encoded[STORAGE_KEY_OFFSET..].to_vec())
}

/// Digest under which a raw storage key is indexed.
///
/// Keys shorter than 32 bytes are left-padded into a 32-byte word before
/// hashing; the fixed key layout never produces a longer key, which would
/// be hashed verbatim. The index stores the raw, unpadded key as the value.
pub fn storage_key_hash(raw: &[u8]) -> B256 {
    if raw.len() >= 32 {
        return keccak256(raw);
    }
    let mut word = [0u8; 32];
    word[32 - raw.len()..].copy_from_slice(raw);
    keccak256(word)
}
