use alloy_primitives::{keccak256, B256};
use thiserror::Error;

use crate::path::TrieKeyPath;

const HAS_VALUE: u8 = 0x01;
const HAS_LEFT: u8 = 0x02;
const HAS_RIGHT: u8 = 0x04;

/// A compressed-prefix binary trie node.
///
/// Children are referenced by the hash of their encoding and resolved
/// through a [`crate::TrieStore`]. A node is terminal when it stores a
/// value; terminal nodes may still have children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The path segment this node compresses, appended to the parent path
    /// and branch bit to form the node's full key.
    pub prefix: TrieKeyPath,
    pub value: Option<Vec<u8>>,
    pub left: Option<B256>,
    pub right: Option<B256>,
}

/// Failure to decode a serialized node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of node encoding")]
    Truncated,
    #[error("reserved node flag bits are set: {0:#04x}")]
    ReservedFlags(u8),
}

impl Node {
    pub fn leaf(prefix: TrieKeyPath, value: Vec<u8>) -> Self {
        Self {
            prefix,
            value: Some(value),
            left: None,
            right: None,
        }
    }

    pub fn branch(
        prefix: TrieKeyPath,
        left: Option<B256>,
        right: Option<B256>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            prefix,
            value,
            left,
            right,
        }
    }

    /// True iff the node stores a value, i.e. is a leaf of the key space.
    pub fn is_terminal(&self) -> bool {
        self.value.is_some()
    }

    /// Hash of the node's encoding; the identity children are stored under.
    pub fn hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }

    /// Serializes the node: a flags byte, the big-endian prefix bit length,
    /// the packed prefix, the child hashes, then the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.value.is_some() {
            flags |= HAS_VALUE;
        }
        if self.left.is_some() {
            flags |= HAS_LEFT;
        }
        if self.right.is_some() {
            flags |= HAS_RIGHT;
        }

        let prefix_len = self.prefix.len() as u16;
        let mut out = Vec::with_capacity(3 + self.prefix.len() / 8 + 64);
        out.push(flags);
        out.extend_from_slice(&prefix_len.to_be_bytes());
        out.extend_from_slice(&self.prefix.encode());
        if let Some(left) = &self.left {
            out.extend_from_slice(left.as_slice());
        }
        if let Some(right) = &self.right {
            out.extend_from_slice(right.as_slice());
        }
        if let Some(value) = &self.value {
            out.extend_from_slice(value);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut rest = bytes;
        let flags = *rest.first().ok_or(DecodeError::Truncated)?;
        if flags & !(HAS_VALUE | HAS_LEFT | HAS_RIGHT) != 0 {
            return Err(DecodeError::ReservedFlags(flags));
        }
        rest = &rest[1..];

        if rest.len() < 2 {
            return Err(DecodeError::Truncated);
        }
        let prefix_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];

        let prefix_bytes = prefix_len.div_ceil(8);
        if rest.len() < prefix_bytes {
            return Err(DecodeError::Truncated);
        }
        let prefix = TrieKeyPath::from_encoded(&rest[..prefix_bytes], prefix_len);
        rest = &rest[prefix_bytes..];

        let mut left = None;
        if flags & HAS_LEFT != 0 {
            if rest.len() < 32 {
                return Err(DecodeError::Truncated);
            }
            left = Some(B256::from_slice(&rest[..32]));
            rest = &rest[32..];
        }
        let mut right = None;
        if flags & HAS_RIGHT != 0 {
            if rest.len() < 32 {
                return Err(DecodeError::Truncated);
            }
            right = Some(B256::from_slice(&rest[..32]));
            rest = &rest[32..];
        }
        let value = (flags & HAS_VALUE != 0).then(|| rest.to_vec());

        Ok(Self {
            prefix,
            value,
            left,
            right,
        })
    }
}
