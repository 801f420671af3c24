use std::collections::HashMap;

use alloy_primitives::B256;
use thiserror::Error;

use crate::node::Node;

/// Read access to serialized trie nodes by hash.
///
/// Implementations are read-only from the trie's point of view; traversal
/// never writes through this trait.
pub trait TrieStore {
    /// Resolves a node by the hash of its encoding.
    fn node(&self, hash: &B256) -> Result<Node, StoreError>;
}

/// Failures surfaced by a [`TrieStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced node could not be found.
    #[error("trie node {0} is not available in the store")]
    Unavailable(B256),
    /// A stored node could not be decoded.
    #[error("trie node {hash} could not be decoded: {source}")]
    Decode {
        hash: B256,
        source: crate::node::DecodeError,
    },
    /// The underlying storage failed.
    #[error("trie store backend failure: {0}")]
    Backend(String),
}

/// An in-memory node store keyed by node hash.
#[derive(Debug, Default)]
pub struct MemoryTrieStore {
    nodes: HashMap<B256, Node>,
}

impl MemoryTrieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node under its hash and returns the hash, so tries can be
    /// assembled bottom-up.
    pub fn insert(&mut self, node: Node) -> B256 {
        let hash = node.hash();
        self.nodes.insert(hash, node);
        hash
    }
}

impl TrieStore for MemoryTrieStore {
    fn node(&self, hash: &B256) -> Result<Node, StoreError> {
        self.nodes
            .get(hash)
            .cloned()
            .ok_or(StoreError::Unavailable(*hash))
    }
}
