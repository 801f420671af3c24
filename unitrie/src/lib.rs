//! Read-only view of a unitrie: bit-level key paths, the compressed-prefix
//! binary node model, a pluggable node store, and an in-order cursor over
//! the trie reachable from a root hash.
//!
//! This crate only materializes and walks tries that already exist in a
//! store; it has no insertion or root-computation machinery.

mod node;
mod path;
mod store;
mod trie;

pub use node::{DecodeError, Node};
pub use path::TrieKeyPath;
pub use store::{MemoryTrieStore, StoreError, TrieStore};
pub use trie::{InOrderIterator, IterationElement, Trie};
