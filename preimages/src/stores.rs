//! Collaborator interfaces for the extraction pipeline, plus the
//! node-database adapter that backs all of them with one redb file.
//!
//! The node database mirrors the three datasources a node keeps: `blocks`
//! (height to header state root), `stateRoots` (header state root to
//! unitrie root) and `unitrie` (node hash to encoded node).

use std::path::Path;

use alloy_primitives::B256;
use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use thiserror::Error;
use unitrie::{Node, StoreError, TrieStore};

const BLOCKS: TableDefinition<u64, &[u8; 32]> = TableDefinition::new("blocks");
const STATE_ROOTS: TableDefinition<&[u8; 32], &[u8; 32]> = TableDefinition::new("stateRoots");
const UNITRIE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("unitrie");

/// A block in the chain store, carrying what the pipeline needs: its height
/// and the state root its header commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub state_root: B256,
}

/// Failures from the chain-side collaborators. Every variant is fatal to a
/// run; ranges are not assumed to have gaps.
#[derive(Debug, Error)]
pub enum ChainStoreError {
    #[error("block {0} is not in the chain store")]
    BlockNotFound(u64),
    #[error("the chain store is empty")]
    EmptyChain,
    #[error("no unitrie root recorded for state root {0}")]
    RootNotFound(B256),
    #[error("chain store backend failure: {0}")]
    Backend(String),
}

/// Best-block and block-by-height retrieval.
pub trait ChainStore {
    fn head_height(&self) -> Result<u64, ChainStoreError>;
    fn block_at(&self, height: u64) -> Result<BlockRef, ChainStoreError>;
}

/// Translation from a block's header state root to the unitrie root hash.
pub trait StateRootIndex {
    fn lookup(&self, block: &BlockRef) -> Result<B256, ChainStoreError>;
}

/// Read-only view over a node database file.
pub struct NodeDatabase {
    db: Database,
}

impl NodeDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("opening node database at {}", path.display()))?;
        Ok(Self { db })
    }

    fn backend(e: impl std::error::Error) -> ChainStoreError {
        ChainStoreError::Backend(e.to_string())
    }
}

impl ChainStore for NodeDatabase {
    fn head_height(&self) -> Result<u64, ChainStoreError> {
        let tx = self.db.begin_read().map_err(Self::backend)?;
        let table = match tx.open_table(BLOCKS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Err(ChainStoreError::EmptyChain),
            Err(e) => return Err(Self::backend(e)),
        };
        let last = table.last().map_err(Self::backend)?;
        let (height, _) = last.ok_or(ChainStoreError::EmptyChain)?;
        Ok(height.value())
    }

    fn block_at(&self, height: u64) -> Result<BlockRef, ChainStoreError> {
        let tx = self.db.begin_read().map_err(Self::backend)?;
        let table = match tx.open_table(BLOCKS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(ChainStoreError::BlockNotFound(height))
            }
            Err(e) => return Err(Self::backend(e)),
        };
        let root = table
            .get(height)
            .map_err(Self::backend)?
            .ok_or(ChainStoreError::BlockNotFound(height))?;
        Ok(BlockRef {
            number: height,
            state_root: B256::from(root.value()),
        })
    }
}

impl StateRootIndex for NodeDatabase {
    fn lookup(&self, block: &BlockRef) -> Result<B256, ChainStoreError> {
        let tx = self.db.begin_read().map_err(Self::backend)?;
        let table = match tx.open_table(STATE_ROOTS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(ChainStoreError::RootNotFound(block.state_root))
            }
            Err(e) => return Err(Self::backend(e)),
        };
        let root = table
            .get(&block.state_root.0)
            .map_err(Self::backend)?
            .ok_or(ChainStoreError::RootNotFound(block.state_root))?;
        Ok(B256::from(root.value()))
    }
}

impl TrieStore for NodeDatabase {
    fn node(&self, hash: &B256) -> Result<Node, StoreError> {
        let backend = |e: redb::StorageError| StoreError::Backend(e.to_string());
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = match tx.open_table(UNITRIE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Err(StoreError::Unavailable(*hash)),
            Err(e) => return Err(StoreError::Backend(e.to_string())),
        };
        let raw = table
            .get(&hash.0)
            .map_err(backend)?
            .ok_or(StoreError::Unavailable(*hash))?;
        Node::from_bytes(raw.value()).map_err(|source| StoreError::Decode {
            hash: *hash,
            source,
        })
    }
}
