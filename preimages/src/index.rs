//! Persistent preimage index: hash-of-key to raw key, plus the checkpoint
//! recording the last fully extracted block.
//!
//! Upserts are staged in memory and become durable only on [`PreimageIndex::commit`],
//! which writes the staged entries and the checkpoint in a single write
//! transaction. A crash before commit leaves the file exactly as the
//! previous run published it.

use std::collections::BTreeMap;
use std::path::Path;

use alloy_primitives::B256;
use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};

const PREIMAGES: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("preimages");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Fixed meta key holding the checkpoint, encoded as ASCII decimal.
const LAST_EXTRACTED_BLOCK: &str = "last_extracted_block";

pub struct PreimageIndex {
    db: Database,
    staged: BTreeMap<B256, Vec<u8>>,
    staged_checkpoint: Option<u64>,
}

impl PreimageIndex {
    /// Creates the index file, or reopens an existing one to accumulate
    /// into it.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("opening preimage index at {}", path.display()))?;
        Ok(Self {
            db,
            staged: BTreeMap::new(),
            staged_checkpoint: None,
        })
    }

    /// The last fully committed block height, or `None` on a fresh index.
    pub fn checkpoint(&self) -> Result<Option<u64>> {
        let tx = self.db.begin_read()?;
        let table = match tx.open_table(META) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e).context("opening meta table"),
        };
        let Some(raw) = table.get(LAST_EXTRACTED_BLOCK)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(raw.value()).context("checkpoint is not valid text")?;
        let height = text.parse().context("checkpoint is not a block height")?;
        Ok(Some(height))
    }

    /// Stages a preimage entry. Staging the same pair twice is a no-op.
    pub fn upsert(&mut self, hash: B256, key: Vec<u8>) {
        self.staged.insert(hash, key);
    }

    /// Stages the checkpoint to be committed with the current batch.
    pub fn set_checkpoint(&mut self, height: u64) {
        self.staged_checkpoint = Some(height);
    }

    /// Durably writes every staged entry and the staged checkpoint as one
    /// all-or-nothing batch.
    pub fn commit(&mut self) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let mut preimages = tx.open_table(PREIMAGES)?;
            for (hash, key) in &self.staged {
                preimages.insert(&hash.0, key.as_slice())?;
            }
            if let Some(height) = self.staged_checkpoint {
                let mut meta = tx.open_table(META)?;
                meta.insert(LAST_EXTRACTED_BLOCK, height.to_string().as_bytes())?;
            }
        }
        tx.commit().context("committing preimage index")?;
        self.staged.clear();
        self.staged_checkpoint = None;
        Ok(())
    }

    /// Number of committed entries.
    pub fn len(&self) -> Result<u64> {
        let tx = self.db.begin_read()?;
        match tx.open_table(PREIMAGES) {
            Ok(table) => Ok(table.len()?),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(e).context("opening preimages table"),
        }
    }

    /// The committed raw key for `hash`, if present.
    pub fn get(&self, hash: &B256) -> Result<Option<Vec<u8>>> {
        let tx = self.db.begin_read()?;
        let table = match tx.open_table(PREIMAGES) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e).context("opening preimages table"),
        };
        Ok(table.get(&hash.0)?.map(|guard| guard.value().to_vec()))
    }
}
