//! The extraction run: walk every block trie from the checkpoint to the
//! chain head, collect storage-key preimages, then advance the checkpoint
//! and commit in one batch.
//!
//! Checkpointing is per run, at block granularity. A crash anywhere before
//! the commit discards the staged entries and the next run redoes the whole
//! range from the previous checkpoint, which is safe because upserts are
//! idempotent and entries are never removed.

use anyhow::{Context, Result};
use tracing::{debug, info, trace};
use unitrie::{Trie, TrieStore};

use crate::index::PreimageIndex;
use crate::progress::Progress;
use crate::recognizer::{storage_key, storage_key_hash};
use crate::stores::{ChainStore, StateRootIndex};

/// What one run did, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub from: u64,
    pub to: u64,
    pub blocks_scanned: u64,
    pub keys_collected: u64,
    pub total_entries: u64,
}

/// Runs one extraction pass over `[checkpoint + 1, head]`.
///
/// A fresh index records the current head as its checkpoint without
/// scanning, so extraction tracks the chain forward from the first run. An
/// index already at (or past) the head is left untouched.
pub fn run<C, R, T, P>(
    chain: &C,
    roots: &R,
    tries: &T,
    index: &mut PreimageIndex,
    progress: &mut P,
) -> Result<RunSummary>
where
    C: ChainStore,
    R: StateRootIndex,
    T: TrieStore,
    P: Progress,
{
    let to = chain.head_height().context("resolving the chain head")?;
    let checkpoint = index.checkpoint()?;
    let from = match checkpoint {
        Some(height) => height + 1,
        None => to + 1,
    };

    let mut summary = RunSummary {
        from,
        to,
        blocks_scanned: 0,
        keys_collected: 0,
        total_entries: 0,
    };

    if from <= to {
        info!(from, to, "collecting storage keys");
        progress.range_started(from, to);
        for height in from..=to {
            let collected = scan_block(chain, roots, tries, index, height)
                .with_context(|| format!("extracting storage keys from block {height}"))?;
            progress.block_scanned(height, collected);
            summary.blocks_scanned += 1;
            summary.keys_collected += collected;
        }
        index.set_checkpoint(to);
        index.commit()?;
    } else {
        match checkpoint {
            // first run over this index: record the head so later runs
            // scan forward from it
            None => {
                info!(head = to, "fresh index, starting at the current head");
                index.set_checkpoint(to);
                index.commit()?;
            }
            Some(done) => debug!(checkpoint = done, head = to, "already caught up"),
        }
    }

    summary.total_entries = index.len()?;
    Ok(summary)
}

fn scan_block<C, R, T>(
    chain: &C,
    roots: &R,
    tries: &T,
    index: &mut PreimageIndex,
    height: u64,
) -> Result<u64>
where
    C: ChainStore,
    R: StateRootIndex,
    T: TrieStore,
{
    let block = chain.block_at(height)?;
    let root = roots.lookup(&block)?;
    let trie =
        Trie::open(tries, root).with_context(|| format!("materializing unitrie {root}"))?;

    let mut collected = 0u64;
    for element in trie.in_order() {
        let element = element.context("walking the unitrie")?;
        if let Some(raw) = storage_key(&element) {
            trace!(key = %hex::encode(&raw), "collected storage key");
            index.upsert(storage_key_hash(&raw), raw);
            collected += 1;
        }
    }
    debug!(height, collected, "scanned block trie");
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::recognizer::{storage_key_hash, STORAGE_KEY_OFFSET};
    use crate::stores::{BlockRef, ChainStoreError};
    use alloy_primitives::B256;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::tempdir;
    use unitrie::{MemoryTrieStore, Node, TrieKeyPath};

    struct MemoryChain {
        blocks: BTreeMap<u64, BlockRef>,
    }

    impl ChainStore for MemoryChain {
        fn head_height(&self) -> Result<u64, ChainStoreError> {
            self.blocks
                .keys()
                .next_back()
                .copied()
                .ok_or(ChainStoreError::EmptyChain)
        }

        fn block_at(&self, height: u64) -> Result<BlockRef, ChainStoreError> {
            self.blocks
                .get(&height)
                .copied()
                .ok_or(ChainStoreError::BlockNotFound(height))
        }
    }

    struct MemoryRoots {
        roots: HashMap<B256, B256>,
    }

    impl StateRootIndex for MemoryRoots {
        fn lookup(&self, block: &BlockRef) -> Result<B256, ChainStoreError> {
            self.roots
                .get(&block.state_root)
                .copied()
                .ok_or(ChainStoreError::RootNotFound(block.state_root))
        }
    }

    /// Full storage-cell path: the 42-byte prefix followed by the raw key.
    fn cell_path(first_byte: u8, raw_key: &[u8]) -> Vec<u8> {
        let mut path = vec![0u8; STORAGE_KEY_OFFSET];
        path[0] = first_byte;
        path.extend_from_slice(raw_key);
        path
    }

    fn leaf_with_path(full_path: &[u8], skip_bits: usize, value: u8) -> Node {
        let bits = TrieKeyPath::from_bytes(full_path);
        Node::leaf(bits.slice(skip_bits, bits.len()), vec![value])
    }

    /// The three-leaf trie: one cell with the 1-byte key 0x01, two cells on
    /// divergent paths sharing the 2-byte key 0xABCD.
    fn three_leaf_trie(store: &mut MemoryTrieStore) -> B256 {
        let fa = cell_path(0x00, &[0x01]);
        let fb = cell_path(0x80, &[0xAB, 0xCD]);
        let fc = cell_path(0xC0, &[0xAB, 0xCD]);

        let a = store.insert(leaf_with_path(&fa, 1, 1));
        let b = store.insert(leaf_with_path(&fb, 2, 2));
        let c = store.insert(leaf_with_path(&fc, 2, 3));
        let branch = store.insert(Node::branch(TrieKeyPath::empty(), Some(b), Some(c), None));
        store.insert(Node::branch(TrieKeyPath::empty(), Some(a), Some(branch), None))
    }

    /// A trie whose root itself is a storage cell with the given raw key.
    fn single_cell_trie(store: &mut MemoryTrieStore, raw_key: &[u8]) -> B256 {
        let full = cell_path(0x00, raw_key);
        store.insert(Node::leaf(TrieKeyPath::from_bytes(&full), vec![9]))
    }

    fn chain_of(roots: &[(u64, B256)]) -> (MemoryChain, MemoryRoots) {
        let mut blocks = BTreeMap::new();
        let mut translations = HashMap::new();
        for (height, trie_root) in roots {
            let header_root = B256::repeat_byte(*height as u8);
            blocks.insert(
                *height,
                BlockRef {
                    number: *height,
                    state_root: header_root,
                },
            );
            translations.insert(header_root, *trie_root);
        }
        (MemoryChain { blocks }, MemoryRoots { roots: translations })
    }

    fn checkpointed_index(path: &std::path::Path, height: u64) -> PreimageIndex {
        let mut index = PreimageIndex::open(path).unwrap();
        index.set_checkpoint(height);
        index.commit().unwrap();
        index
    }

    #[test]
    fn extracts_distinct_keys_from_the_three_leaf_trie() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let root = three_leaf_trie(&mut store);
        let (chain, roots) = chain_of(&[(1, root)]);
        let mut index = checkpointed_index(&dir.path().join("index.redb"), 0);

        let summary = run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();

        assert_eq!(summary.blocks_scanned, 1);
        assert_eq!(summary.keys_collected, 3);
        // the two 0xABCD cells collapse into one entry
        assert_eq!(summary.total_entries, 2);
        assert_eq!(
            index.get(&storage_key_hash(&[0x01])).unwrap(),
            Some(vec![0x01])
        );
        assert_eq!(
            index.get(&storage_key_hash(&[0xAB, 0xCD])).unwrap(),
            Some(vec![0xAB, 0xCD])
        );
        assert_eq!(index.checkpoint().unwrap(), Some(1));
    }

    #[test]
    fn fresh_index_records_the_head_without_scanning() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let root = three_leaf_trie(&mut store);
        let (chain, roots) = chain_of(&[(1, root), (2, root), (3, root)]);
        let mut index = PreimageIndex::open(&dir.path().join("index.redb")).unwrap();

        let summary = run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();

        assert_eq!(summary.blocks_scanned, 0);
        assert_eq!(summary.total_entries, 0);
        assert_eq!(index.checkpoint().unwrap(), Some(3));
    }

    #[test]
    fn caught_up_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let root = three_leaf_trie(&mut store);
        let (chain, roots) = chain_of(&[(1, root)]);
        let mut index = checkpointed_index(&dir.path().join("index.redb"), 0);

        run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();
        let entries = index.len().unwrap();

        let again = run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();
        assert_eq!(again.blocks_scanned, 0);
        assert_eq!(again.total_entries, entries);
        assert_eq!(index.checkpoint().unwrap(), Some(1));
    }

    #[test]
    fn successive_ranges_accumulate_and_advance_the_checkpoint() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let first = three_leaf_trie(&mut store);
        let second = single_cell_trie(&mut store, &[0x7F]);

        let (chain, roots) = chain_of(&[(1, first)]);
        let mut index = checkpointed_index(&dir.path().join("index.redb"), 0);
        run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();

        let (chain, roots) = chain_of(&[(1, first), (2, second)]);
        let summary = run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();

        assert_eq!(summary.from, 2);
        assert_eq!(summary.blocks_scanned, 1);
        assert_eq!(index.checkpoint().unwrap(), Some(2));
        // union of both ranges
        assert_eq!(summary.total_entries, 3);
        assert_eq!(
            index.get(&storage_key_hash(&[0x7F])).unwrap(),
            Some(vec![0x7F])
        );
    }

    #[test]
    fn rescanning_the_same_range_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let root = three_leaf_trie(&mut store);
        let (chain, roots) = chain_of(&[(1, root)]);

        // as after a crash between staging and commit: the checkpoint still
        // points at the previous run
        let path = dir.path().join("index.redb");
        {
            let mut index = checkpointed_index(&path, 0);
            run(&chain, &roots, &store, &mut index, &mut NoProgress).unwrap();
        }
        let mut interrupted = checkpointed_index(&dir.path().join("other.redb"), 0);
        {
            // stage without committing, then drop
            let block = chain.block_at(1).unwrap();
            let trie_root = roots.lookup(&block).unwrap();
            let trie = Trie::open(&store, trie_root).unwrap();
            for element in trie.in_order() {
                if let Some(raw) = storage_key(&element.unwrap()) {
                    interrupted.upsert(storage_key_hash(&raw), raw);
                }
            }
        }
        drop(interrupted);
        let mut resumed = PreimageIndex::open(&dir.path().join("other.redb")).unwrap();
        run(&chain, &roots, &store, &mut resumed, &mut NoProgress).unwrap();

        let uninterrupted = PreimageIndex::open(&path).unwrap();
        assert_eq!(resumed.len().unwrap(), uninterrupted.len().unwrap());
        assert_eq!(resumed.checkpoint().unwrap(), uninterrupted.checkpoint().unwrap());
    }

    #[test]
    fn missing_block_aborts_the_run_without_advancing() {
        let dir = tempdir().unwrap();
        let mut store = MemoryTrieStore::new();
        let root = three_leaf_trie(&mut store);
        // head is 3 but block 2 was never stored
        let (chain, roots) = chain_of(&[(1, root), (3, root)]);
        let mut index = checkpointed_index(&dir.path().join("index.redb"), 1);

        assert!(run(&chain, &roots, &store, &mut index, &mut NoProgress).is_err());
        assert_eq!(index.checkpoint().unwrap(), Some(1));
        assert_eq!(index.len().unwrap(), 0);
    }

    #[test]
    fn unresolvable_trie_aborts_the_run() {
        let dir = tempdir().unwrap();
        let store = MemoryTrieStore::new();
        let (chain, roots) = chain_of(&[(1, B256::repeat_byte(0x55))]);
        let mut index = checkpointed_index(&dir.path().join("index.redb"), 0);

        assert!(run(&chain, &roots, &store, &mut index, &mut NoProgress).is_err());
        assert_eq!(index.checkpoint().unwrap(), Some(0));
    }
}
