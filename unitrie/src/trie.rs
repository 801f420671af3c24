use alloy_primitives::B256;

use crate::node::Node;
use crate::path::TrieKeyPath;
use crate::store::{StoreError, TrieStore};

/// A trie materialized from a root hash over a node store.
///
/// Only the root is resolved up front; the rest of the tree is pulled from
/// the store as traversal reaches it.
#[derive(Debug)]
pub struct Trie<'s, S: TrieStore> {
    store: &'s S,
    root_hash: B256,
    root: Node,
}

/// A visited node paired with its full key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationElement {
    pub key: TrieKeyPath,
    pub node: Node,
}

impl<'s, S: TrieStore> Trie<'s, S> {
    /// Materializes the trie rooted at `root_hash`, failing if the root
    /// cannot be resolved.
    pub fn open(store: &'s S, root_hash: B256) -> Result<Self, StoreError> {
        let root = store.node(&root_hash)?;
        Ok(Self {
            store,
            root_hash,
            root,
        })
    }

    pub fn root_hash(&self) -> B256 {
        self.root_hash
    }

    /// Starts a single-pass in-order traversal: left subtree, node, right
    /// subtree, so key paths come out in ascending bit order.
    pub fn in_order(&self) -> InOrderIterator<'s, S> {
        InOrderIterator::new(self.store, self.root.clone())
    }
}

/// Pull-based in-order cursor over one trie.
///
/// Child nodes are resolved lazily; a node the store cannot supply is
/// yielded as an error and ends the traversal.
#[derive(Debug)]
pub struct InOrderIterator<'s, S: TrieStore> {
    store: &'s S,
    visiting: Vec<IterationElement>,
    pending: Option<StoreError>,
    done: bool,
}

impl<'s, S: TrieStore> InOrderIterator<'s, S> {
    fn new(store: &'s S, root: Node) -> Self {
        let mut iter = Self {
            store,
            visiting: Vec::new(),
            pending: None,
            done: false,
        };
        let root_key = root.prefix.clone();
        if let Err(e) = iter.push_leftmost(root_key, root) {
            iter.pending = Some(e);
        }
        iter
    }

    /// Pushes `node` and then every node on its leftmost spine, so the
    /// deepest left descendant ends up on top of the stack.
    fn push_leftmost(&mut self, key: TrieKeyPath, node: Node) -> Result<(), StoreError> {
        let mut next_left = node.left;
        let mut parent_key = key.clone();
        self.visiting.push(IterationElement { key, node });
        while let Some(hash) = next_left {
            let child = self.store.node(&hash)?;
            let child_key = parent_key.descend(0, &child.prefix);
            next_left = child.left;
            self.visiting.push(IterationElement {
                key: child_key.clone(),
                node: child,
            });
            parent_key = child_key;
        }
        Ok(())
    }
}

impl<S: TrieStore> Iterator for InOrderIterator<'_, S> {
    type Item = Result<IterationElement, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending.take() {
            self.done = true;
            return Some(Err(e));
        }
        let element = match self.visiting.pop() {
            Some(element) => element,
            None => {
                self.done = true;
                return None;
            }
        };
        if let Some(hash) = element.node.right {
            let right = match self.store.node(&hash) {
                Ok(node) => node,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let right_key = element.key.descend(1, &right.prefix);
            if let Err(e) = self.push_leftmost(right_key, right) {
                self.done = true;
                return Some(Err(e));
            }
        }
        Some(Ok(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTrieStore;

    fn bits(bytes: &[u8], bit_len: usize) -> TrieKeyPath {
        TrieKeyPath::from_encoded(bytes, bit_len)
    }

    #[test]
    fn in_order_visits_left_node_right() {
        let mut store = MemoryTrieStore::new();
        let left = store.insert(Node::leaf(bits(&[0b0000_0000], 2), vec![1]));
        let right = store.insert(Node::leaf(bits(&[0b1000_0000], 1), vec![2]));
        let root_hash = store.insert(Node::branch(
            bits(&[0b1000_0000], 1),
            Some(left),
            Some(right),
            None,
        ));

        let trie = Trie::open(&store, root_hash).unwrap();
        let elements: Vec<_> = trie.in_order().map(Result::unwrap).collect();

        assert_eq!(elements.len(), 3);
        // left child: root prefix (1) + branch bit 0 + child prefix (00)
        assert_eq!(elements[0].key, bits(&[0b1000_0000], 4));
        assert_eq!(elements[0].node.value, Some(vec![1]));
        // the root itself, keyed by its own prefix
        assert_eq!(elements[1].key, bits(&[0b1000_0000], 1));
        assert!(!elements[1].node.is_terminal());
        // right child: root prefix (1) + branch bit 1 + child prefix (1)
        assert_eq!(elements[2].key, bits(&[0b1110_0000], 3));
        assert_eq!(elements[2].node.value, Some(vec![2]));
    }

    #[test]
    fn every_reachable_node_is_visited_once() {
        let mut store = MemoryTrieStore::new();
        let ll = store.insert(Node::leaf(TrieKeyPath::empty(), vec![1]));
        let lr = store.insert(Node::leaf(TrieKeyPath::empty(), vec![2]));
        let l = store.insert(Node::branch(
            TrieKeyPath::empty(),
            Some(ll),
            Some(lr),
            Some(vec![3]),
        ));
        let r = store.insert(Node::leaf(TrieKeyPath::empty(), vec![4]));
        let root_hash =
            store.insert(Node::branch(TrieKeyPath::empty(), Some(l), Some(r), None));

        let trie = Trie::open(&store, root_hash).unwrap();
        let values: Vec<_> = trie
            .in_order()
            .map(|e| e.unwrap().node.value)
            .collect();
        assert_eq!(
            values,
            vec![Some(vec![1]), Some(vec![3]), Some(vec![2]), None, Some(vec![4])]
        );
    }

    #[test]
    fn unresolvable_root_fails_open() {
        let store = MemoryTrieStore::new();
        assert!(matches!(
            Trie::open(&store, B256::repeat_byte(0x42)),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn unresolvable_child_surfaces_from_the_iterator() {
        let mut store = MemoryTrieStore::new();
        let dangling = B256::repeat_byte(0x77);
        let root_hash = store.insert(Node::branch(
            TrieKeyPath::empty(),
            Some(dangling),
            None,
            Some(vec![1]),
        ));

        let trie = Trie::open(&store, root_hash).unwrap();
        let mut iter = trie.in_order();
        assert!(matches!(
            iter.next(),
            Some(Err(StoreError::Unavailable(h))) if h == dangling
        ));
        assert!(iter.next().is_none());
    }
}
