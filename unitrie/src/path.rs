/// A node's position in the trie: the ordered sequence of branch decisions
/// from the root, measured in bits.
///
/// Paths are value types; traversal builds a fresh path per visited node by
/// composing the parent path, the branch bit and the child's compressed
/// prefix. Bits are held expanded (one byte per bit) and packed only by
/// [`TrieKeyPath::encode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrieKeyPath {
    bits: Vec<u8>,
}

impl TrieKeyPath {
    /// The empty path (the root position).
    pub fn empty() -> Self {
        Self { bits: Vec::new() }
    }

    /// Expands whole bytes into a byte-aligned path.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_encoded(bytes, bytes.len() * 8)
    }

    /// Expands the first `bit_len` bits of a packed representation.
    ///
    /// `bytes` must hold at least `bit_len` bits.
    pub fn from_encoded(bytes: &[u8], bit_len: usize) -> Self {
        let bits = (0..bit_len)
            .map(|i| (bytes[i / 8] >> (7 - i % 8)) & 1)
            .collect();
        Self { bits }
    }

    /// Path length in bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Packs the path MSB-first; the final partial byte is zero-padded.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.bits.len().div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit != 0 {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// The sub-path covering bits `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> Self {
        Self {
            bits: self.bits[from..to].to_vec(),
        }
    }

    /// The path of a child reached over `bit`, including the child's own
    /// compressed prefix.
    pub fn descend(&self, bit: u8, child_prefix: &TrieKeyPath) -> Self {
        let mut bits = Vec::with_capacity(self.bits.len() + 1 + child_prefix.bits.len());
        bits.extend_from_slice(&self.bits);
        bits.push(bit & 1);
        bits.extend_from_slice(&child_prefix.bits);
        Self { bits }
    }
}
