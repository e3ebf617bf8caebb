//! Positional keccak-256 Merkle tree with inclusion proofs.
//!
//! Leaves are combined pairwise, left to right, as `keccak256(left || right)`.
//! When a level has an odd number of nodes, the last node is promoted to the
//! next level unchanged. Consequences:
//! - a single-leaf tree's root is the leaf itself
//! - proofs carry no step for a level where their node was promoted
//! - the empty tree's root is [`Digest::ZERO`]
//!
//! Leaf order is part of the commitment: reordering leaves changes the root.

use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};
use spoke_types::Digest;

/// `keccak256(left || right)`.
#[must_use]
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Keccak256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest(hasher.finalize().into())
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingPosition {
    Left,
    Right,
}

/// One level of a Merkle proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub position: SiblingPosition,
}

/// Inclusion proof for one leaf.
///
/// `leaf_count` and `leaf_index` fix the shape of the path: which levels
/// contribute a sibling and on which side. A proof is valid only if its
/// steps follow that shape exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf: Digest,
    pub leaf_index: usize,
    /// Number of leaves in the tree the proof was built from.
    pub leaf_count: usize,
    /// Sibling path from the leaf level upward.
    pub steps: Vec<ProofStep>,
}

/// Sibling positions along the path of leaf `index` in a tree of
/// `leaf_count` leaves, bottom-up. Levels where the node is promoted
/// contribute nothing. `None` if `index` is out of range.
#[must_use]
pub fn proof_positions(leaf_count: usize, index: usize) -> Option<Vec<SiblingPosition>> {
    if index >= leaf_count {
        return None;
    }
    let mut positions = Vec::new();
    let (mut width, mut idx) = (leaf_count, index);
    while width > 1 {
        if (idx ^ 1) < width {
            positions.push(if idx % 2 == 0 {
                SiblingPosition::Right
            } else {
                SiblingPosition::Left
            });
        }
        idx /= 2;
        width = width.div_ceil(2);
    }
    Some(positions)
}

const WORD: usize = 32;

fn word(value: usize) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    out
}

fn read_word(bytes: &[u8]) -> Option<usize> {
    let (high, low) = bytes.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    let low: [u8; 8] = low.try_into().ok()?;
    usize::try_from(u64::from_be_bytes(low)).ok()
}

impl MerkleProof {
    /// Replay the proof from its leaf to a root.
    #[must_use]
    pub fn compute_root(&self) -> Digest {
        self.steps.iter().fold(self.leaf, |acc, step| match step.position {
            SiblingPosition::Left => hash_pair(&step.sibling, &acc),
            SiblingPosition::Right => hash_pair(&acc, &step.sibling),
        })
    }

    /// Whether the steps follow the path shape of `leaf_index` among
    /// `leaf_count` leaves.
    #[must_use]
    pub fn has_canonical_shape(&self) -> bool {
        proof_positions(self.leaf_count, self.leaf_index).is_some_and(|positions| {
            positions.len() == self.steps.len()
                && positions
                    .iter()
                    .zip(&self.steps)
                    .all(|(expected, step)| *expected == step.position)
        })
    }

    /// Whether the proof has the canonical shape and replays to `root`.
    #[must_use]
    pub fn verify(&self, root: &Digest) -> bool {
        self.has_canonical_shape() && self.compute_root() == *root
    }

    /// Packed form for on-chain dispute calls, as 32-byte words:
    ///
    /// ```text
    /// leaf_count || leaf_index || leaf || sibling_0 || sibling_1 || ...
    /// ```
    ///
    /// Sibling positions are not encoded. A verifier derives them from
    /// `leaf_count` and `leaf_index`: at each level the node at `i` pairs
    /// with `i ^ 1` if that index exists in a level of width `w`
    /// (sibling on the left when `i` is odd), otherwise it is promoted and
    /// no sibling is consumed; then `i /= 2`, `w = ceil(w / 2)`.
    #[must_use]
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(WORD * (self.steps.len() + 3));
        out.extend_from_slice(&word(self.leaf_count));
        out.extend_from_slice(&word(self.leaf_index));
        out.extend_from_slice(self.leaf.as_bytes());
        for step in &self.steps {
            out.extend_from_slice(step.sibling.as_bytes());
        }
        out
    }

    /// Decode [`Self::to_packed_bytes`], deriving positions from the header.
    ///
    /// `None` if the bytes are malformed or the sibling count does not
    /// match the path shape.
    #[must_use]
    pub fn from_packed_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 * WORD || bytes.len() % WORD != 0 {
            return None;
        }
        let mut words = bytes.chunks_exact(WORD);
        let leaf_count = read_word(words.next()?)?;
        let leaf_index = read_word(words.next()?)?;
        let leaf = Digest(words.next()?.try_into().ok()?);
        let positions = proof_positions(leaf_count, leaf_index)?;
        if words.len() != positions.len() {
            return None;
        }
        let steps = words
            .zip(positions)
            .map(|(sibling, position)| {
                Some(ProofStep {
                    sibling: Digest(sibling.try_into().ok()?),
                    position,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            leaf,
            leaf_index,
            leaf_count,
            steps,
        })
    }
}

/// A fully materialized Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `layers[0]` are the leaves; the last layer holds the single root.
    layers: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over `leaves` in the given order.
    #[must_use]
    pub fn new(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self { layers: Vec::new() };
        }
        let mut top = leaves;
        let mut layers = Vec::new();
        while top.len() > 1 {
            let next = next_layer(&top);
            layers.push(top);
            top = next;
        }
        layers.push(top);
        Self { layers }
    }

    /// The root digest; [`Digest::ZERO`] for an empty tree.
    #[must_use]
    pub fn root(&self) -> Digest {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Digest::ZERO)
    }

    #[must_use]
    pub fn leaves(&self) -> &[Digest] {
        self.layers.first().map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Index of the first leaf equal to `leaf`.
    #[must_use]
    pub fn position(&self, leaf: &Digest) -> Option<usize> {
        self.leaves().iter().position(|l| l == leaf)
    }

    /// Inclusion proof for the leaf at `index`, or `None` if out of range.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.leaves().get(index)?;
        let mut steps = Vec::new();
        let mut idx = index;
        // The top layer is the root itself and contributes no sibling.
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_idx = idx ^ 1;
            if let Some(sibling) = layer.get(sibling_idx) {
                let position = if idx % 2 == 0 {
                    SiblingPosition::Right
                } else {
                    SiblingPosition::Left
                };
                steps.push(ProofStep {
                    sibling: *sibling,
                    position,
                });
            }
            idx /= 2;
        }
        Some(MerkleProof {
            leaf,
            leaf_index: index,
            leaf_count: self.leaf_count(),
            steps,
        })
    }

    /// Whether `proof` proves the leaf actually stored at its index.
    #[must_use]
    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        proof.leaf_count == self.leaf_count()
            && self.leaves().get(proof.leaf_index) == Some(&proof.leaf)
            && proof.verify(&self.root())
    }
}

fn next_layer(layer: &[Digest]) -> Vec<Digest> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [only] => *only,
            _ => unreachable!("chunks(2) yields one or two elements"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Digest {
        Digest([n; 32])
    }

    #[test]
    fn empty_tree_root_is_zero() {
        let tree = MerkleTree::new(vec![]);
        assert!(tree.is_empty());
        assert_eq!(tree.root(), Digest::ZERO);
        assert!(tree.proof(0).is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf() {
        let tree = MerkleTree::new(vec![leaf(1)]);
        assert_eq!(tree.root(), leaf(1));
        let proof = tree.proof(0).unwrap();
        assert!(proof.steps.is_empty());
        assert!(proof.verify(&leaf(1)));
    }

    #[test]
    fn two_leaves_hash_in_order() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2)]);
        assert_eq!(tree.root(), hash_pair(&leaf(1), &leaf(2)));
        assert_ne!(tree.root(), hash_pair(&leaf(2), &leaf(1)));
    }

    #[test]
    fn odd_leaf_is_promoted() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3)]);
        let expected = hash_pair(&hash_pair(&leaf(1), &leaf(2)), &leaf(3));
        assert_eq!(tree.root(), expected);

        // Leaf 3 skips the bottom level, then pairs with h(1,2) on the left.
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.steps.len(), 1);
        assert_eq!(proof.steps[0].position, SiblingPosition::Left);
        assert!(proof.verify(&expected));
    }

    #[test]
    fn every_proof_verifies_for_many_sizes() {
        for n in 1u8..=17 {
            let tree = MerkleTree::new((0..n).map(leaf).collect());
            for i in 0..usize::from(n) {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&tree.root()), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn proof_against_other_root_fails() {
        let a = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let b = MerkleTree::new(vec![leaf(1), leaf(2), leaf(4), leaf(3)]);
        let proof = a.proof(0).unwrap();
        assert!(!proof.verify(&b.root()));
    }

    #[test]
    fn position_finds_first_match() {
        let tree = MerkleTree::new(vec![leaf(5), leaf(6), leaf(5)]);
        assert_eq!(tree.position(&leaf(5)), Some(0));
        assert_eq!(tree.position(&leaf(9)), None);
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn packed_bytes_layout() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let packed = tree.proof(1).unwrap().to_packed_bytes();
        assert_eq!(packed.len(), 32 * 5);
        assert_eq!(packed[31], 4, "leaf count word");
        assert_eq!(packed[63], 1, "leaf index word");
        assert_eq!(&packed[64..96], leaf(2).as_bytes());
        assert_eq!(&packed[96..128], leaf(1).as_bytes());
    }

    #[test]
    fn packed_proof_replays_for_every_leaf() {
        for n in 1u8..=11 {
            let tree = MerkleTree::new((0..n).map(leaf).collect());
            for i in 0..usize::from(n) {
                let proof = tree.proof(i).unwrap();
                let decoded = MerkleProof::from_packed_bytes(&proof.to_packed_bytes()).unwrap();
                assert_eq!(decoded, proof, "n={n} i={i}");
                assert_eq!(decoded.compute_root(), tree.root());
            }
        }
    }

    #[test]
    fn packed_promoted_leaf_uses_leaf_count() {
        // Index 2 of 3 skips the bottom level; index bits alone would
        // place h(1,2) on the wrong side or consume a missing sibling.
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3)]);
        let packed = tree.proof(2).unwrap().to_packed_bytes();
        let decoded = MerkleProof::from_packed_bytes(&packed).unwrap();
        assert_eq!(decoded.steps.len(), 1);
        assert_eq!(decoded.steps[0].position, SiblingPosition::Left);
        assert!(tree.verify_proof(&decoded));
    }

    #[test]
    fn malformed_packed_bytes_are_rejected() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let packed = tree.proof(0).unwrap().to_packed_bytes();
        assert!(MerkleProof::from_packed_bytes(&packed[..packed.len() - 32]).is_none());
        assert!(MerkleProof::from_packed_bytes(&packed[..packed.len() - 1]).is_none());
        let mut out_of_range = packed.clone();
        out_of_range[63] = 9;
        assert!(MerkleProof::from_packed_bytes(&out_of_range).is_none());
    }

    #[test]
    fn positions_match_built_proofs() {
        for n in 1u8..=17 {
            let tree = MerkleTree::new((0..n).map(leaf).collect());
            for i in 0..usize::from(n) {
                let built: Vec<_> = tree.proof(i).unwrap().steps.iter().map(|s| s.position).collect();
                assert_eq!(proof_positions(usize::from(n), i).unwrap(), built, "n={n} i={i}");
            }
        }
        assert!(proof_positions(3, 3).is_none());
    }

    #[test]
    fn root_posing_as_leaf_is_rejected() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let forged = MerkleProof {
            leaf: tree.root(),
            leaf_index: 0,
            leaf_count: 4,
            steps: vec![],
        };
        assert_eq!(forged.compute_root(), tree.root());
        assert!(!forged.verify(&tree.root()));
        assert!(!tree.verify_proof(&forged));
    }

    #[test]
    fn internal_node_with_short_path_is_rejected() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let forged = MerkleProof {
            leaf: hash_pair(&leaf(1), &leaf(2)),
            leaf_index: 0,
            leaf_count: 4,
            steps: vec![ProofStep {
                sibling: hash_pair(&leaf(3), &leaf(4)),
                position: SiblingPosition::Right,
            }],
        };
        assert_eq!(forged.compute_root(), tree.root());
        assert!(!forged.verify(&tree.root()));
        assert!(!tree.verify_proof(&forged));
    }

    #[test]
    fn proof_serializes_for_dispute_tooling() {
        let tree = MerkleTree::new(vec![leaf(1), leaf(2), leaf(3)]);
        let proof = tree.proof(0).unwrap();
        let json = serde_json::to_string(&proof).unwrap();
        assert!(json.contains("\"leafIndex\":0"), "Got: {json}");
        assert!(json.contains("\"position\":\"right\""), "Got: {json}");
        let back: MerkleProof = serde_json::from_str(&json).unwrap();
        assert_eq!(back, proof);
    }
}
