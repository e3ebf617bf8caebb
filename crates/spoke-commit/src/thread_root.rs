//! Thread commitments: the Merkle root over a channel's open threads.
//!
//! Leaves are [`hash_thread_state`] of each thread, in the order the
//! channel lists them.

use spoke_types::{Digest, Result, SpokeError, ThreadState};
use tracing::debug;

use crate::attestation::hash_thread_state;
use crate::merkle::{MerkleProof, MerkleTree};

/// Inclusion proof of one thread under a thread root.
pub type ThreadProof = MerkleProof;

/// Leaf digests for `threads`, in order.
#[must_use]
pub fn thread_leaves(threads: &[ThreadState]) -> Vec<Digest> {
    threads.iter().map(hash_thread_state).collect()
}

/// Root over `threads`; [`Digest::ZERO`] when there are none.
#[must_use]
pub fn thread_root(threads: &[ThreadState]) -> Digest {
    MerkleTree::new(thread_leaves(threads)).root()
}

/// Build an inclusion proof for `target`.
///
/// The target is located by digest, so a thread matches iff every hashed
/// field matches. With duplicates the first occurrence is proven.
pub fn prove_thread(target: &ThreadState, threads: &[ThreadState]) -> Result<ThreadProof> {
    let digest = hash_thread_state(target);
    let tree = MerkleTree::new(thread_leaves(threads));
    let index = tree
        .position(&digest)
        .ok_or(SpokeError::ThreadNotFound { digest })?;
    debug!(
        thread_id = target.thread_id,
        index,
        leaves = tree.leaf_count(),
        "Built thread proof"
    );
    tree.proof(index)
        .ok_or_else(|| SpokeError::Internal(format!("no proof for leaf {index}")))
}

/// Whether `proof` proves that the thread at its index in `threads` is
/// included under their root.
///
/// The proven leaf must be the hash of the thread actually stored at
/// `proof.leaf_index`, and the sibling path must have exactly the shape of
/// that index in a tree of `threads.len()` leaves. Internal nodes or the
/// root presented as a leaf are rejected.
#[must_use]
pub fn verify_thread_proof(proof: &ThreadProof, threads: &[ThreadState]) -> bool {
    MerkleTree::new(thread_leaves(threads)).verify_proof(proof)
}

/// Like [`verify_thread_proof`], but raises [`SpokeError::InvalidProof`].
pub fn ensure_thread_proof(proof: &ThreadProof, threads: &[ThreadState]) -> Result<()> {
    if verify_thread_proof(proof, threads) {
        Ok(())
    } else {
        Err(SpokeError::InvalidProof)
    }
}

/// Check a co-signed `claimed` root against the threads it should commit to.
pub fn verify_thread_root(threads: &[ThreadState], claimed: &Digest) -> Result<()> {
    let computed = thread_root(threads);
    if computed == *claimed {
        Ok(())
    } else {
        Err(SpokeError::RootMismatch {
            claimed: *claimed,
            computed,
        })
    }
}
