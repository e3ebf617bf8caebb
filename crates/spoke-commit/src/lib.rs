//! # spoke-commit
//!
//! **Pure attestation plane for Spoke.**
//!
//! Everything both parties of a channel must compute identically lives
//! here:
//!
//! - **State hashing**: packed keccak-256 digests of channel and thread states
//! - **Signer recovery**: secp256k1 recovery under raw and prefixed signing
//! - **Thread commitments**: positional Merkle roots and inclusion proofs
//!
//! No I/O and no shared state. Mismatches are reported as values
//! (`None`, `false`); only the `verify_*`/`ensure_*` wrappers raise.

pub mod attestation;
pub mod merkle;
pub mod thread_root;

pub use attestation::{
    SigningMethod, address_of, address_of_secret, eth_signed_message_hash, hash_channel_state,
    hash_thread_state, keccak256, recover_signer, recover_with_methods, sign_digest,
    verify_signer,
};
pub use merkle::{MerkleProof, MerkleTree, ProofStep, SiblingPosition, hash_pair, proof_positions};
pub use thread_root::{
    ThreadProof, ensure_thread_proof, prove_thread, thread_leaves, thread_root,
    verify_thread_proof, verify_thread_root,
};
