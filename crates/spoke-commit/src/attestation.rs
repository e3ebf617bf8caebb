//! Canonical state hashing and signer recovery.
//!
//! State hashes use the Solidity `abi.encodePacked` layout hashed with
//! keccak-256, so the channel manager contract recomputes the exact same
//! digests during a dispute:
//! - addresses: 20 raw bytes
//! - integers: 32-byte big-endian words (fixed-size arrays pack element-wise)
//! - digests: 32 raw bytes
//!
//! Signatures are 65-byte recoverable secp256k1 signatures. Recovery never
//! fails on a *mismatch*: it returns whoever signed, and the caller compares.

use secp256k1::{
    Message, PublicKey, SECP256K1, SecretKey,
    ecdsa::{RecoverableSignature, RecoveryId},
};
use sha3::{Digest as _, Keccak256};
use spoke_types::{
    Address, Amount, ChannelState, Digest, Result, Signature, SpokeError, ThreadState,
};

/// Prefix used by `eth_sign` / `personal_sign` for a 32-byte payload.
const ETH_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// `keccak256(data)`.
#[must_use]
pub fn keccak256(data: &[u8]) -> Digest {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Incremental `abi.encodePacked` writer feeding a keccak-256 hasher.
struct PackedHasher {
    hasher: Keccak256,
}

impl PackedHasher {
    fn new() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }

    fn address(&mut self, addr: &Address) -> &mut Self {
        self.hasher.update(addr.as_bytes());
        self
    }

    fn uint(&mut self, value: Amount) -> &mut Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.hasher.update(word);
        self
    }

    fn uint64(&mut self, value: u64) -> &mut Self {
        self.uint(Amount::from(value))
    }

    fn bytes32(&mut self, digest: &Digest) -> &mut Self {
        self.hasher.update(digest.as_bytes());
        self
    }

    fn finish(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

/// Hash every field of a channel state except the two signatures.
///
/// Field order (fixed):
/// `contract, [user, recipient], [weiHub, weiUser], [tokenHub, tokenUser],
///  [pendingDepositWeiHub, pendingWithdrawalWeiHub, pendingDepositWeiUser, pendingWithdrawalWeiUser],
///  [pendingDepositTokenHub, pendingWithdrawalTokenHub, pendingDepositTokenUser, pendingWithdrawalTokenUser],
///  [txCountGlobal, txCountChain], threadRoot, threadCount, timeout`
#[must_use]
pub fn hash_channel_state(state: &ChannelState) -> Digest {
    let mut h = PackedHasher::new();
    h.address(&state.contract_address)
        .address(&state.user)
        .address(&state.recipient)
        .uint(state.balance_wei_hub)
        .uint(state.balance_wei_user)
        .uint(state.balance_token_hub)
        .uint(state.balance_token_user)
        .uint(state.pending_deposit_wei_hub)
        .uint(state.pending_withdrawal_wei_hub)
        .uint(state.pending_deposit_wei_user)
        .uint(state.pending_withdrawal_wei_user)
        .uint(state.pending_deposit_token_hub)
        .uint(state.pending_withdrawal_token_hub)
        .uint(state.pending_deposit_token_user)
        .uint(state.pending_withdrawal_token_user)
        .uint64(state.tx_count_global)
        .uint64(state.tx_count_chain)
        .bytes32(&state.thread_root)
        .uint64(state.thread_count)
        .uint64(state.timeout);
    h.finish()
}

/// Hash every field of a thread state except the signature.
///
/// Field order (fixed):
/// `contract, sender, receiver, threadId, [weiSender, weiReceiver],
///  [tokenSender, tokenReceiver], txCount`
#[must_use]
pub fn hash_thread_state(state: &ThreadState) -> Digest {
    let mut h = PackedHasher::new();
    h.address(&state.contract_address)
        .address(&state.sender)
        .address(&state.receiver)
        .uint64(state.thread_id)
        .uint(state.balance_wei_sender)
        .uint(state.balance_wei_receiver)
        .uint(state.balance_token_sender)
        .uint(state.balance_token_receiver)
        .uint64(state.tx_count);
    h.finish()
}

// ---------------------------------------------------------------------------
// Signing conventions
// ---------------------------------------------------------------------------

/// How a wallet turned a state digest into the 32 bytes it actually signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningMethod {
    /// The digest itself was signed.
    Raw,
    /// `personal_sign` style: the digest behind the Ethereum message prefix.
    EthSignedMessage,
}

impl SigningMethod {
    /// Every convention callers should try, most common first.
    pub const ALL: [Self; 2] = [Self::EthSignedMessage, Self::Raw];

    /// The 32 bytes a signer using this convention signs for `digest`.
    #[must_use]
    pub fn signed_digest(self, digest: &Digest) -> Digest {
        match self {
            Self::Raw => *digest,
            Self::EthSignedMessage => eth_signed_message_hash(digest),
        }
    }
}

impl std::fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "RAW"),
            Self::EthSignedMessage => write!(f, "ETH_SIGNED_MESSAGE"),
        }
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || digest)`.
#[must_use]
pub fn eth_signed_message_hash(digest: &Digest) -> Digest {
    let mut hasher = Keccak256::new();
    hasher.update(ETH_SIGNED_MESSAGE_PREFIX);
    hasher.update(digest.as_bytes());
    Digest(hasher.finalize().into())
}

/// Ethereum address of a secp256k1 public key: the last 20 bytes of the
/// keccak-256 of the uncompressed key without its `0x04` tag.
#[must_use]
pub fn address_of(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash.0[12..]);
    Address(addr)
}

/// Address controlled by `secret_key`.
#[must_use]
pub fn address_of_secret(secret_key: &SecretKey) -> Address {
    address_of(&PublicKey::from_secret_key_global(secret_key))
}

/// Sign `digest` with `secret_key` under `method`, producing `r || s || v`
/// with `v ∈ {27, 28}`.
#[must_use]
pub fn sign_digest(digest: &Digest, secret_key: &SecretKey, method: SigningMethod) -> Signature {
    let msg = Message::from_digest(method.signed_digest(digest).0);
    let (recovery_id, compact) = SECP256K1
        .sign_ecdsa_recoverable(&msg, secret_key)
        .serialize_compact();
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&compact);
    // Recovery ids are 0..=3; only 0 and 1 occur for valid keys.
    raw[64] = 27 + u8::try_from(recovery_id.to_i32()).unwrap_or(0);
    Signature(raw)
}

/// Recover the address that produced `signature` over exactly `digest`.
///
/// Returns `None` only when the signature is structurally invalid (bad `v`,
/// out-of-range scalars, no recoverable point). A well-formed signature by
/// someone else recovers *their* address; comparing is up to the caller.
#[must_use]
pub fn recover_signer(digest: &Digest, signature: &Signature) -> Option<Address> {
    let v = match signature.v() {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_i32(i32::from(v)).ok()?;
    let sig = RecoverableSignature::from_compact(&signature.0[..64], recovery_id).ok()?;
    let msg = Message::from_digest(digest.0);
    SECP256K1
        .recover_ecdsa(&msg, &sig)
        .ok()
        .map(|pk| address_of(&pk))
}

/// Recover under every supported convention (diagnostics).
#[must_use]
pub fn recover_with_methods(
    digest: &Digest,
    signature: &Signature,
) -> [(SigningMethod, Option<Address>); 2] {
    SigningMethod::ALL.map(|method| {
        (
            method,
            recover_signer(&method.signed_digest(digest), signature),
        )
    })
}

/// Enforce that `expected` signed `digest` under some supported convention.
///
/// Returns the convention that matched.
///
/// # Errors
/// - [`SpokeError::MissingSignature`] if `signature` is `None`
/// - [`SpokeError::SignerMismatch`] if no convention recovers `expected`
pub fn verify_signer(
    digest: &Digest,
    signature: Option<&Signature>,
    expected: Address,
    party: &str,
) -> Result<SigningMethod> {
    let signature = signature.ok_or_else(|| SpokeError::MissingSignature {
        party: party.to_string(),
    })?;
    let attempts = recover_with_methods(digest, signature);
    if let Some((method, _)) = attempts.iter().find(|(_, who)| *who == Some(expected)) {
        return Ok(*method);
    }
    Err(SpokeError::SignerMismatch {
        expected,
        recovered: attempts.iter().find_map(|(_, who)| *who),
    })
}
