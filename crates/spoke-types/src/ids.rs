//! Identifiers and fixed-width byte values used throughout Spoke.
//!
//! [`Address`], [`Digest`] and [`Signature`] travel as `0x`-prefixed
//! lowercase hex strings in JSON, matching how the hub and the on-chain
//! contracts exchange them. Request identifiers use UUIDv7.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{Result, SpokeError};

/// Decode a hex string with an optional `0x` prefix into exactly `N` bytes.
fn decode_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw)
        .map_err(|e| SpokeError::Serialization(format!("invalid {what} hex: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        SpokeError::Serialization(format!("{what} must be {N} bytes, got {}", b.len()))
    })
}

/// Implements hex `Display`/`FromStr` and string-based serde for a
/// fixed-width byte newtype.
macro_rules! hex_newtype {
    ($name:ident, $len:expr, $what:literal) => {
        impl $name {
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            #[must_use]
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = SpokeError;

            fn from_str(s: &str) -> Result<Self> {
                decode_fixed::<{ $len }>(s, $what).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address (hub, user, contract, recipient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Address(pub [u8; 20]);

hex_newtype!(Address, 20, "address");

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Abbreviated form for log lines, e.g. `0xaaa0…0000`.
    #[must_use]
    pub fn short(&self) -> String {
        format!(
            "0x{}…{}",
            hex::encode(&self.0[..2]),
            hex::encode(&self.0[18..])
        )
    }
}

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// A 32-byte keccak-256 digest (state hashes, Merkle nodes, thread roots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Digest(pub [u8; 32]);

hex_newtype!(Digest, 32, "digest");

impl Digest {
    /// The all-zero digest. Also the root of an empty thread set.
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A 65-byte recoverable ECDSA signature laid out as `r || s || v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 65]);

hex_newtype!(Signature, 65, "signature");

impl Signature {
    /// The trailing recovery byte (`v`).
    #[must_use]
    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

// ---------------------------------------------------------------------------
// WithdrawalRequestId
// ---------------------------------------------------------------------------

/// Caller-supplied identifier for a custodial withdrawal request.
/// Uses UUIDv7 so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct WithdrawalRequestId(pub Uuid);

impl WithdrawalRequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WithdrawalRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WithdrawalRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OnchainTxId
// ---------------------------------------------------------------------------

/// Opaque identifier the on-chain submitter assigns to a queued transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OnchainTxId(pub u64);

impl fmt::Display for OnchainTxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// Deterministic address with every byte set to `byte`.
    #[must_use]
    pub fn repeat(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Random address for fixtures.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
