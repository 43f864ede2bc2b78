//! Validator addresses.
//!
//! Both address kinds carry a 20-byte payload rendered as bech32. A
//! validator's operator address and consensus address share the same
//! payload, derived from its Ed25519 consensus public key; only the human
//! readable part differs. Re-tagging between the two is therefore a pure
//! re-encoding.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

use crypto::ed25519::ConsensusPublicKey;

/// Payload length of both address kinds.
pub const ADDRESS_BYTES: usize = 20;

/// Human readable part of operator addresses.
pub const OPERATOR_HRP: &str = "keelvaloper";

/// Human readable part of consensus addresses.
pub const CONSENSUS_HRP: &str = "keelvalcons";

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid bech32 string: {0}")]
    Bech32(String),

    #[error("Wrong address prefix: expected {expected}, got {got}")]
    WrongHrp { expected: &'static str, got: String },

    #[error("Address payload must be {ADDRESS_BYTES} bytes, got {0}")]
    WrongLength(usize),
}

/// A validator operator address (`keelvaloper...`).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Deserialize, Serialize,
)]
pub struct ValidatorAddress([u8; ADDRESS_BYTES]);

/// A validator consensus address (`keelvalcons...`), derived from the
/// Ed25519 consensus public key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Deserialize, Serialize,
)]
pub struct ConsensusAddress([u8; ADDRESS_BYTES]);

impl ValidatorAddress {
    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// Re-tags a consensus address as the operator address of the same
    /// validator.
    pub fn from_consensus_address(addr: ConsensusAddress) -> Self {
        Self(addr.0)
    }
}

impl ConsensusAddress {
    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// Derives the consensus address from an Ed25519 consensus public key:
    /// the first 20 bytes of its BLAKE3 hash.
    pub fn from_consensus_pubkey(pk: &ConsensusPublicKey) -> Self {
        let hash = blake3::hash(&pk.to_bytes());
        let mut bytes = [0u8; ADDRESS_BYTES];
        bytes.copy_from_slice(&hash.as_bytes()[..ADDRESS_BYTES]);
        Self(bytes)
    }
}

fn encode_bech32(hrp: &'static str, payload: &[u8; ADDRESS_BYTES]) -> String {
    let hrp = Hrp::parse(hrp).expect("Address HRP constants are valid");
    bech32::encode::<Bech32>(hrp, payload).expect("20-byte payload always encodes")
}

fn decode_bech32(
    expected_hrp: &'static str,
    s: &str,
) -> Result<[u8; ADDRESS_BYTES], AddressError> {
    let (hrp, payload) = bech32::decode(s).map_err(|e| AddressError::Bech32(e.to_string()))?;
    if hrp.as_str() != expected_hrp {
        return Err(AddressError::WrongHrp {
            expected: expected_hrp,
            got: hrp.as_str().to_string(),
        });
    }
    let len = payload.len();
    payload
        .try_into()
        .map_err(|_| AddressError::WrongLength(len))
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_bech32(OPERATOR_HRP, &self.0))
    }
}

impl FromStr for ValidatorAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_bech32(OPERATOR_HRP, s).map(Self)
    }
}

impl fmt::Display for ConsensusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_bech32(CONSENSUS_HRP, &self.0))
    }
}

impl FromStr for ConsensusAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_bech32(CONSENSUS_HRP, s).map(Self)
    }
}
