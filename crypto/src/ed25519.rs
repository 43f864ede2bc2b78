//! Ed25519 validator consensus keys.
//!
//! Consensus keys identify validators at the consensus layer, separate from
//! the BLS keys used for checkpoint signing. A proof of possession
//! ([`crate::pop`]) ties the two together at registration time.

use std::str::FromStr;

use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, Signature, Signer, SigningKey,
    Verifier, VerifyingKey,
};
use rand::{CryptoRng, RngCore};
use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

type Result<T> = std::result::Result<T, ConsensusKeyError>;

/// A 32-byte Ed25519 public key identifying a validator at consensus level.
#[derive(Clone, Debug)]
pub struct ConsensusPublicKey(pub VerifyingKey);

/// A 32-byte Ed25519 secret key for a validator's consensus identity.
#[derive(Clone, ZeroizeOnDrop)]
pub struct ConsensusSecretKey(pub SigningKey);

/// A 64-byte Ed25519 signature.
#[derive(Clone, Debug)]
pub struct ConsensusSignature(pub Signature);

impl ConsensusSecretKey {
    /// Generate a new random secret key using the provided RNG
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let signing_key = SigningKey::generate(rng);
        Self(signing_key)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self(signing_key)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> ConsensusPublicKey {
        ConsensusPublicKey(self.0.verifying_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> ConsensusSignature {
        ConsensusSignature(self.0.sign(message))
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }
}

impl FromStr for ConsensusPublicKey {
    type Err = ConsensusKeyError;
    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let bytes = bytes
            .try_into()
            .map_err(|_| ConsensusKeyError::InvalidPublicKey)?;
        Ok(Self(VerifyingKey::from_bytes(&bytes)?))
    }
}

impl ConsensusPublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self(verifying_key))
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &ConsensusSignature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }
}

impl PartialEq for ConsensusPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Eq for ConsensusPublicKey {}

impl ConsensusSignature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self(Signature::from_bytes(bytes))
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

#[derive(Debug, Error)]
pub enum ConsensusKeyError {
    FailedToDecodeHex(#[from] hex::FromHexError),
    InvalidPublicKey,
    InvalidSignature(#[from] ed25519_dalek::SignatureError),
}

impl std::fmt::Display for ConsensusKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailedToDecodeHex(e) => write!(f, "Failed to decode hex: {}", e),
            Self::InvalidPublicKey => write!(f, "Invalid public key"),
            Self::InvalidSignature(e) => write!(f, "Invalid signature: {}", e),
        }
    }
}

/// Wrapper for rkyv serialization of ConsensusPublicKey
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SerializableConsensusPublicKey {
    pub bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl From<&ConsensusPublicKey> for SerializableConsensusPublicKey {
    fn from(pk: &ConsensusPublicKey) -> Self {
        Self {
            bytes: pk.to_bytes(),
        }
    }
}

impl TryFrom<&SerializableConsensusPublicKey> for ConsensusPublicKey {
    type Error = ConsensusKeyError;
    fn try_from(spk: &SerializableConsensusPublicKey) -> Result<Self> {
        ConsensusPublicKey::from_bytes(&spk.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn sign_and_verify() {
        let mut rng = StdRng::seed_from_u64(7);
        let sk = ConsensusSecretKey::generate(&mut rng);
        let pk = sk.public_key();

        let message = b"hello world";
        let signature = sk.sign(message);

        assert!(pk.verify(message, &signature));
        assert!(!pk.verify(b"wrong message", &signature));
    }

    #[test]
    fn roundtrip_bytes() {
        let mut rng = StdRng::seed_from_u64(8);
        let sk = ConsensusSecretKey::generate(&mut rng);
        let pk = sk.public_key();
        let sig = sk.sign(b"test");

        let pk_bytes = pk.to_bytes();
        let pk2 = ConsensusPublicKey::from_bytes(&pk_bytes).unwrap();
        assert_eq!(pk, pk2);

        let sig_bytes = sig.to_bytes();
        let sig2 = ConsensusSignature::from_bytes(&sig_bytes);
        assert!(pk.verify(b"test", &sig2));
    }

    #[test]
    fn from_str_rejects_short_hex() {
        let result = ConsensusPublicKey::from_str("deadbeef");
        assert!(result.is_err());
    }
}
