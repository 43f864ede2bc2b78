use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use blst::min_sig::PublicKey;
use rand::{CryptoRng, RngCore};
use rkyv::{Archive, Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::bls::constants::{
    BLS_PUBLIC_KEY_BYTES,
    BLS_SECRET_KEY_BYTES,
    BLS_SIGNATURE_BYTES,
    DST_POP,
    DST_SIG,
};
use crate::bls::ops::{
    aggregate_public_key_bytes,
    aggregate_signature_bytes,
    generate_secret_key_bytes,
    public_key_from_secret_key_bytes,
    sign_with_secret_key_bytes,
    validate_public_key_bytes,
    verify_signature_bytes,
};

/// A compressed BLS12-381 G2 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Archive, Deserialize, Serialize)]
pub struct BlsPublicKey(pub [u8; BLS_PUBLIC_KEY_BYTES]);

/// A compressed BLS12-381 G1 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Archive, Deserialize, Serialize)]
pub struct BlsSignature(pub [u8; BLS_SIGNATURE_BYTES]);

/// A BLS secret key scalar. Zeroized on drop; never serialized.
#[derive(Clone, ZeroizeOnDrop)]
pub struct BlsSecretKey([u8; BLS_SECRET_KEY_BYTES]);

impl BlsSecretKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(generate_secret_key_bytes(rng))
    }

    pub fn from_bytes(bytes: [u8; BLS_SECRET_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; BLS_SECRET_KEY_BYTES] {
        self.0
    }

    pub fn public_key(&self) -> BlsPublicKey {
        let pk_bytes =
            public_key_from_secret_key_bytes(&self.0).expect("Invalid BLS secret key bytes");
        BlsPublicKey(pk_bytes)
    }

    /// Signs a message for checkpoint purposes (under [`DST_SIG`]).
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        let sig_bytes = sign_with_secret_key_bytes(&self.0, message, DST_SIG)
            .expect("Invalid BLS secret key bytes");
        BlsSignature(sig_bytes)
    }

    /// Produces the BLS half of a proof of possession (under [`DST_POP`]).
    pub fn pop_prove(&self, message: &[u8]) -> BlsSignature {
        let sig_bytes = sign_with_secret_key_bytes(&self.0, message, DST_POP)
            .expect("Invalid BLS secret key bytes");
        BlsSignature(sig_bytes)
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlsSecretKey(..)")
    }
}

impl BlsPublicKey {
    /// Runs the full `KeyValidate` routine: on-curve, subgroup, and
    /// non-infinity checks.
    pub fn key_validate(&self) -> Result<()> {
        validate_public_key_bytes(&self.0)
    }

    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        verify_signature_bytes(&self.0, message, &signature.0, DST_SIG).is_ok()
    }

    pub fn pop_verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        verify_signature_bytes(&self.0, message, &signature.0, DST_POP).is_ok()
    }

    /// Aggregates public keys into a single key. Fails on an empty set or
    /// any key outside G2.
    pub fn aggregate(public_keys: &[BlsPublicKey]) -> Result<BlsPublicKey> {
        let bytes: Vec<[u8; BLS_PUBLIC_KEY_BYTES]> = public_keys.iter().map(|pk| pk.0).collect();
        Ok(BlsPublicKey(aggregate_public_key_bytes(&bytes)?))
    }

    /// Verifies a multi-signature: aggregates `public_keys` and verifies
    /// `multi_sig` over `message` against the aggregate.
    pub fn verify_multi(
        multi_sig: &BlsSignature,
        public_keys: &[BlsPublicKey],
        message: &[u8],
    ) -> bool {
        match Self::aggregate(public_keys) {
            Ok(aggr) => aggr.verify(message, multi_sig),
            Err(_) => false,
        }
    }

    pub fn serialize_compressed<W: std::io::Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }

    pub fn deserialize_compressed<R: std::io::Read>(mut reader: R) -> std::io::Result<Self> {
        let mut bytes = [0u8; BLS_PUBLIC_KEY_BYTES];
        reader.read_exact(&mut bytes)?;
        PublicKey::from_bytes(&bytes).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Invalid compressed BLS public key",
            )
        })?;
        Ok(Self(bytes))
    }
}

impl FromStr for BlsPublicKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let pk = PublicKey::from_bytes(&bytes)
            .map_err(|e| anyhow!("Invalid BLS public key bytes: {:?}", e))?;
        Ok(Self(pk.to_bytes()))
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl BlsSignature {
    /// Aggregates signatures into a single multi-signature. Fails on an
    /// empty set or any signature outside G1.
    pub fn aggregate(signatures: &[BlsSignature]) -> Result<BlsSignature> {
        let bytes: Vec<[u8; BLS_SIGNATURE_BYTES]> = signatures.iter().map(|sig| sig.0).collect();
        Ok(BlsSignature(aggregate_signature_bytes(&bytes)?))
    }

    pub fn to_bytes(&self) -> [u8; BLS_SIGNATURE_BYTES] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; BLS_SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn serialize_compressed<W: std::io::Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl Default for BlsSignature {
    fn default() -> Self {
        Self([0u8; BLS_SIGNATURE_BYTES])
    }
}
