//! Proof of possession binding a BLS key to a validator consensus key.
//!
//! The proof is a pair of signatures:
//!
//! 1. the Ed25519 consensus key signs the BLS public key bytes, and
//! 2. the BLS key signs, under the POP domain tag, the BLS public key bytes
//!    concatenated with the Ed25519 signature from step 1.
//!
//! Verification re-runs both checks and succeeds iff both pass. Anyone can
//! check that whoever registered a BLS key both holds its secret scalar and
//! controls the consensus identity it is being attached to.

use ed25519_dalek::SIGNATURE_LENGTH;
use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

use crate::bls::constants::BLS_SIGNATURE_BYTES;
use crate::bls::keys::{BlsPublicKey, BlsSecretKey, BlsSignature};
use crate::ed25519::{ConsensusPublicKey, ConsensusSecretKey, ConsensusSignature};

/// Serialized length of a proof of possession: Ed25519 signature followed by
/// the BLS signature.
pub const POP_BYTES: usize = SIGNATURE_LENGTH + BLS_SIGNATURE_BYTES;

#[derive(Debug, Error)]
pub enum PopError {
    #[error("Proof of possession must be {POP_BYTES} bytes, got {0}")]
    InvalidLength(usize),
}

/// A proof of possession over a `(BLS key, consensus key)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct ProofOfPossession {
    /// Ed25519 signature of the BLS public key bytes by the consensus key.
    pub ed25519_sig: [u8; SIGNATURE_LENGTH],
    /// BLS signature, under the POP tag, of the BLS public key bytes
    /// concatenated with `ed25519_sig`.
    pub bls_sig: BlsSignature,
}

impl ProofOfPossession {
    /// Builds the proof for `bls_sk` bound to `cons_sk`.
    pub fn prove(bls_sk: &BlsSecretKey, cons_sk: &ConsensusSecretKey) -> Self {
        let bls_pk = bls_sk.public_key();
        let ed25519_sig = cons_sk.sign(&bls_pk.0);
        let bls_sig = bls_sk.pop_prove(&pop_message(&bls_pk, &ed25519_sig.to_bytes()));
        Self {
            ed25519_sig: ed25519_sig.to_bytes(),
            bls_sig,
        }
    }

    /// Verifies the proof against a specific `(BLS key, consensus key)` pair.
    pub fn verify(&self, bls_pk: &BlsPublicKey, cons_pk: &ConsensusPublicKey) -> bool {
        let ed25519_sig = ConsensusSignature::from_bytes(&self.ed25519_sig);
        if !cons_pk.verify(&bls_pk.0, &ed25519_sig) {
            return false;
        }
        bls_pk.pop_verify(&pop_message(bls_pk, &self.ed25519_sig), &self.bls_sig)
    }

    pub fn to_bytes(&self) -> [u8; POP_BYTES] {
        let mut out = [0u8; POP_BYTES];
        out[..SIGNATURE_LENGTH].copy_from_slice(&self.ed25519_sig);
        out[SIGNATURE_LENGTH..].copy_from_slice(&self.bls_sig.0);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PopError> {
        if bytes.len() != POP_BYTES {
            return Err(PopError::InvalidLength(bytes.len()));
        }
        let mut ed25519_sig = [0u8; SIGNATURE_LENGTH];
        ed25519_sig.copy_from_slice(&bytes[..SIGNATURE_LENGTH]);
        let mut bls_sig = [0u8; BLS_SIGNATURE_BYTES];
        bls_sig.copy_from_slice(&bytes[SIGNATURE_LENGTH..]);
        Ok(Self {
            ed25519_sig,
            bls_sig: BlsSignature(bls_sig),
        })
    }
}

fn pop_message(bls_pk: &BlsPublicKey, ed25519_sig: &[u8; SIGNATURE_LENGTH]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(bls_pk.0.len() + ed25519_sig.len());
    msg.extend_from_slice(&bls_pk.0);
    msg.extend_from_slice(ed25519_sig);
    msg
}
