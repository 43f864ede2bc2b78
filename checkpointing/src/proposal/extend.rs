//! Vote-extension producer.
//!
//! At the last block of every epoch, each validator signs the block hash its
//! pre-commit is being cast over and ships the signature as a vote
//! extension. Outside the epoch boundary the producer emits nothing.

use crypto::bls::keys::{BlsPublicKey, BlsSecretKey, BlsSignature};
use crypto::ed25519::ConsensusPublicKey;

use crate::epoching::EpochingParams;
use crate::errors::{CheckpointingError, Result};
use crate::state::address::{ConsensusAddress, ValidatorAddress};
use crate::state::checkpoint::{BlockHash, signed_msg};
use crate::state::vote_extension::VoteExtension;

/// The narrow signing capability the producer needs. Keeps the decrypted
/// BLS key behind an interface so the keystore (an encrypted EIP-2335 file
/// managed by the CLI) never leaks into this crate.
pub trait BlsSigner {
    fn sign(&self, msg: &[u8]) -> BlsSignature;
    fn bls_public_key(&self) -> BlsPublicKey;
    fn consensus_public_key(&self) -> ConsensusPublicKey;
}

/// A signer holding the validator's decrypted BLS key in memory.
pub struct LocalBlsSigner {
    bls_sk: BlsSecretKey,
    cons_pk: ConsensusPublicKey,
}

impl LocalBlsSigner {
    pub fn new(bls_sk: BlsSecretKey, cons_pk: ConsensusPublicKey) -> Self {
        Self { bls_sk, cons_pk }
    }
}

impl BlsSigner for LocalBlsSigner {
    fn sign(&self, msg: &[u8]) -> BlsSignature {
        self.bls_sk.sign(msg)
    }

    fn bls_public_key(&self) -> BlsPublicKey {
        self.bls_sk.public_key()
    }

    fn consensus_public_key(&self) -> ConsensusPublicKey {
        self.cons_pk.clone()
    }
}

/// Produces this validator's vote extension at epoch boundaries.
pub struct VoteExtensionProducer<S: BlsSigner> {
    signer: S,
    params: EpochingParams,
}

impl<S: BlsSigner> VoteExtensionProducer<S> {
    pub fn new(signer: S, params: EpochingParams) -> Self {
        Self { signer, params }
    }

    /// Called by the consensus engine while pre-committing at `height` over
    /// `block_hash`. Returns `None` outside the last block of an epoch.
    ///
    /// # Errors
    /// A malformed block hash is an error, never a partial extension: the
    /// engine hands us the hash it is signing itself, so anything but 32
    /// bytes means the process is in a bad state.
    pub fn extend_vote(&self, height: u64, block_hash: &[u8]) -> Result<Option<VoteExtension>> {
        if !self.params.is_last_block_of_epoch(height) {
            return Ok(None);
        }

        let hash = BlockHash::from_slice(block_hash).ok_or_else(|| {
            CheckpointingError::InvalidMessage(format!(
                "Block hash must be 32 bytes, got {}",
                block_hash.len()
            ))
        })?;
        let epoch = self.params.epoch_of_height(height);

        let bls_sig = self.signer.sign(&signed_msg(epoch, &hash));
        let validator_address =
            ConsensusAddress::from_consensus_pubkey(&self.signer.consensus_public_key());
        let signer = ValidatorAddress::from_consensus_address(validator_address);

        Ok(Some(VoteExtension {
            signer,
            validator_address,
            block_hash: hash,
            epoch,
            height,
            bls_sig,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::ed25519::ConsensusSecretKey;
    use rand::{SeedableRng, rngs::StdRng};

    fn producer(seed: u64, interval: u64) -> (VoteExtensionProducer<LocalBlsSigner>, BlsPublicKey) {
        let mut rng = StdRng::seed_from_u64(seed);
        let bls_sk = BlsSecretKey::generate(&mut rng);
        let bls_pk = bls_sk.public_key();
        let cons_pk = ConsensusSecretKey::generate(&mut rng).public_key();
        let signer = LocalBlsSigner::new(bls_sk, cons_pk);
        (
            VoteExtensionProducer::new(signer, EpochingParams::new(interval)),
            bls_pk,
        )
    }

    #[test]
    fn emits_nothing_off_the_epoch_boundary() {
        let (producer, _) = producer(1, 10);
        let hash = [3u8; 32];
        assert!(producer.extend_vote(9, &hash).unwrap().is_none());
        assert!(producer.extend_vote(11, &hash).unwrap().is_none());
        assert!(producer.extend_vote(0, &hash).unwrap().is_none());
    }

    #[test]
    fn extension_carries_a_verifying_signature() {
        let (producer, bls_pk) = producer(2, 10);
        let hash = [3u8; 32];

        let ext = producer
            .extend_vote(20, &hash)
            .unwrap()
            .expect("boundary height");
        assert_eq!(ext.epoch, 2);
        assert_eq!(ext.height, 20);
        assert_eq!(ext.block_hash.as_bytes(), &hash);
        assert_eq!(
            ext.signer,
            ValidatorAddress::from_consensus_address(ext.validator_address)
        );

        let msg = signed_msg(ext.epoch, &ext.block_hash);
        assert!(bls_pk.verify(&msg, &ext.bls_sig));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let (producer, _) = producer(3, 10);
        let result = producer.extend_vote(10, &[1u8; 31]);
        assert!(result.is_err());
    }
}
