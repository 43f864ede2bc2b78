//! Vote-extension verification.
//!
//! Runs on every peer for every received extended pre-commit at the last
//! block of an epoch, and again inside the proposer and proposal validator.
//! Every failure is a reject decision, not an error: a rejected extension
//! is excluded from aggregation but never fails the pre-commit itself.

use thiserror::Error;

use crate::epoching::EpochNum;
use crate::state::address::ValidatorAddress;
use crate::state::checkpoint::{BlockHash, signed_msg};
use crate::state::valset::{ValidatorBlsRecord, ValidatorWithBlsKeySet};
use crate::state::vote_extension::{MAX_VOTE_EXTENSION_BYTES, VoteExtension, WireError};

/// Why a vote extension was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoteExtensionRejection {
    #[error("Extension bytes are empty")]
    Empty,

    #[error("Extension is {0} bytes, above the {MAX_VOTE_EXTENSION_BYTES} byte cap")]
    Oversized(usize),

    #[error("Extension does not decode: {0}")]
    Malformed(#[from] WireError),

    #[error("Re-encoding the extension does not reproduce the received bytes")]
    NotCanonical,

    #[error("Extension is for epoch {got}, current epoch is {expected}")]
    WrongEpoch { got: EpochNum, expected: EpochNum },

    #[error("Signer does not match the operator address derived from the consensus address")]
    SignerMismatch,

    #[error("Extension is over a different block hash than the local vote")]
    BlockHashMismatch,

    #[error("Signer {0} is not in the epoch validator set")]
    UnknownSigner(String),

    #[error("BLS signature verification failed for {0}")]
    InvalidSignature(String),
}

/// Verifier for one epoch boundary, bound to the epoch's frozen snapshot.
pub struct VoteExtensionVerifier<'a> {
    pub valset: &'a ValidatorWithBlsKeySet,
    pub epoch: EpochNum,
}

impl<'a> VoteExtensionVerifier<'a> {
    pub fn new(valset: &'a ValidatorWithBlsKeySet, epoch: EpochNum) -> Self {
        Self { valset, epoch }
    }

    /// Structural checks shared by the per-precommit verifier and the
    /// proposer's histogram: size cap, canonical decoding, epoch, signer
    /// consistency, and snapshot membership. Returns the decoded extension
    /// together with the signer's snapshot record.
    pub fn check_structure(
        &self,
        bytes: &[u8],
    ) -> Result<(VoteExtension, &'a ValidatorBlsRecord), VoteExtensionRejection> {
        if bytes.is_empty() {
            return Err(VoteExtensionRejection::Empty);
        }
        if bytes.len() > MAX_VOTE_EXTENSION_BYTES {
            return Err(VoteExtensionRejection::Oversized(bytes.len()));
        }
        let ext = VoteExtension::decode(bytes)?;
        // Closes the duplicate-field / unknown-field amplification vector:
        // whatever decoded must re-encode to the exact bytes received.
        if ext.encode() != bytes {
            return Err(VoteExtensionRejection::NotCanonical);
        }
        if ext.epoch != self.epoch {
            return Err(VoteExtensionRejection::WrongEpoch {
                got: ext.epoch,
                expected: self.epoch,
            });
        }
        if ext.signer != ValidatorAddress::from_consensus_address(ext.validator_address) {
            return Err(VoteExtensionRejection::SignerMismatch);
        }
        let idx = self
            .valset
            .index_of(&ext.signer)
            .ok_or_else(|| VoteExtensionRejection::UnknownSigner(ext.signer.to_string()))?;
        let record = self.valset.get(idx).expect("index came from the set");
        Ok((ext, record))
    }

    /// The full per-precommit verification of §VerifyVoteExtension: all
    /// structural checks, the block hash the verifier itself is voting on,
    /// and the BLS signature under the signer's registered key.
    pub fn verify(
        &self,
        bytes: &[u8],
        expected_hash: &BlockHash,
    ) -> Result<VoteExtension, VoteExtensionRejection> {
        let (ext, record) = self.check_structure(bytes)?;
        if ext.block_hash != *expected_hash {
            return Err(VoteExtensionRejection::BlockHashMismatch);
        }
        let msg = signed_msg(ext.epoch, &ext.block_hash);
        if !record.bls_pk.verify(&msg, &ext.bls_sig) {
            return Err(VoteExtensionRejection::InvalidSignature(
                ext.signer.to_string(),
            ));
        }
        Ok(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoching::EpochingParams;
    use crate::proposal::extend::{BlsSigner, LocalBlsSigner, VoteExtensionProducer};
    use crate::state::address::ConsensusAddress;
    use crate::state::valset::ValidatorBlsRecord;
    use crate::state::vote_extension::MAX_VOTE_EXTENSION_BYTES;
    use crypto::bls::keys::BlsSecretKey;
    use crypto::ed25519::ConsensusSecretKey;
    use rand::{SeedableRng, rngs::StdRng};

    struct Fixture {
        valset: ValidatorWithBlsKeySet,
        producers: Vec<VoteExtensionProducer<LocalBlsSigner>>,
    }

    /// Four equal-weight validators with epoch interval 10.
    fn fixture() -> Fixture {
        let mut rng = StdRng::seed_from_u64(11);
        let mut records = Vec::new();
        let mut producers = Vec::new();
        for _ in 0..4 {
            let bls_sk = BlsSecretKey::generate(&mut rng);
            let cons_pk = ConsensusSecretKey::generate(&mut rng).public_key();
            let cons_addr = ConsensusAddress::from_consensus_pubkey(&cons_pk);
            records.push(ValidatorBlsRecord {
                addr: ValidatorAddress::from_consensus_address(cons_addr),
                bls_pk: bls_sk.public_key(),
                power: 100,
            });
            producers.push(VoteExtensionProducer::new(
                LocalBlsSigner::new(bls_sk, cons_pk),
                EpochingParams::new(10),
            ));
        }
        Fixture {
            valset: ValidatorWithBlsKeySet::new(1, records).unwrap(),
            producers,
        }
    }

    fn extension_bytes(fixture: &Fixture, i: usize, hash: &[u8; 32]) -> Vec<u8> {
        fixture.producers[i]
            .extend_vote(10, hash)
            .unwrap()
            .expect("boundary")
            .encode()
    }

    #[test]
    fn valid_extension_is_accepted_and_restable() {
        let fixture = fixture();
        let hash = [5u8; 32];
        let bytes = extension_bytes(&fixture, 0, &hash);

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        let ext = verifier
            .verify(&bytes, &BlockHash(hash))
            .expect("valid extension");
        // P5: accepted implies re-encoding stability.
        assert_eq!(ext.encode(), bytes);
    }

    #[test]
    fn empty_extension_is_rejected() {
        let fixture = fixture();
        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert_eq!(
            verifier.verify(&[], &BlockHash([0u8; 32])),
            Err(VoteExtensionRejection::Empty)
        );
    }

    #[test]
    fn oversized_extension_is_rejected() {
        let fixture = fixture();
        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        let bloated = vec![1u8; MAX_VOTE_EXTENSION_BYTES + 1];
        assert!(matches!(
            verifier.verify(&bloated, &BlockHash([0u8; 32])),
            Err(VoteExtensionRejection::Oversized(_))
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let fixture = fixture();
        let hash = [5u8; 32];
        let mut bytes = extension_bytes(&fixture, 0, &hash);
        bytes.extend_from_slice(&[0u8; 16]);

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert!(matches!(
            verifier.verify(&bytes, &BlockHash(hash)),
            Err(VoteExtensionRejection::Malformed(_))
        ));
    }

    #[test]
    fn non_canonical_rendering_is_rejected() {
        // An all-uppercase signer string decodes to the same extension but
        // is not the canonical byte sequence.
        let fixture = fixture();
        let hash = [5u8; 32];
        let bytes = extension_bytes(&fixture, 0, &hash);
        let ext = VoteExtension::decode(&bytes).unwrap();

        let mut forged = Vec::new();
        let signer_upper = ext.signer.to_string().to_uppercase();
        forged.push(signer_upper.len() as u8);
        forged.extend_from_slice(signer_upper.as_bytes());
        forged.extend_from_slice(&bytes[1 + signer_upper.len()..]);

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert_eq!(
            verifier.verify(&forged, &BlockHash(hash)),
            Err(VoteExtensionRejection::NotCanonical)
        );
    }

    #[test]
    fn wrong_epoch_is_rejected() {
        let fixture = fixture();
        let hash = [5u8; 32];
        let bytes = extension_bytes(&fixture, 0, &hash);

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 2);
        assert!(matches!(
            verifier.verify(&bytes, &BlockHash(hash)),
            Err(VoteExtensionRejection::WrongEpoch { got: 1, expected: 2 })
        ));
    }

    #[test]
    fn signer_consensus_address_mismatch_is_rejected() {
        let fixture = fixture();
        let hash = [5u8; 32];
        let bytes = extension_bytes(&fixture, 0, &hash);
        let mut ext = VoteExtension::decode(&bytes).unwrap();
        // Claim another validator's operator address.
        ext.signer = fixture.valset.records()[1].addr;
        let forged = ext.encode();

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert_eq!(
            verifier.verify(&forged, &BlockHash(hash)),
            Err(VoteExtensionRejection::SignerMismatch)
        );
    }

    #[test]
    fn mismatched_block_hash_is_rejected() {
        let fixture = fixture();
        let bytes = extension_bytes(&fixture, 0, &[5u8; 32]);

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert_eq!(
            verifier.verify(&bytes, &BlockHash([6u8; 32])),
            Err(VoteExtensionRejection::BlockHashMismatch)
        );
    }

    #[test]
    fn signer_outside_the_snapshot_is_rejected() {
        let fixture = fixture();
        let hash = [5u8; 32];

        // A validator with keys but no snapshot membership.
        let mut rng = StdRng::seed_from_u64(77);
        let outsider_bls = BlsSecretKey::generate(&mut rng);
        let outsider_cons = ConsensusSecretKey::generate(&mut rng).public_key();
        let producer = VoteExtensionProducer::new(
            LocalBlsSigner::new(outsider_bls, outsider_cons),
            EpochingParams::new(10),
        );
        let bytes = producer.extend_vote(10, &hash).unwrap().unwrap().encode();

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert!(matches!(
            verifier.verify(&bytes, &BlockHash(hash)),
            Err(VoteExtensionRejection::UnknownSigner(_))
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let fixture = fixture();
        let hash = [5u8; 32];
        let bytes = extension_bytes(&fixture, 0, &hash);
        let mut ext = VoteExtension::decode(&bytes).unwrap();
        // Signature from the wrong validator's key.
        let other = VoteExtension::decode(&extension_bytes(&fixture, 1, &hash)).unwrap();
        ext.bls_sig = other.bls_sig;
        let forged = ext.encode();

        let verifier = VoteExtensionVerifier::new(&fixture.valset, 1);
        assert!(matches!(
            verifier.verify(&forged, &BlockHash(hash)),
            Err(VoteExtensionRejection::InvalidSignature(_))
        ));
    }

    #[test]
    fn signer_trait_exposes_consistent_identity() {
        let mut rng = StdRng::seed_from_u64(21);
        let bls_sk = BlsSecretKey::generate(&mut rng);
        let bls_pk = bls_sk.public_key();
        let cons_pk = ConsensusSecretKey::generate(&mut rng).public_key();
        let signer = LocalBlsSigner::new(bls_sk, cons_pk.clone());
        assert_eq!(signer.bls_public_key(), bls_pk);
        assert_eq!(signer.consensus_public_key(), cons_pk);
    }
}
