//! Iterative BLS signature aggregation toward a sealed checkpoint.
//!
//! The accumulator is a pure `(state, input) -> Result<state>` transition:
//! a failed accumulation returns the error and leaves the caller's state
//! untouched, so the result is deterministic regardless of call site.
//! Individual signatures are kept until the quorum check passes and are
//! aggregated into the multi-signature only at sealing time.

use crypto::bls::keys::{BlsPublicKey, BlsSignature};

use crate::epoching::EpochNum;
use crate::errors::{CheckpointingError, Result};
use crate::state::address::ValidatorAddress;
use crate::state::bitmap;
use crate::state::checkpoint::{
    BlockHash, CheckpointStatus, RawCheckpoint, RawCheckpointWithMeta, signed_msg,
};
use crate::state::valset::ValidatorWithBlsKeySet;

/// Returns true when `power_sum` is a `>2/3` supermajority of `total`.
pub fn has_quorum(power_sum: u64, total_power: u64) -> bool {
    3 * u128::from(power_sum) > 2 * u128::from(total_power)
}

/// In-progress aggregation state for one epoch's checkpoint.
#[derive(Clone, Debug)]
pub struct Accumulator {
    meta: RawCheckpointWithMeta,
    /// Contributor signatures, kept unaggregated until sealing.
    pending_sigs: Vec<BlsSignature>,
}

impl Accumulator {
    /// Starts accumulating for `(epoch, block_hash)` over a validator set of
    /// `validator_count` members.
    pub fn init(epoch: EpochNum, block_hash: BlockHash, validator_count: usize) -> Self {
        Self {
            meta: RawCheckpointWithMeta {
                ckpt: RawCheckpoint {
                    epoch,
                    block_hash,
                    bitmap: vec![0u8; bitmap::bitmap_len(validator_count)],
                    bls_multi_sig: BlsSignature::default(),
                },
                status: CheckpointStatus::Accumulating,
                bls_aggr_pk: None,
                power_sum: 0,
                lifecycle: vec![],
            },
            pending_sigs: vec![],
        }
    }

    pub fn meta(&self) -> &RawCheckpointWithMeta {
        &self.meta
    }

    pub fn into_meta(self) -> RawCheckpointWithMeta {
        self.meta
    }

    pub fn is_sealed(&self) -> bool {
        self.meta.status == CheckpointStatus::Sealed
    }

    /// Folds one validator's signature into the checkpoint.
    ///
    /// The duplicate-signer check runs before signature verification, and
    /// verification runs before any mutation, so a rejected input leaves the
    /// accumulator state untouched. When the accumulated power crosses the
    /// `>2/3` quorum the checkpoint seals: the kept signatures are
    /// aggregated into `bls_multi_sig` and the status becomes `Sealed`.
    pub fn accumulate(
        &self,
        valset: &ValidatorWithBlsKeySet,
        signer: &ValidatorAddress,
        signer_pk: &BlsPublicKey,
        sig: &BlsSignature,
    ) -> Result<Accumulator> {
        let idx = valset
            .index_of(signer)
            .ok_or_else(|| CheckpointingError::SignerNotInValidatorSet(signer.to_string()))?;
        let record = valset.get(idx).expect("index came from the set");
        if record.bls_pk != *signer_pk {
            return Err(CheckpointingError::SignerKeyMismatch(signer.to_string()));
        }

        if bitmap::get_bit(&self.meta.ckpt.bitmap, idx) {
            return Err(CheckpointingError::CkptAlreadyVoted(signer.to_string()));
        }

        let msg = signed_msg(self.meta.ckpt.epoch, &self.meta.ckpt.block_hash);
        if !signer_pk.verify(&msg, sig) {
            return Err(CheckpointingError::InvalidBlsSignature(signer.to_string()));
        }

        let mut next = self.clone();
        bitmap::set_bit(&mut next.meta.ckpt.bitmap, idx);
        next.meta.power_sum += record.power;
        next.meta.bls_aggr_pk = Some(match &self.meta.bls_aggr_pk {
            Some(aggr) => BlsPublicKey::aggregate(&[*aggr, *signer_pk])?,
            None => *signer_pk,
        });
        next.pending_sigs.push(*sig);

        if has_quorum(next.meta.power_sum, valset.total_power()) {
            next.meta.ckpt.bls_multi_sig = BlsSignature::aggregate(&next.pending_sigs)?;
            next.meta.status = CheckpointStatus::Sealed;
        }
        Ok(next)
    }
}
