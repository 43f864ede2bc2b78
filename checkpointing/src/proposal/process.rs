//! Proposal-side checkpoint validation.
//!
//! Every peer reverses the proposer's work: it re-derives the checkpoint
//! from the carried commit — without pruning, since the proposer already
//! pruned — and accepts the proposal only if the result matches the carried
//! checkpoint field for field.

use thiserror::Error;

use crate::accumulator::Accumulator;
use crate::epoching::EpochNum;
use crate::proposal::commit::{BlockIdFlag, CommitContractViolation, validate_vote_extensions};
use crate::proposal::prepare::{InjectedCheckpoint, canonical_block_hash};
use crate::proposal::verify::VoteExtensionVerifier;
use crate::state::valset::ValidatorWithBlsKeySet;

/// Why a proposal was rejected.
#[derive(Debug, Error)]
pub enum ProposalRejection {
    #[error("Injected checkpoint found at tx index {0}, only index 0 is allowed")]
    InjectedTxOutOfPosition(usize),

    #[error("Carried commit violates the vote-extension contract: {0}")]
    ContractViolation(#[from] CommitContractViolation),

    #[error("Injected checkpoint is for epoch {got}, expected {expected}")]
    WrongEpoch { got: EpochNum, expected: EpochNum },

    #[error("Re-deriving the checkpoint from the carried commit failed: {0}")]
    ReDeriveFailed(String),

    #[error("Re-derived checkpoint does not match the injected one")]
    CheckpointMismatch,
}

/// Validates the first-block proposal of epoch `epoch`'s successor.
///
/// Returns the accepted injection, or `Ok(None)` when the proposal carries
/// no injected checkpoint at all (legitimate when the previous epoch never
/// reached quorum).
pub fn process_checkpoint_proposal(
    valset: &ValidatorWithBlsKeySet,
    epoch: EpochNum,
    txs: &[Vec<u8>],
) -> Result<Option<InjectedCheckpoint>, ProposalRejection> {
    for (i, tx) in txs.iter().enumerate().skip(1) {
        if InjectedCheckpoint::decode_tx(tx).is_some() {
            return Err(ProposalRejection::InjectedTxOutOfPosition(i));
        }
    }
    let Some(first) = txs.first() else {
        return Ok(None);
    };
    let Some(injected) = InjectedCheckpoint::decode_tx(first) else {
        return Ok(None);
    };

    validate_vote_extensions(valset, &injected.extended_commit_info)?;

    if injected.ckpt.ckpt.epoch != epoch {
        return Err(ProposalRejection::WrongEpoch {
            got: injected.ckpt.ckpt.epoch,
            expected: epoch,
        });
    }

    let (canonical_hash, _) =
        canonical_block_hash(valset, epoch, &injected.extended_commit_info).ok_or_else(|| {
            ProposalRejection::ReDeriveFailed("No canonical block hash".to_string())
        })?;

    let verifier = VoteExtensionVerifier::new(valset, epoch);
    let mut acc = Accumulator::init(epoch, canonical_hash, valset.len());
    for vote in &injected.extended_commit_info.votes {
        if vote.block_id_flag != BlockIdFlag::Commit {
            continue;
        }
        let ext = verifier
            .verify(&vote.vote_extension, &canonical_hash)
            .map_err(|e| ProposalRejection::ReDeriveFailed(e.to_string()))?;
        if acc.is_sealed() {
            // Mirrors the proposer, which stops accumulating at quorum.
            continue;
        }
        let record = valset
            .get(valset.index_of(&ext.signer).expect("verified membership"))
            .expect("verified membership");
        acc = acc
            .accumulate(valset, &ext.signer, &record.bls_pk, &ext.bls_sig)
            .map_err(|e| ProposalRejection::ReDeriveFailed(e.to_string()))?;
    }

    if !acc.is_sealed() {
        return Err(ProposalRejection::ReDeriveFailed(
            "Carried commit does not reach quorum".to_string(),
        ));
    }
    if !acc.meta().eq_contents(&injected.ckpt) {
        return Err(ProposalRejection::CheckpointMismatch);
    }

    Ok(Some(injected))
}
