//! Proposer-side checkpoint aggregation.
//!
//! The proposer of the first block of epoch `E+1` holds the extended
//! pre-commits of epoch `E`'s last block. It picks the canonical block hash
//! by voting power, accumulates the valid BLS signatures into a sealed
//! checkpoint, prunes invalid extensions in place, and injects the result as
//! a synthetic transaction at index 0 of its proposal.

use std::collections::BTreeMap;

use rkyv::{Archive, Deserialize, Serialize};

use crate::accumulator::{Accumulator, has_quorum};
use crate::epoching::EpochNum;
use crate::errors::{CheckpointingError, Result};
use crate::proposal::commit::{BlockIdFlag, ExtendedCommitInfo, ExtendedVoteInfo, validate_vote_extensions};
use crate::proposal::verify::VoteExtensionVerifier;
use crate::state::checkpoint::{BlockHash, RawCheckpointWithMeta};
use crate::state::valset::ValidatorWithBlsKeySet;

/// Position of the injected checkpoint transaction in a first-block
/// proposal. A peer that sees it anywhere else rejects the proposal.
pub const INJECTED_TX_INDEX: usize = 0;

/// The synthetic transaction payload: the sealed checkpoint plus the
/// (possibly pruned) commit it was derived from, so every peer can repeat
/// the derivation.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct InjectedCheckpoint {
    pub ckpt: RawCheckpointWithMeta,
    pub extended_commit_info: ExtendedCommitInfo,
}

impl InjectedCheckpoint {
    /// Wire-encodes the payload for the synthetic transaction.
    pub fn encode_tx(&self) -> Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("Failed to encode injected checkpoint: {:?}", e))?;
        Ok(bytes.to_vec())
    }

    /// Attempts to decode a transaction as an injected checkpoint. Returns
    /// `None` for ordinary transactions.
    pub fn decode_tx(bytes: &[u8]) -> Option<Self> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes).ok()
    }
}

/// Selects the canonical block hash: the hash with the maximum cumulative
/// voting power over all structurally valid extensions in pre-commits
/// flagged `Commit`. Ties break toward the lexicographically smallest hash
/// so every honest node selects identically.
pub(crate) fn canonical_block_hash(
    valset: &ValidatorWithBlsKeySet,
    epoch: EpochNum,
    commit: &ExtendedCommitInfo,
) -> Option<(BlockHash, u64)> {
    let verifier = VoteExtensionVerifier::new(valset, epoch);
    let mut histogram: BTreeMap<[u8; 32], u64> = BTreeMap::new();
    for vote in &commit.votes {
        if vote.block_id_flag != BlockIdFlag::Commit || vote.vote_extension.is_empty() {
            continue;
        }
        if let Ok((ext, record)) = verifier.check_structure(&vote.vote_extension) {
            *histogram.entry(ext.block_hash.0).or_default() += record.power;
        }
    }

    let mut best: Option<([u8; 32], u64)> = None;
    for (hash, power) in histogram {
        // Strictly-greater keeps the smallest hash on ties; the BTreeMap
        // iterates hashes in ascending order.
        if best.map(|(_, best_power)| power > best_power).unwrap_or(true) {
            best = Some((hash, power));
        }
    }
    best.map(|(hash, power)| (BlockHash(hash), power))
}

/// Builds the injected checkpoint for epoch `epoch` from the previous
/// block's extended commit.
///
/// Invalid extensions are pruned in place: their pre-commit is re-flagged
/// `Absent` and the extension and its signature are zeroed, so the carried
/// commit still passes the consensus-layer contract on every peer.
///
/// # Errors
/// Aborts with [`CheckpointingError::InsufficientVotingPower`] when no block
/// hash reaches a `>2/3` supermajority, or when too many extensions fail
/// verification for the checkpoint to seal. The proposer then proposes
/// without an injection.
pub fn prepare_checkpoint_proposal(
    valset: &ValidatorWithBlsKeySet,
    epoch: EpochNum,
    commit: &ExtendedCommitInfo,
) -> Result<InjectedCheckpoint> {
    validate_vote_extensions(valset, commit)
        .map_err(|e| CheckpointingError::InvalidMessage(e.to_string()))?;

    let total_power = valset.total_power();
    let (canonical_hash, hash_power) = canonical_block_hash(valset, epoch, commit)
        .ok_or(CheckpointingError::InsufficientVotingPower {
            power_sum: 0,
            total_power,
        })?;
    if !has_quorum(hash_power, total_power) {
        return Err(CheckpointingError::InsufficientVotingPower {
            power_sum: hash_power,
            total_power,
        });
    }

    let verifier = VoteExtensionVerifier::new(valset, epoch);
    let mut pruned = commit.clone();
    let mut acc = Accumulator::init(epoch, canonical_hash, valset.len());

    for vote in pruned.votes.iter_mut() {
        if vote.block_id_flag != BlockIdFlag::Commit {
            continue;
        }
        match verifier.verify(&vote.vote_extension, &canonical_hash) {
            Ok(ext) => {
                if acc.is_sealed() {
                    continue;
                }
                let record = valset
                    .get(valset.index_of(&ext.signer).expect("verified membership"))
                    .expect("verified membership");
                match acc.accumulate(valset, &ext.signer, &record.bls_pk, &ext.bls_sig) {
                    Ok(next) => acc = next,
                    Err(_) => prune_vote(vote),
                }
            }
            Err(_) => prune_vote(vote),
        }
    }

    if !acc.is_sealed() {
        return Err(CheckpointingError::InsufficientVotingPower {
            power_sum: acc.meta().power_sum,
            total_power,
        });
    }

    Ok(InjectedCheckpoint {
        ckpt: acc.into_meta(),
        extended_commit_info: pruned,
    })
}

fn prune_vote(vote: &mut ExtendedVoteInfo) {
    vote.block_id_flag = BlockIdFlag::Absent;
    vote.vote_extension.clear();
    vote.extension_signature.clear();
}
