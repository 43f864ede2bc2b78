//! Extended commit info and the consensus-layer vote-extension contract.
//!
//! `ExtendedCommitInfo` mirrors what the consensus engine hands the proposer
//! of the first block of an epoch: the previous block's pre-commits with
//! their attached vote extensions. The same structure rides inside the
//! injected checkpoint transaction so every peer can re-validate it.

use std::collections::HashSet;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

use crate::accumulator::has_quorum;
use crate::state::address::{ConsensusAddress, ValidatorAddress};
use crate::state::valset::ValidatorWithBlsKeySet;

/// How a validator's pre-commit entered the commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub enum BlockIdFlag {
    /// No pre-commit from this validator (or its extension was pruned).
    Absent,
    /// Pre-commit for the decided block.
    Commit,
    /// Pre-commit for nil.
    Nil,
}

/// One validator's signed extended pre-commit.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct ExtendedVoteInfo {
    pub consensus_address: ConsensusAddress,
    /// Voting power, as reported by the consensus engine.
    pub power: u64,
    pub block_id_flag: BlockIdFlag,
    /// Canonical vote-extension bytes; empty when absent.
    pub vote_extension: Vec<u8>,
    /// The consensus engine's signature over the extension. Verified by the
    /// engine itself before the commit reaches this module; carried so the
    /// injected transaction stays re-checkable.
    pub extension_signature: Vec<u8>,
}

/// The full list of extended pre-commits for one decided block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct ExtendedCommitInfo {
    pub votes: Vec<ExtendedVoteInfo>,
}

/// Violations of the consensus-layer `ValidateVoteExtensions` contract.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitContractViolation {
    #[error("Vote from {0} which is not in the epoch validator set")]
    UnknownValidator(String),

    #[error("Duplicate vote from {0}")]
    DuplicateValidator(String),

    #[error("Vote from {validator} claims power {claimed}, snapshot says {actual}")]
    PowerMismatch {
        validator: String,
        claimed: u64,
        actual: u64,
    },

    #[error("Commit power {commit_power} does not exceed 2/3 of total power {total_power}")]
    InsufficientCommitPower { commit_power: u64, total_power: u64 },
}

/// Enforces the consensus-layer contract over an extended commit: every
/// non-absent vote comes from a distinct snapshot validator with its correct
/// power, and the pre-commits flagged `Commit` carry a `>2/3` supermajority.
pub fn validate_vote_extensions(
    valset: &ValidatorWithBlsKeySet,
    commit: &ExtendedCommitInfo,
) -> Result<(), CommitContractViolation> {
    let mut seen: HashSet<ValidatorAddress> = HashSet::with_capacity(commit.votes.len());
    let mut commit_power: u64 = 0;

    for vote in &commit.votes {
        if vote.block_id_flag == BlockIdFlag::Absent {
            continue;
        }
        let operator = ValidatorAddress::from_consensus_address(vote.consensus_address);
        let idx = valset
            .index_of(&operator)
            .ok_or_else(|| CommitContractViolation::UnknownValidator(operator.to_string()))?;
        if !seen.insert(operator) {
            return Err(CommitContractViolation::DuplicateValidator(
                operator.to_string(),
            ));
        }
        let record = valset.get(idx).expect("index came from the set");
        if vote.power != record.power {
            return Err(CommitContractViolation::PowerMismatch {
                validator: operator.to_string(),
                claimed: vote.power,
                actual: record.power,
            });
        }
        if vote.block_id_flag == BlockIdFlag::Commit {
            commit_power += vote.power;
        }
    }

    let total_power = valset.total_power();
    if !has_quorum(commit_power, total_power) {
        return Err(CommitContractViolation::InsufficientCommitPower {
            commit_power,
            total_power,
        });
    }
    Ok(())
}
