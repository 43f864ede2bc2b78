//! Events emitted by the checkpointing keeper.
//!
//! Handlers push events into the keeper's per-block buffer; the host
//! application drains them after each hook with `take_events` and forwards
//! them to its own event bus.

use crate::epoching::EpochNum;
use crate::state::address::ValidatorAddress;
use crate::state::checkpoint::BlockHash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointingEvent {
    BlsKeyRegistered {
        validator: ValidatorAddress,
    },
    CheckpointSealed {
        epoch: EpochNum,
        block_hash: BlockHash,
        power_sum: u64,
    },
    CheckpointSubmitted {
        epoch: EpochNum,
    },
    CheckpointConfirmed {
        epoch: EpochNum,
    },
    CheckpointFinalized {
        epoch: EpochNum,
    },
    CheckpointForgotten {
        epoch: EpochNum,
    },
    /// A well-formed external checkpoint with a valid quorum multi-signature
    /// disagrees with the local block hash for the same epoch.
    ConflictingCheckpoint {
        epoch: EpochNum,
        local_hash: BlockHash,
        external_hash: BlockHash,
    },
}
