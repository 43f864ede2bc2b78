//! Raw checkpoints and their status state machine.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crypto::bls::keys::{BlsPublicKey, BlsSignature};

use crate::epoching::EpochNum;

/// Byte length of a block hash.
pub const BLOCK_HASH_BYTES: usize = 32;

/// Byte length of the message a checkpoint signature covers:
/// big-endian epoch number followed by the block hash.
pub const SIGNED_MSG_BYTES: usize = 8 + BLOCK_HASH_BYTES;

/// Hash of the last block of an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Archive, Deserialize, Serialize)]
pub struct BlockHash(pub [u8; BLOCK_HASH_BYTES]);

impl BlockHash {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; BLOCK_HASH_BYTES] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_BYTES] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Lifecycle status of a checkpoint.
///
/// The graph moves forward `Accumulating → Sealed → Submitted → Confirmed →
/// Finalized`, with a single reverse edge from `{Submitted, Confirmed}` back
/// to `Sealed` when a Bitcoin reorg drops the submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Archive, Deserialize, Serialize)]
pub enum CheckpointStatus {
    /// Collecting signatures; quorum not yet reached.
    Accumulating,
    /// Quorum reached; contents are immutable from here on.
    Sealed,
    /// Observed inside a Bitcoin transaction.
    Submitted,
    /// Buried under enough proof of work to act on.
    Confirmed,
    /// Deep enough that reversal is considered infeasible.
    Finalized,
}

impl CheckpointStatus {
    /// The set of statuses a checkpoint may hold immediately before
    /// transitioning to `self`. Drives every compare-and-swap status update.
    pub fn allowed_from(self) -> &'static [CheckpointStatus] {
        match self {
            // Checkpoints are created accumulating, never updated into it.
            CheckpointStatus::Accumulating => &[],
            CheckpointStatus::Sealed => &[
                CheckpointStatus::Accumulating,
                CheckpointStatus::Submitted,
                CheckpointStatus::Confirmed,
            ],
            CheckpointStatus::Submitted => &[CheckpointStatus::Sealed],
            CheckpointStatus::Confirmed => &[CheckpointStatus::Submitted],
            CheckpointStatus::Finalized => &[CheckpointStatus::Confirmed],
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointStatus::Accumulating => write!(f, "ACCUMULATING"),
            CheckpointStatus::Sealed => write!(f, "SEALED"),
            CheckpointStatus::Submitted => write!(f, "SUBMITTED"),
            CheckpointStatus::Confirmed => write!(f, "CONFIRMED"),
            CheckpointStatus::Finalized => write!(f, "FINALIZED"),
        }
    }
}

/// One lifecycle log entry: the status entered and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct StateUpdate {
    pub state: CheckpointStatus,
    pub block_height: u64,
    pub block_time: u64,
}

/// The compact object written to Bitcoin: epoch, agreed block hash, the
/// contributor bitmap, and the aggregated BLS signature.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct RawCheckpoint {
    pub epoch: EpochNum,
    pub block_hash: BlockHash,
    /// Packed LSB-first bit vector over the epoch's sorted validator set;
    /// bit `i` marks validator `i` as a contributor.
    pub bitmap: Vec<u8>,
    pub bls_multi_sig: BlsSignature,
}

impl RawCheckpoint {
    /// The message every contributor signs for this checkpoint.
    pub fn signed_msg(&self) -> [u8; SIGNED_MSG_BYTES] {
        signed_msg(self.epoch, &self.block_hash)
    }
}

/// Builds the signed message for `(epoch, block_hash)`: the big-endian epoch
/// number followed by the hash bytes.
pub fn signed_msg(epoch: EpochNum, block_hash: &BlockHash) -> [u8; SIGNED_MSG_BYTES] {
    let mut msg = [0u8; SIGNED_MSG_BYTES];
    msg[..8].copy_from_slice(&epoch.to_be_bytes());
    msg[8..].copy_from_slice(block_hash.as_bytes());
    msg
}

/// A checkpoint with its aggregation metadata and lifecycle log.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct RawCheckpointWithMeta {
    pub ckpt: RawCheckpoint,
    pub status: CheckpointStatus,
    /// Aggregate public key of the contributors recorded in the bitmap so
    /// far; `None` while the bitmap is empty.
    pub bls_aggr_pk: Option<BlsPublicKey>,
    /// Accumulated voting power of the contributors.
    pub power_sum: u64,
    /// Every status transition, in order.
    pub lifecycle: Vec<StateUpdate>,
}

impl RawCheckpointWithMeta {
    /// Sets the status and appends the matching lifecycle entry.
    pub fn record_state_update(&mut self, status: CheckpointStatus, height: u64, time: u64) {
        self.status = status;
        self.lifecycle.push(StateUpdate {
            state: status,
            block_height: height,
            block_time: time,
        });
    }

    /// Content equality, ignoring the lifecycle log. Used by proposal
    /// validation, where the log is filled in only at sealing time.
    pub fn eq_contents(&self, other: &Self) -> bool {
        self.ckpt == other.ckpt
            && self.status == other.status
            && self.bls_aggr_pk == other.bls_aggr_pk
            && self.power_sum == other.power_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_from_covers_forward_and_reorg_edges() {
        use CheckpointStatus::*;

        assert!(Sealed.allowed_from().contains(&Accumulating));
        assert!(Sealed.allowed_from().contains(&Submitted));
        assert!(Sealed.allowed_from().contains(&Confirmed));
        assert_eq!(Submitted.allowed_from(), &[Sealed]);
        assert_eq!(Confirmed.allowed_from(), &[Submitted]);
        assert_eq!(Finalized.allowed_from(), &[Confirmed]);
        assert!(Accumulating.allowed_from().is_empty());

        // No status may re-enter itself.
        for status in [Accumulating, Sealed, Submitted, Confirmed, Finalized] {
            assert!(!status.allowed_from().contains(&status));
        }
    }

    #[test]
    fn signed_msg_layout() {
        let hash = BlockHash([0xab; BLOCK_HASH_BYTES]);
        let msg = signed_msg(0x0102, &hash);
        assert_eq!(&msg[..8], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(&msg[8..], &[0xab; BLOCK_HASH_BYTES]);
    }

    #[test]
    fn record_state_update_appends_lifecycle() {
        let mut meta = RawCheckpointWithMeta {
            ckpt: RawCheckpoint {
                epoch: 1,
                block_hash: BlockHash([0; BLOCK_HASH_BYTES]),
                bitmap: vec![0],
                bls_multi_sig: BlsSignature::default(),
            },
            status: CheckpointStatus::Accumulating,
            bls_aggr_pk: None,
            power_sum: 0,
            lifecycle: vec![],
        };

        meta.record_state_update(CheckpointStatus::Sealed, 11, 1_700_000_000);
        assert_eq!(meta.status, CheckpointStatus::Sealed);
        assert_eq!(meta.lifecycle.len(), 1);
        assert_eq!(meta.lifecycle[0].state, CheckpointStatus::Sealed);
        assert_eq!(meta.lifecycle[0].block_height, 11);
    }
}
