//! Checkpointing error types.

use thiserror::Error;

use crate::state::checkpoint::CheckpointStatus;
use crate::state::frame::FrameError;

pub type Result<T> = std::result::Result<T, CheckpointingError>;

/// Errors surfaced by the checkpointing core.
///
/// Peer-facing validation paths (vote extensions, proposals) do not use this
/// type; they return reject decisions instead so a malicious peer can never
/// crash the node. See `proposal::verify::VoteExtensionRejection` and
/// `proposal::process::ProposalRejection`.
#[derive(Debug, Error)]
pub enum CheckpointingError {
    /// A checkpoint for this epoch is already stored.
    #[error("Checkpoint for epoch {0} already exists")]
    CkptAlreadyExist(u64),

    /// No checkpoint stored for this epoch.
    #[error("Checkpoint for epoch {0} does not exist")]
    CkptNotFound(u64),

    /// Compare-and-swap status update found a status outside the
    /// allowed-from set of the requested transition.
    #[error("Checkpoint for epoch {epoch} is {actual}, cannot transition to {requested}")]
    InvalidCkptStatus {
        epoch: u64,
        actual: CheckpointStatus,
        requested: CheckpointStatus,
    },

    /// The validator is already represented in the checkpoint bitmap.
    #[error("Validator {0} already contributed to the checkpoint")]
    CkptAlreadyVoted(String),

    /// The signer is missing from the epoch's validator snapshot.
    #[error("Validator {0} is not in the epoch validator set")]
    SignerNotInValidatorSet(String),

    /// The BLS key presented by a signer differs from the snapshot's.
    #[error("BLS key for validator {0} does not match the epoch snapshot")]
    SignerKeyMismatch(String),

    /// A BLS signature failed verification.
    #[error("Invalid BLS signature: {0}")]
    InvalidBlsSignature(String),

    /// Bitmap byte length is inconsistent with the validator count.
    #[error("Bitmap is {got} bytes, expected {expected} for {validators} validators")]
    InvalidBitmapLength {
        got: usize,
        expected: usize,
        validators: usize,
    },

    /// A bitmap bit beyond the validator count is set.
    #[error("Bitmap has bits set beyond validator index {0}")]
    BitmapTrailingBits(usize),

    /// Accumulated voting power does not exceed two thirds of the total.
    #[error("Voting power {power_sum} does not exceed 2/3 of total power {total_power}")]
    InsufficientVotingPower { power_sum: u64, total_power: u64 },

    /// Registering this `(validator, BLS key)` pair would break the
    /// one-to-one registry mapping.
    #[error("BLS key registration for {0} collides with an existing entry")]
    BlsKeyCollision(String),

    /// No BLS key registered for the validator.
    #[error("No BLS key registered for validator {0}")]
    BlsKeyNotFound(String),

    /// No validator registered for the BLS key.
    #[error("No validator registered for BLS key {0}")]
    ValidatorNotFound(String),

    /// The same operator address appears twice in a snapshot under
    /// construction; the registry is one-to-one, so the caller assembled
    /// the set incorrectly.
    #[error("Duplicate validator {0} in the epoch snapshot")]
    DuplicateValidatorInSet(String),

    /// No validator-set snapshot stored for the epoch.
    #[error("Validator set for epoch {0} does not exist")]
    ValSetNotFound(u64),

    /// A snapshot for this epoch already exists; snapshots are immutable.
    #[error("Validator set for epoch {0} already exists")]
    ValSetAlreadyExist(u64),

    /// Proof-of-possession verification failed.
    #[error("Invalid proof of possession for validator {0}")]
    InvalidPop(String),

    /// A valid external multi-signature disagrees with the local
    /// checkpoint's block hash. The caller has already raised the halt flag.
    #[error("Epoch {epoch} checkpoint conflicts with a valid external checkpoint")]
    ConflictingCheckpoint { epoch: u64 },

    /// External-chain checkpoint framing could not be decoded.
    #[error("Invalid external checkpoint framing: {0}")]
    Framing(#[from] FrameError),

    /// A message failed stateless validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Storage-layer failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
