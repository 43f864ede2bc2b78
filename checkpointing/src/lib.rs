//! Checkpointing core for the Keel chain.
//!
//! Once per epoch the validator set produces a *raw checkpoint*: a compact
//! BLS multi-signature over the hash of the epoch's last block, later
//! timestamped on Bitcoin by an external relay. This crate contains the
//! four subsystems that produce and track checkpoints:
//!
//! - the vote-extension pipeline (sign at the epoch boundary, aggregate in
//!   the next proposer, verify everywhere),
//! - the checkpoint store and its status state machine,
//! - the BLS key registry with proof-of-possession checks,
//! - per-epoch validator-set snapshots and quorum arithmetic.
//!
//! The Bitcoin submission path itself lives in the vigilante, not here; the
//! external-submission intake only consumes its status nudges and inclusion
//! witnesses.

pub mod accumulator;
pub mod epoching;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod keeper;
pub mod msgs;
pub mod proposal;
pub mod registry;
pub mod state;
pub mod storage;
#[cfg(test)]
mod tests;
