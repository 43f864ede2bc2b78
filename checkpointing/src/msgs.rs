//! Checkpointing messages and genesis key material.
//!
//! `MsgWrappedCreateValidator` wraps the staking module's create-validator
//! request with the BLS key and its proof of possession, so a validator can
//! only ever join with a usable checkpoint key. This module only inspects
//! the slice of the inner message the checkpointing core cares about; the
//! full message is forwarded to the staking collaborator untouched.

use anyhow::Result as AnyResult;

use crypto::bls::keys::BlsPublicKey;
use crypto::ed25519::ConsensusPublicKey;
use crypto::pop::ProofOfPossession;

use crate::errors::{CheckpointingError, Result};
use crate::state::address::{ConsensusAddress, ValidatorAddress};

/// A BLS public key with its proof of possession.
#[derive(Clone, Debug)]
pub struct BlsKeyInfo {
    pub pubkey: BlsPublicKey,
    pub pop: ProofOfPossession,
}

/// The checkpointing-relevant slice of the staking module's
/// create-validator message.
#[derive(Clone, Debug)]
pub struct MsgCreateValidator {
    pub operator_address: ValidatorAddress,
    pub consensus_pubkey: ConsensusPublicKey,
    pub moniker: String,
}

impl MsgCreateValidator {
    /// Stateless validation: a non-empty moniker and an operator address
    /// consistent with the consensus key. Operator and consensus addresses
    /// share their payload, so the check is a pure derivation.
    pub fn validate_basic(&self) -> Result<()> {
        if self.moniker.is_empty() {
            return Err(CheckpointingError::InvalidMessage(
                "Validator moniker is empty".to_string(),
            ));
        }
        let derived = ValidatorAddress::from_consensus_address(
            ConsensusAddress::from_consensus_pubkey(&self.consensus_pubkey),
        );
        if derived != self.operator_address {
            return Err(CheckpointingError::InvalidMessage(format!(
                "Operator address {} does not match consensus key (expected {})",
                self.operator_address, derived
            )));
        }
        Ok(())
    }
}

/// A create-validator request wrapped with the BLS key material.
#[derive(Clone, Debug)]
pub struct MsgWrappedCreateValidator {
    pub inner: MsgCreateValidator,
    pub bls_key: BlsKeyInfo,
}

impl MsgWrappedCreateValidator {
    /// Stateless validation: key material present and on-curve, inner
    /// message valid, and the proof of possession binding the BLS key to
    /// the inner message's consensus key.
    pub fn validate_basic(&self) -> Result<()> {
        self.bls_key
            .pubkey
            .key_validate()
            .map_err(|e| CheckpointingError::InvalidMessage(format!("Invalid BLS key: {e}")))?;
        self.inner.validate_basic()?;
        if !self
            .bls_key
            .pop
            .verify(&self.bls_key.pubkey, &self.inner.consensus_pubkey)
        {
            return Err(CheckpointingError::InvalidPop(
                self.inner.operator_address.to_string(),
            ));
        }
        Ok(())
    }
}

/// One genesis validator's key material, written into the genesis file by
/// the assembly tooling and validated at chain start.
#[derive(Clone, Debug)]
pub struct GenesisKey {
    pub validator_address: ValidatorAddress,
    pub consensus_pubkey: ConsensusPublicKey,
    pub bls_key: BlsKeyInfo,
}

impl GenesisKey {
    pub fn validate(&self) -> Result<()> {
        self.bls_key
            .pubkey
            .key_validate()
            .map_err(|e| CheckpointingError::InvalidMessage(format!("Invalid BLS key: {e}")))?;
        let derived = ValidatorAddress::from_consensus_address(
            ConsensusAddress::from_consensus_pubkey(&self.consensus_pubkey),
        );
        if derived != self.validator_address {
            return Err(CheckpointingError::InvalidMessage(format!(
                "Genesis key address {} does not match consensus key",
                self.validator_address
            )));
        }
        if !self
            .bls_key
            .pop
            .verify(&self.bls_key.pubkey, &self.consensus_pubkey)
        {
            return Err(CheckpointingError::InvalidPop(
                self.validator_address.to_string(),
            ));
        }
        Ok(())
    }
}

/// Forwards the inner create-validator message to the staking/epoching
/// collaborator once the checkpointing side has accepted it. Queueing
/// semantics are the collaborator's business.
pub trait StakingForwarder {
    fn forward_create_validator(&mut self, msg: &MsgCreateValidator) -> AnyResult<()>;
}
