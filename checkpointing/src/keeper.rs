//! The checkpointing keeper.
//!
//! The keeper owns every handle the core mutates: the checkpoint store, the
//! key registry, the hook set, and the per-block event buffer. All state
//! changes run inside exactly one of {`begin_block`, a message handler,
//! `pre_block`, `end_block`} on a single writer; nothing here needs a lock,
//! and no internal mutable reference ever crosses a handler boundary.

use anyhow::Result as AnyResult;
use slog::{Logger, info, o, warn};

use crypto::bls::keys::BlsPublicKey;

use crate::accumulator::has_quorum;
use crate::epoching::{EpochNum, EpochingParams};
use crate::errors::{CheckpointingError, Result};
use crate::events::CheckpointingEvent;
use crate::hooks::{CheckpointingHooks, MultiHooks};
use crate::msgs::{GenesisKey, MsgWrappedCreateValidator, StakingForwarder};
use crate::proposal::prepare::InjectedCheckpoint;
use crate::registry::KeyRegistry;
use crate::state::address::ValidatorAddress;
use crate::state::checkpoint::{CheckpointStatus, RawCheckpointWithMeta};
use crate::state::frame;
use crate::state::valset::{ValidatorBlsRecord, ValidatorWithBlsKeySet};
use crate::storage::store::CheckpointStore;

/// Supplies the bonded validator set, in the consensus engine's own power
/// accounting, when an epoch begins. Provided by the staking/epoching
/// collaborator.
pub trait ValidatorSetSource {
    fn bonded_validators(&self) -> AnyResult<Vec<(ValidatorAddress, u64)>>;
}

/// Keeper over the checkpointing core. Construction is leaves-first: open
/// the store, build the registry over it, then hand both to the keeper
/// together with the collaborator handles.
pub struct CheckpointingKeeper<V: ValidatorSetSource, F: StakingForwarder> {
    store: CheckpointStore,
    registry: KeyRegistry,
    hooks: MultiHooks,
    valset_source: V,
    staking: F,
    params: EpochingParams,
    logger: Logger,
    events: Vec<CheckpointingEvent>,
}

impl<V: ValidatorSetSource, F: StakingForwarder> CheckpointingKeeper<V, F> {
    pub fn new(
        store: CheckpointStore,
        hooks: MultiHooks,
        valset_source: V,
        staking: F,
        params: EpochingParams,
        logger: Logger,
    ) -> Self {
        let registry = KeyRegistry::new(store.clone());
        Self {
            store,
            registry,
            hooks,
            valset_source,
            staking,
            params,
            logger: logger.new(o!("module" => "checkpointing")),
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn params(&self) -> &EpochingParams {
        &self.params
    }

    /// Drains the events produced since the last call. The host forwards
    /// them to its event bus after each handler.
    pub fn take_events(&mut self) -> Vec<CheckpointingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Hooks are observational: failures are logged and dropped.
    fn observe_hook(&self, hook: &'static str, result: AnyResult<()>) {
        if let Err(e) = result {
            warn!(self.logger, "Checkpointing hook failed"; "hook" => hook, "error" => %e);
        }
    }

    // ---- genesis ----

    /// Validates and registers the genesis validators' BLS keys. Epoch 0 is
    /// finalized implicitly; the store seeds the watermark.
    pub fn init_genesis(&mut self, keys: &[GenesisKey]) -> Result<()> {
        for key in keys {
            key.validate()?;
            self.registry
                .register(&key.validator_address, &key.bls_key.pubkey)?;
            self.events.push(CheckpointingEvent::BlsKeyRegistered {
                validator: key.validator_address,
            });
            self.observe_hook(
                "after_bls_key_registered",
                self.hooks.after_bls_key_registered(&key.validator_address),
            );
        }
        Ok(())
    }

    // ---- begin/end-block glue ----

    /// At the first block of an epoch, freezes the validator set for that
    /// epoch with BLS keys resolved through the registry.
    ///
    /// # Panics
    /// Panics when a bonded validator has no registered BLS key. Key
    /// registration is mandatory at validator creation, so a missing key
    /// means state corruption.
    pub fn begin_block(&mut self, height: u64) -> Result<()> {
        if !self.params.is_first_block_of_epoch(height) {
            return Ok(());
        }
        let epoch = self.params.epoch_of_height(height);
        if self.store.get_validator_set(epoch)?.is_some() {
            return Ok(());
        }

        let bonded = self.valset_source.bonded_validators()?;
        let mut records = Vec::with_capacity(bonded.len());
        for (addr, power) in bonded {
            let bls_pk = self.registry.lookup_pk(&addr).unwrap_or_else(|_| {
                panic!("Bonded validator {addr} has no registered BLS key")
            });
            records.push(ValidatorBlsRecord { addr, bls_pk, power });
        }
        let set = ValidatorWithBlsKeySet::new(epoch, records)?;
        self.store.put_validator_set(&set)?;

        info!(self.logger, "Snapshotted validator set";
            "epoch" => epoch, "validators" => set.len(), "total_power" => set.total_power());
        Ok(())
    }

    /// Halts the chain when a valid conflicting checkpoint was observed
    /// during this block.
    ///
    /// # Panics
    /// Panics — deliberately — when the conflict flag is set: a valid
    /// multi-signature over a different block hash for a checkpointed epoch
    /// means the chain this node sees cannot be the canonical one.
    pub fn end_block(&mut self) -> Result<()> {
        if self.store.conflicting_checkpoint_flag()? {
            panic!(
                "A conflicting checkpoint with a valid BLS multi-signature exists; halting"
            );
        }
        Ok(())
    }

    // ---- pre-block ----

    /// Applies the decided first block of an epoch: extracts the injected
    /// checkpoint, if any, and seals it. `ProcessProposal` has already
    /// validated the injection, so failures here are fatal.
    pub fn pre_block(&mut self, height: u64, block_time: u64, txs: &[Vec<u8>]) -> Result<()> {
        if !self.params.is_first_block_of_epoch(height) {
            return Ok(());
        }
        let Some(injected) = txs.first().and_then(|tx| InjectedCheckpoint::decode_tx(tx)) else {
            return Ok(());
        };
        self.seal_checkpoint(height, block_time, injected.ckpt)
    }

    /// Seals the checkpoint in the store: `(absent | Accumulating) →
    /// Sealed`, idempotent when already sealed.
    ///
    /// # Panics
    /// Panics when the stored checkpoint has advanced past `Sealed` or the
    /// injection targets the wrong epoch; both are broken-invariant states
    /// that `ProcessProposal` can never let through.
    pub fn seal_checkpoint(
        &mut self,
        height: u64,
        block_time: u64,
        mut meta: RawCheckpointWithMeta,
    ) -> Result<()> {
        let epoch = meta.ckpt.epoch;
        let current_epoch = self.params.epoch_of_height(height);
        assert_eq!(
            epoch + 1,
            current_epoch,
            "Injected checkpoint for epoch {epoch} applied at height {height}"
        );
        let total_power = self
            .store
            .get_validator_set(epoch)?
            .ok_or(CheckpointingError::ValSetNotFound(epoch))?
            .total_power();
        assert!(
            has_quorum(meta.power_sum, total_power),
            "Sealing a checkpoint without quorum for epoch {epoch}"
        );

        match self.store.get_checkpoint(epoch)? {
            None => {
                meta.lifecycle.clear();
                meta.record_state_update(CheckpointStatus::Sealed, height, block_time);
                self.store.create_checkpoint(&meta)?;
            }
            Some(existing) if existing.status == CheckpointStatus::Sealed => {
                // Replayed pre-block; nothing to do.
                return Ok(());
            }
            Some(existing) if existing.status == CheckpointStatus::Accumulating => {
                meta.lifecycle = existing.lifecycle;
                meta.record_state_update(CheckpointStatus::Sealed, height, block_time);
                self.store.update_checkpoint(&meta)?;
            }
            Some(existing) => {
                panic!(
                    "Checkpoint for epoch {epoch} is already {}; cannot seal",
                    existing.status
                );
            }
        }

        info!(self.logger, "Sealed checkpoint";
            "epoch" => epoch, "block_hash" => %meta.ckpt.block_hash, "power_sum" => meta.power_sum);
        self.events.push(CheckpointingEvent::CheckpointSealed {
            epoch,
            block_hash: meta.ckpt.block_hash,
            power_sum: meta.power_sum,
        });
        self.observe_hook(
            "after_raw_checkpoint_sealed",
            self.hooks.after_raw_checkpoint_sealed(epoch),
        );
        Ok(())
    }

    // ---- message handlers ----

    /// Handles a wrapped create-validator request: validates it, registers
    /// the BLS key, and forwards the inner message to staking.
    pub fn handle_wrapped_create_validator(
        &mut self,
        msg: &MsgWrappedCreateValidator,
    ) -> Result<()> {
        msg.validate_basic()?;
        self.registry
            .register(&msg.inner.operator_address, &msg.bls_key.pubkey)?;
        self.events.push(CheckpointingEvent::BlsKeyRegistered {
            validator: msg.inner.operator_address,
        });
        self.observe_hook(
            "after_bls_key_registered",
            self.hooks
                .after_bls_key_registered(&msg.inner.operator_address),
        );
        self.staking.forward_create_validator(&msg.inner)?;
        Ok(())
    }

    // ---- external-submission intake ----

    /// `Sealed → Submitted`, reported by the relay when the checkpoint
    /// appears in a Bitcoin transaction.
    pub fn set_submitted(&mut self, epoch: EpochNum, height: u64, time: u64) -> Result<()> {
        self.store
            .update_status(epoch, CheckpointStatus::Submitted, height, time)?;
        self.events
            .push(CheckpointingEvent::CheckpointSubmitted { epoch });
        Ok(())
    }

    /// `Submitted → Confirmed`, once buried under enough proof of work.
    pub fn set_confirmed(&mut self, epoch: EpochNum, height: u64, time: u64) -> Result<()> {
        self.store
            .update_status(epoch, CheckpointStatus::Confirmed, height, time)?;
        self.events
            .push(CheckpointingEvent::CheckpointConfirmed { epoch });
        self.observe_hook(
            "after_raw_checkpoint_confirmed",
            self.hooks.after_raw_checkpoint_confirmed(epoch),
        );
        Ok(())
    }

    /// `Confirmed → Finalized`; raises the last-finalized-epoch watermark.
    pub fn set_finalized(&mut self, epoch: EpochNum, height: u64, time: u64) -> Result<()> {
        self.store
            .update_status(epoch, CheckpointStatus::Finalized, height, time)?;
        self.store.set_last_finalized_epoch(epoch)?;
        self.events
            .push(CheckpointingEvent::CheckpointFinalized { epoch });
        self.observe_hook(
            "after_raw_checkpoint_finalized",
            self.hooks.after_raw_checkpoint_finalized(epoch),
        );
        Ok(())
    }

    /// `{Submitted, Confirmed} → Sealed`: a Bitcoin reorg dropped the
    /// submission, the relay must submit again.
    pub fn set_forgotten(&mut self, epoch: EpochNum, height: u64, time: u64) -> Result<()> {
        // The generic CAS for Sealed also admits the sealing edge from
        // Accumulating; the reorg nudge must not.
        let current = self.checkpoint(epoch)?;
        if !matches!(
            current.status,
            CheckpointStatus::Submitted | CheckpointStatus::Confirmed
        ) {
            return Err(CheckpointingError::InvalidCkptStatus {
                epoch,
                actual: current.status,
                requested: CheckpointStatus::Sealed,
            });
        }
        let updated = self
            .store
            .update_status(epoch, CheckpointStatus::Sealed, height, time)?;
        self.events
            .push(CheckpointingEvent::CheckpointForgotten { epoch });
        self.observe_hook(
            "after_raw_checkpoint_forgotten",
            self.hooks.after_raw_checkpoint_forgotten(&updated.ckpt),
        );
        Ok(())
    }

    /// Verifies a checkpoint witnessed on the external chain, framed as its
    /// two tagged chunks.
    ///
    /// A content-equal witness for a non-accumulating local checkpoint is
    /// accepted directly. Anything else is independently quorum-checked
    /// against the epoch snapshot; a valid multi-signature over a
    /// *different* block hash raises the halt flag that `end_block`
    /// converts into a panic.
    pub fn verify_external_checkpoint(&mut self, chunk_a: &[u8], chunk_b: &[u8]) -> Result<()> {
        let (external, _submitter) = frame::decode_checkpoint(chunk_a, chunk_b)?;
        let epoch = external.epoch;

        let local = self
            .store
            .get_checkpoint(epoch)?
            .ok_or(CheckpointingError::CkptNotFound(epoch))?;

        if local.status != CheckpointStatus::Accumulating && local.ckpt == external {
            self.observe_hook(
                "after_raw_checkpoint_bls_sig_verified",
                self.hooks.after_raw_checkpoint_bls_sig_verified(&external),
            );
            return Ok(());
        }

        let valset = self
            .store
            .get_validator_set(epoch)?
            .ok_or(CheckpointingError::ValSetNotFound(epoch))?;
        let (subset, power_sum) = valset.find_subset(&external.bitmap)?;
        let total_power = valset.total_power();
        if !has_quorum(power_sum, total_power) {
            return Err(CheckpointingError::InsufficientVotingPower {
                power_sum,
                total_power,
            });
        }
        let pks: Vec<BlsPublicKey> = subset.iter().map(|r| r.bls_pk).collect();
        if !BlsPublicKey::verify_multi(&external.bls_multi_sig, &pks, &external.signed_msg()) {
            return Err(CheckpointingError::InvalidBlsSignature(format!(
                "External checkpoint for epoch {epoch}"
            )));
        }

        if external.block_hash != local.ckpt.block_hash {
            warn!(self.logger, "Conflicting external checkpoint";
                "epoch" => epoch,
                "local_hash" => %local.ckpt.block_hash,
                "external_hash" => %external.block_hash);
            self.store.set_conflicting_checkpoint_flag(true)?;
            self.events.push(CheckpointingEvent::ConflictingCheckpoint {
                epoch,
                local_hash: local.ckpt.block_hash,
                external_hash: external.block_hash,
            });
            return Err(CheckpointingError::ConflictingCheckpoint { epoch });
        }

        self.observe_hook(
            "after_raw_checkpoint_bls_sig_verified",
            self.hooks.after_raw_checkpoint_bls_sig_verified(&external),
        );
        Ok(())
    }

    // ---- queries ----

    pub fn checkpoint(&self, epoch: EpochNum) -> Result<RawCheckpointWithMeta> {
        self.store
            .get_checkpoint(epoch)?
            .ok_or(CheckpointingError::CkptNotFound(epoch))
    }

    /// Status of an epoch's checkpoint. Epoch 0 has no checkpoint and is
    /// finalized by definition.
    pub fn status(&self, epoch: EpochNum) -> Result<CheckpointStatus> {
        if epoch == 0 {
            return Ok(CheckpointStatus::Finalized);
        }
        Ok(self.checkpoint(epoch)?.status)
    }

    pub fn last_finalized_epoch(&self) -> Result<EpochNum> {
        self.store.last_finalized_epoch()
    }

    pub fn validator_set(&self, epoch: EpochNum) -> Result<ValidatorWithBlsKeySet> {
        self.store
            .get_validator_set(epoch)?
            .ok_or(CheckpointingError::ValSetNotFound(epoch))
    }
}
