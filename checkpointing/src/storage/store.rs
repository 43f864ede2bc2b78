use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use redb::{Database, ReadableTable, TableDefinition};
use rkyv::de::Pool;
use rkyv::rancor::Strategy;
use rkyv::util::AlignedVec;
use rkyv::{Archive, deserialize};

use crypto::bls::constants::BLS_PUBLIC_KEY_BYTES;
use crypto::bls::keys::BlsPublicKey;

use crate::epoching::EpochNum;
use crate::errors::{CheckpointingError, Result};
use crate::state::address::{ADDRESS_BYTES, ValidatorAddress};
use crate::state::checkpoint::{CheckpointStatus, RawCheckpointWithMeta};
use crate::state::valset::ValidatorWithBlsKeySet;
use crate::storage::config::StorageConfig;
use crate::storage::conversions::{Storable, access_archived};
use crate::storage::tables::{
    ADDRS_BY_BLS_KEY, BLS_KEYS_BY_ADDR, CHAIN_META, CHECKPOINTS, META_CONFLICTING_CHECKPOINT,
    META_LAST_FINALIZED_EPOCH, VALIDATOR_SETS,
};

/// [`CheckpointStore`] wraps the redb database holding everything the
/// checkpointing core persists: checkpoints with their metadata, per-epoch
/// validator snapshots, the BLS key registry, and chain-level meta cells.
///
/// Every mutating method runs inside a single redb write transaction, so a
/// checkpoint's `(status, ckpt, bls_aggr_pk, power_sum, lifecycle)` either
/// all persist or none do.
#[derive(Clone)]
pub struct CheckpointStore {
    db: Arc<Database>,
}

impl CheckpointStore {
    /// Opens a database from a path to the database file.
    pub fn open<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let db = if path.as_ref().exists() {
            Database::open(path).context("Failed to open database")?
        } else {
            Database::create(path).context("Failed to create database")?
        };
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Opens a database from a configuration path.
    pub fn from_config_path<P: AsRef<Path>>(config_path: P) -> AnyResult<Self> {
        let config = StorageConfig::from_path(config_path)?;
        Self::open(config.path)
    }

    /// Initializes the tables and seeds the genesis meta cells: epoch 0 is
    /// finalized at genesis and no conflict has been observed.
    fn init_tables(&self) -> AnyResult<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            write_txn
                .open_table(VALIDATOR_SETS)
                .context("Failed to open validator sets table")?;
            write_txn
                .open_table(BLS_KEYS_BY_ADDR)
                .context("Failed to open bls keys table")?;
            write_txn
                .open_table(ADDRS_BY_BLS_KEY)
                .context("Failed to open addresses table")?;
            let mut meta = write_txn
                .open_table(CHAIN_META)
                .context("Failed to open chain meta table")?;
            if meta
                .get(META_LAST_FINALIZED_EPOCH)
                .context("Failed to read last finalized epoch")?
                .is_none()
            {
                meta.insert(META_LAST_FINALIZED_EPOCH, 0u64.to_be_bytes().as_slice())
                    .context("Failed to seed last finalized epoch")?;
            }
            if meta
                .get(META_CONFLICTING_CHECKPOINT)
                .context("Failed to read conflict flag")?
                .is_none()
            {
                meta.insert(META_CONFLICTING_CHECKPOINT, [0u8].as_slice())
                    .context("Failed to seed conflict flag")?;
            }
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")
    }

    /// Gets a value from the database.
    unsafe fn get_blob_value<T, K>(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: K,
    ) -> AnyResult<Option<T>>
    where
        T: Archive,
        <T as Archive>::Archived: rkyv::Deserialize<T, Strategy<Pool, rkyv::rancor::Error>>,
        K: AsRef<[u8]>,
    {
        let read = self.db.begin_read()?;
        let t = read.open_table(table)?;
        if let Some(row) = t.get(key.as_ref())? {
            Ok(Some(unsafe { decode_blob::<T>(row.value()) }?))
        } else {
            Ok(None)
        }
    }

    // ---- checkpoints ----

    /// Creates a checkpoint for its epoch.
    ///
    /// # Errors
    /// [`CheckpointingError::CkptAlreadyExist`] when a checkpoint for the
    /// epoch is already stored.
    pub fn create_checkpoint(&self, meta: &RawCheckpointWithMeta) -> Result<()> {
        let key = meta.key();
        let bytes = meta.value()?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            if table
                .get(key.as_slice())
                .context("Failed to read checkpoint")?
                .is_some()
            {
                return Err(CheckpointingError::CkptAlreadyExist(meta.ckpt.epoch));
            }
            table
                .insert(key.as_slice(), bytes.as_ref())
                .context("Failed to insert checkpoint")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Retrieves the checkpoint for an epoch, if it exists.
    pub fn get_checkpoint(&self, epoch: EpochNum) -> Result<Option<RawCheckpointWithMeta>> {
        let meta = unsafe {
            self.get_blob_value::<RawCheckpointWithMeta, _>(CHECKPOINTS, epoch.to_be_bytes())
        }?;
        Ok(meta)
    }

    /// Overwrites the checkpoint for an epoch.
    ///
    /// # Errors
    /// [`CheckpointingError::CkptNotFound`] when no checkpoint exists yet;
    /// use [`Self::create_checkpoint`] for the first write.
    pub fn update_checkpoint(&self, meta: &RawCheckpointWithMeta) -> Result<()> {
        let key = meta.key();
        let bytes = meta.value()?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            if table
                .get(key.as_slice())
                .context("Failed to read checkpoint")?
                .is_none()
            {
                return Err(CheckpointingError::CkptNotFound(meta.ckpt.epoch));
            }
            table
                .insert(key.as_slice(), bytes.as_ref())
                .context("Failed to insert checkpoint")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Compare-and-swap status update: moves the epoch's checkpoint to
    /// `to` iff its current status is in `to.allowed_from()`, appending a
    /// lifecycle entry. Returns the updated checkpoint.
    pub fn update_status(
        &self,
        epoch: EpochNum,
        to: CheckpointStatus,
        block_height: u64,
        block_time: u64,
    ) -> Result<RawCheckpointWithMeta> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let updated = {
            let mut table = write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            let key = epoch.to_be_bytes();
            let mut meta = match table.get(key.as_slice()).context("Failed to read checkpoint")? {
                Some(row) => unsafe { decode_blob::<RawCheckpointWithMeta>(row.value()) }?,
                None => return Err(CheckpointingError::CkptNotFound(epoch)),
            };

            if !to.allowed_from().contains(&meta.status) {
                return Err(CheckpointingError::InvalidCkptStatus {
                    epoch,
                    actual: meta.status,
                    requested: to,
                });
            }
            meta.record_state_update(to, block_height, block_time);

            let bytes = meta.value()?;
            table
                .insert(key.as_slice(), bytes.as_ref())
                .context("Failed to insert checkpoint")?;
            meta
        };
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(updated)
    }

    /// The most recent (highest-epoch) checkpoint holding `status`, if any.
    pub fn latest_checkpoint_with_status(
        &self,
        status: CheckpointStatus,
    ) -> Result<Option<RawCheckpointWithMeta>> {
        let read = self.db.begin_read().context("Failed to begin read")?;
        let table = read
            .open_table(CHECKPOINTS)
            .context("Failed to open checkpoints table")?;
        for row in table
            .iter()
            .context("Failed to iterate checkpoints")?
            .rev()
        {
            let (_, value) = row.context("Failed to read checkpoint row")?;
            let meta = unsafe { decode_blob::<RawCheckpointWithMeta>(value.value()) }?;
            if meta.status == status {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    // ---- BLS key registry ----

    /// Registers `(addr, pk)` in both directions of the registry.
    ///
    /// Re-registering the identical pair succeeds idempotently. Any other
    /// collision on either side fails: the mapping is one-to-one and
    /// append-only.
    pub fn insert_bls_key(&self, addr: &ValidatorAddress, pk: &BlsPublicKey) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut by_addr = write_txn
                .open_table(BLS_KEYS_BY_ADDR)
                .context("Failed to open bls keys table")?;
            let mut by_key = write_txn
                .open_table(ADDRS_BY_BLS_KEY)
                .context("Failed to open addresses table")?;

            let existing_pk = by_addr
                .get(addr.as_bytes().as_slice())
                .context("Failed to read registry")?
                .map(|row| row.value().to_vec());
            let existing_addr = by_key
                .get(pk.0.as_slice())
                .context("Failed to read registry")?
                .map(|row| row.value().to_vec());

            match (&existing_pk, &existing_addr) {
                (Some(stored_pk), Some(stored_addr))
                    if stored_pk.as_slice() == pk.0.as_slice()
                        && stored_addr.as_slice() == addr.as_bytes().as_slice() =>
                {
                    // Same pair, nothing to do.
                }
                (None, None) => {
                    by_addr
                        .insert(addr.as_bytes().as_slice(), pk.0.as_slice())
                        .context("Failed to insert bls key")?;
                    by_key
                        .insert(pk.0.as_slice(), addr.as_bytes().as_slice())
                        .context("Failed to insert address")?;
                }
                _ => return Err(CheckpointingError::BlsKeyCollision(addr.to_string())),
            }
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// The BLS key registered for a validator, if any.
    pub fn get_bls_key(&self, addr: &ValidatorAddress) -> Result<Option<BlsPublicKey>> {
        let read = self.db.begin_read().context("Failed to begin read")?;
        let table = read
            .open_table(BLS_KEYS_BY_ADDR)
            .context("Failed to open bls keys table")?;
        let row = table
            .get(addr.as_bytes().as_slice())
            .context("Failed to read registry")?;
        match row {
            Some(row) => {
                let bytes: [u8; BLS_PUBLIC_KEY_BYTES] = row
                    .value()
                    .try_into()
                    .context("Registry holds a malformed BLS key")?;
                Ok(Some(BlsPublicKey(bytes)))
            }
            None => Ok(None),
        }
    }

    /// The validator a BLS key is registered to, if any.
    pub fn get_validator_address(&self, pk: &BlsPublicKey) -> Result<Option<ValidatorAddress>> {
        let read = self.db.begin_read().context("Failed to begin read")?;
        let table = read
            .open_table(ADDRS_BY_BLS_KEY)
            .context("Failed to open addresses table")?;
        let row = table
            .get(pk.0.as_slice())
            .context("Failed to read registry")?;
        match row {
            Some(row) => {
                let bytes: [u8; ADDRESS_BYTES] = row
                    .value()
                    .try_into()
                    .context("Registry holds a malformed address")?;
                Ok(Some(ValidatorAddress::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn has_bls_key(&self, addr: &ValidatorAddress) -> Result<bool> {
        Ok(self.get_bls_key(addr)?.is_some())
    }

    // ---- validator set snapshots ----

    /// Persists the frozen validator set of an epoch. Snapshots are
    /// immutable: writing a second set for the same epoch is an error.
    pub fn put_validator_set(&self, set: &ValidatorWithBlsKeySet) -> Result<()> {
        let key = set.key();
        let bytes = set.value()?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(VALIDATOR_SETS)
                .context("Failed to open validator sets table")?;
            if table
                .get(key.as_slice())
                .context("Failed to read validator set")?
                .is_some()
            {
                return Err(CheckpointingError::ValSetAlreadyExist(set.epoch));
            }
            table
                .insert(key.as_slice(), bytes.as_ref())
                .context("Failed to insert validator set")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Retrieves the frozen validator set of an epoch, if it exists.
    pub fn get_validator_set(&self, epoch: EpochNum) -> Result<Option<ValidatorWithBlsKeySet>> {
        let set = unsafe {
            self.get_blob_value::<ValidatorWithBlsKeySet, _>(VALIDATOR_SETS, epoch.to_be_bytes())
        }?;
        Ok(set)
    }

    // ---- chain meta ----

    /// Highest finalized epoch. Seeded to 0 at store creation; a missing
    /// cell means the database is corrupted.
    ///
    /// # Panics
    /// Panics if the cell is missing.
    pub fn last_finalized_epoch(&self) -> Result<EpochNum> {
        let read = self.db.begin_read().context("Failed to begin read")?;
        let table = read
            .open_table(CHAIN_META)
            .context("Failed to open chain meta table")?;
        let row = table
            .get(META_LAST_FINALIZED_EPOCH)
            .context("Failed to read last finalized epoch")?
            .expect("Last finalized epoch is seeded at genesis; store is corrupted");
        let bytes: [u8; 8] = row
            .value()
            .try_into()
            .context("Last finalized epoch cell is malformed")?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Raises the last-finalized-epoch watermark. The cell only ever
    /// increases; a lower value is ignored.
    pub fn set_last_finalized_epoch(&self, epoch: EpochNum) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(CHAIN_META)
                .context("Failed to open chain meta table")?;
            let current = table
                .get(META_LAST_FINALIZED_EPOCH)
                .context("Failed to read last finalized epoch")?
                .map(|row| {
                    let bytes: [u8; 8] = row.value().try_into().unwrap_or([0u8; 8]);
                    u64::from_be_bytes(bytes)
                })
                .unwrap_or(0);
            if epoch > current {
                table
                    .insert(META_LAST_FINALIZED_EPOCH, epoch.to_be_bytes().as_slice())
                    .context("Failed to write last finalized epoch")?;
            }
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    /// Whether a valid conflicting external checkpoint has been observed.
    /// `EndBlock` turns a raised flag into a chain halt.
    pub fn conflicting_checkpoint_flag(&self) -> Result<bool> {
        let read = self.db.begin_read().context("Failed to begin read")?;
        let table = read
            .open_table(CHAIN_META)
            .context("Failed to open chain meta table")?;
        let row = table
            .get(META_CONFLICTING_CHECKPOINT)
            .context("Failed to read conflict flag")?;
        Ok(row.map(|row| row.value() != [0u8].as_slice()).unwrap_or(false))
    }

    pub fn set_conflicting_checkpoint_flag(&self, value: bool) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(CHAIN_META)
                .context("Failed to open chain meta table")?;
            table
                .insert(META_CONFLICTING_CHECKPOINT, [value as u8].as_slice())
                .context("Failed to write conflict flag")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }
}

/// Decodes an rkyv blob read back from the database.
///
/// # Safety
/// The bytes must have been produced by [`Storable::value`] for `T`.
unsafe fn decode_blob<T>(bytes: &[u8]) -> AnyResult<T>
where
    T: Archive,
    <T as Archive>::Archived: rkyv::Deserialize<T, Strategy<Pool, rkyv::rancor::Error>>,
{
    let mut aligned = AlignedVec::<1024>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    let archived = unsafe { access_archived::<T>(aligned.as_slice()) };
    deserialize(archived).map_err(|e| anyhow::anyhow!("Failed to deserialize: {:?}", e))
}
