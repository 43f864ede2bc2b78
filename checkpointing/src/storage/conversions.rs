use anyhow::Result;
use rkyv::{
    Archive, Archived, api::high::to_bytes_with_alloc, ser::allocator::Arena, util::AlignedVec,
};

use crate::state::checkpoint::RawCheckpointWithMeta;
use crate::state::valset::ValidatorWithBlsKeySet;

/// Accesses an archived value from a byte slice.
///
/// # Safety
///
/// The byte slice must represent a valid archived type when accessed at the
/// default root position. See the official rkyv documentation for more
/// https://docs.rs/rkyv/latest/rkyv/api/index.html.
pub unsafe fn access_archived<T: Archive>(bytes: &[u8]) -> &Archived<T> {
    unsafe { rkyv::access_unchecked::<Archived<T>>(bytes) }
}

/// Serializes a value for storage in the redb database using the rkyv
/// library.
///
/// The value is serialized as an [`AlignedVec`] for storage in the redb
/// database.
///
/// # Errors
///
/// Returns an error if the serialization fails.
pub fn serialize_for_db<T>(value: &T) -> Result<AlignedVec>
where
    T: for<'a> rkyv::Serialize<
            rkyv::api::high::HighSerializer<
                AlignedVec,
                rkyv::ser::allocator::ArenaHandle<'a>,
                rkyv::rancor::Error,
            >,
        >,
{
    let mut arena = Arena::new();
    to_bytes_with_alloc::<_, rkyv::rancor::Error>(value, arena.acquire())
        .map_err(|e| anyhow::anyhow!("Serialization failed: {:?}", e))
}

/// Trait for types that can be stored in the redb database.
pub trait Storable {
    type Key: AsRef<[u8]>;
    type Value: AsRef<[u8]>;

    /// Returns the key for the value
    fn key(&self) -> Self::Key;

    /// Returns the value for the key
    fn value(&self) -> Result<Self::Value>;
}

// Checkpoints and snapshots are keyed by big-endian epoch number so that a
// range scan walks epochs in order and a reverse scan yields the latest
// first.

impl Storable for RawCheckpointWithMeta {
    type Key = [u8; 8];
    type Value = AlignedVec;

    fn key(&self) -> Self::Key {
        self.ckpt.epoch.to_be_bytes()
    }

    fn value(&self) -> Result<Self::Value> {
        serialize_for_db(self)
    }
}

impl Storable for ValidatorWithBlsKeySet {
    type Key = [u8; 8];
    type Value = AlignedVec;

    fn key(&self) -> Self::Key {
        self.epoch.to_be_bytes()
    }

    fn value(&self) -> Result<Self::Value> {
        serialize_for_db(self)
    }
}
