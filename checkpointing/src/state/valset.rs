//! Per-epoch validator-set snapshots.
//!
//! A snapshot freezes, at the first block of an epoch, the ordered list of
//! `(operator address, BLS key, power)` that owns that epoch's checkpoint.
//! Records are sorted by operator-address bytes ascending; the sort order is
//! a hard invariant because it defines bitmap indexing.

use rkyv::{Archive, Deserialize, Serialize};

use crypto::bls::keys::BlsPublicKey;

use crate::epoching::EpochNum;
use crate::errors::{CheckpointingError, Result};
use crate::state::address::ValidatorAddress;
use crate::state::bitmap;

/// One validator's entry in an epoch snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct ValidatorBlsRecord {
    pub addr: ValidatorAddress,
    pub bls_pk: BlsPublicKey,
    /// Voting power, consistent with the consensus engine's accounting.
    pub power: u64,
}

/// The frozen, sorted validator set of one epoch.
#[derive(Clone, Debug, PartialEq, Eq, Archive, Deserialize, Serialize)]
pub struct ValidatorWithBlsKeySet {
    pub epoch: EpochNum,
    records: Vec<ValidatorBlsRecord>,
}

impl ValidatorWithBlsKeySet {
    /// Builds a snapshot, sorting records by operator-address bytes.
    ///
    /// # Errors
    /// Rejects duplicate operator addresses; the registry is one-to-one, so
    /// a duplicate means the caller assembled the set incorrectly.
    pub fn new(epoch: EpochNum, mut records: Vec<ValidatorBlsRecord>) -> Result<Self> {
        records.sort_by(|a, b| a.addr.as_bytes().cmp(b.addr.as_bytes()));
        for pair in records.windows(2) {
            if pair[0].addr == pair[1].addr {
                return Err(CheckpointingError::DuplicateValidatorInSet(
                    pair[0].addr.to_string(),
                ));
            }
        }
        Ok(Self { epoch, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ValidatorBlsRecord] {
        &self.records
    }

    /// Bitmap index of `addr`, if present.
    pub fn index_of(&self, addr: &ValidatorAddress) -> Option<usize> {
        self.records
            .binary_search_by(|r| r.addr.as_bytes().cmp(addr.as_bytes()))
            .ok()
    }

    pub fn get(&self, index: usize) -> Option<&ValidatorBlsRecord> {
        self.records.get(index)
    }

    /// Total voting power of the snapshot.
    pub fn total_power(&self) -> u64 {
        self.records.iter().map(|r| r.power).sum()
    }

    /// Resolves a contributor bitmap into the subset of validators it marks,
    /// along with their accumulated power.
    ///
    /// # Errors
    /// Rejects a bitmap whose byte length differs from `ceil(n/8)` or with
    /// any bit set at index `>= n`.
    pub fn find_subset(&self, bits: &[u8]) -> Result<(Vec<&ValidatorBlsRecord>, u64)> {
        let n = self.records.len();
        let expected = bitmap::bitmap_len(n);
        if bits.len() != expected {
            return Err(CheckpointingError::InvalidBitmapLength {
                got: bits.len(),
                expected,
                validators: n,
            });
        }
        for i in n..bits.len() * 8 {
            if bitmap::get_bit(bits, i) {
                return Err(CheckpointingError::BitmapTrailingBits(n));
            }
        }

        let mut subset = Vec::with_capacity(bitmap::count_ones(bits));
        let mut power_sum: u64 = 0;
        for (i, record) in self.records.iter().enumerate() {
            if bitmap::get_bit(bits, i) {
                subset.push(record);
                power_sum += record.power;
            }
        }
        Ok((subset, power_sum))
    }
}
