//! Vote extensions and their canonical wire codec.
//!
//! A vote extension carries one validator's BLS signature over the last
//! block of an epoch, piggy-backed on its consensus pre-commit. The codec is
//! canonical by construction: fields are strictly ordered, unsigned integers
//! use minimal LEB128 varints, and trailing bytes are rejected, so any
//! accepted byte string re-encodes to itself. The verifier still runs the
//! explicit re-encoding check: bech32 tolerates an all-uppercase rendering
//! on decode that would not survive re-encoding, and the check closes that
//! and any future non-canonical decoder path.

use thiserror::Error;

use crypto::bls::constants::BLS_SIGNATURE_BYTES;
use crypto::bls::keys::BlsSignature;

use crate::epoching::EpochNum;
use crate::state::address::{ConsensusAddress, ValidatorAddress};
use crate::state::checkpoint::{BLOCK_HASH_BYTES, BlockHash};

/// Hard cap on the encoded size of a vote extension. The legitimate fields
/// cannot exceed ~230 bytes; four-fold headroom suffices.
pub const MAX_VOTE_EXTENSION_BYTES: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Varint is not minimally encoded")]
    NonMinimalVarint,

    #[error("Varint overflows u64")]
    VarintOverflow,

    #[error("Encoded extension is {0} bytes, above the {MAX_VOTE_EXTENSION_BYTES} byte cap")]
    Oversized(usize),

    #[error("Trailing bytes after the last field")]
    TrailingBytes,

    #[error("Field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid address field: {0}")]
    InvalidAddress(String),
}

/// One validator's signature over the last block of an epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteExtension {
    /// Operator address of the signing validator.
    pub signer: ValidatorAddress,
    /// Consensus address derived from the validator's consensus public key.
    pub validator_address: ConsensusAddress,
    /// The block hash the pre-commit is being cast over.
    pub block_hash: BlockHash,
    pub epoch: EpochNum,
    pub height: u64,
    /// BLS signature over `epoch (BE) ‖ block_hash`.
    pub bls_sig: BlsSignature,
}

impl VoteExtension {
    /// Canonical encoding. Field order: signer, validator_address,
    /// block_hash, epoch, height, bls_sig.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        put_str(&mut out, &self.signer.to_string());
        put_str(&mut out, &self.validator_address.to_string());
        out.extend_from_slice(self.block_hash.as_bytes());
        put_uvarint(&mut out, self.epoch);
        put_uvarint(&mut out, self.height);
        out.extend_from_slice(&self.bls_sig.0);
        out
    }

    /// Decodes a vote extension, enforcing the size cap, minimal varints,
    /// and the absence of trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_VOTE_EXTENSION_BYTES {
            return Err(WireError::Oversized(bytes.len()));
        }

        let mut cursor = Cursor::new(bytes);
        let signer_str = cursor.read_str()?;
        let signer: ValidatorAddress = signer_str
            .parse()
            .map_err(|e: crate::state::address::AddressError| {
                WireError::InvalidAddress(e.to_string())
            })?;
        let validator_str = cursor.read_str()?;
        let validator_address: ConsensusAddress = validator_str
            .parse()
            .map_err(|e: crate::state::address::AddressError| {
                WireError::InvalidAddress(e.to_string())
            })?;
        let block_hash = BlockHash(cursor.read_array::<BLOCK_HASH_BYTES>()?);
        let epoch = cursor.read_uvarint()?;
        let height = cursor.read_uvarint()?;
        let bls_sig = BlsSignature(cursor.read_array::<BLS_SIGNATURE_BYTES>()?);
        cursor.finish()?;

        Ok(Self {
            signer,
            validator_address,
            block_hash,
            epoch,
            height,
            bls_sig,
        })
    }
}

fn put_uvarint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_uvarint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(WireError::UnexpectedEof)?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_uvarint(&mut self) -> Result<u64, WireError> {
        let mut value: u64 = 0;
        for shift in 0..10 {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or(WireError::UnexpectedEof)?;
            self.pos += 1;

            if shift == 9 && byte > 0x01 {
                return Err(WireError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << (shift * 7);

            if byte & 0x80 == 0 {
                // The most significant group must be non-zero, otherwise a
                // shorter encoding exists.
                if shift > 0 && byte == 0 {
                    return Err(WireError::NonMinimalVarint);
                }
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow)
    }

    fn read_str(&mut self) -> Result<&'a str, WireError> {
        let len = self.read_uvarint()?;
        let len = usize::try_from(len).map_err(|_| WireError::UnexpectedEof)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    fn finish(&self) -> Result<(), WireError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(WireError::TrailingBytes)
        }
    }
}
