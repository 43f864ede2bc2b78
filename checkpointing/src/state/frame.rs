//! External-chain checkpoint framing.
//!
//! A raw checkpoint rides to Bitcoin inside two OP_RETURN-like data chunks.
//! Each chunk starts with a 4-byte tag: the `KEL` magic followed by one byte
//! packing the framing version (high nibble) and the chunk index (low
//! nibble). Stripping the tags and concatenating the payloads in index order
//! yields:
//!
//! ```text
//! epoch (8, BE) ‖ block_hash (32) ‖ bitmap ‖ bls_multi_sig (48) ‖ submitter (20)
//! ```
//!
//! The bitmap length is whatever remains after the fixed fields.

use thiserror::Error;

use crypto::bls::constants::BLS_SIGNATURE_BYTES;
use crypto::bls::keys::BlsSignature;

use crate::state::checkpoint::{BLOCK_HASH_BYTES, BlockHash, RawCheckpoint};

/// Magic prefix of every chunk tag.
pub const FRAME_MAGIC: [u8; 3] = *b"KEL";

/// Current framing version.
pub const FRAME_VERSION: u8 = 0;

/// Byte length of a submitter address on the external chain.
pub const SUBMITTER_ADDR_BYTES: usize = 20;

const TAG_BYTES: usize = 4;
const FIXED_PAYLOAD_BYTES: usize = 8 + BLOCK_HASH_BYTES + BLS_SIGNATURE_BYTES + SUBMITTER_ADDR_BYTES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Chunk shorter than the {TAG_BYTES}-byte tag")]
    ShortChunk,

    #[error("Chunk tag does not carry the KEL magic")]
    BadMagic,

    #[error("Unsupported framing version {0}")]
    BadVersion(u8),

    #[error("Chunk index {0} is outside {{0, 1}}")]
    BadIndex(u8),

    #[error("Both chunks carry index {0}")]
    DuplicateIndex(u8),

    #[error("Payload is {0} bytes, too short for the fixed checkpoint fields")]
    ShortPayload(usize),
}

/// Splits a checkpoint (plus the submitter's address) into the two tagged
/// chunks written to the external chain.
pub fn encode_checkpoint(
    ckpt: &RawCheckpoint,
    submitter: &[u8; SUBMITTER_ADDR_BYTES],
) -> [Vec<u8>; 2] {
    let mut payload = Vec::with_capacity(FIXED_PAYLOAD_BYTES + ckpt.bitmap.len());
    payload.extend_from_slice(&ckpt.epoch.to_be_bytes());
    payload.extend_from_slice(ckpt.block_hash.as_bytes());
    payload.extend_from_slice(&ckpt.bitmap);
    payload.extend_from_slice(&ckpt.bls_multi_sig.0);
    payload.extend_from_slice(submitter);

    let mid = payload.len() / 2;
    let mut chunk0 = Vec::with_capacity(TAG_BYTES + mid);
    chunk0.extend_from_slice(&tag(0));
    chunk0.extend_from_slice(&payload[..mid]);
    let mut chunk1 = Vec::with_capacity(TAG_BYTES + payload.len() - mid);
    chunk1.extend_from_slice(&tag(1));
    chunk1.extend_from_slice(&payload[mid..]);
    [chunk0, chunk1]
}

/// Reassembles a checkpoint from its two tagged chunks, in either order.
pub fn decode_checkpoint(
    chunk_a: &[u8],
    chunk_b: &[u8],
) -> Result<(RawCheckpoint, [u8; SUBMITTER_ADDR_BYTES]), FrameError> {
    let (idx_a, payload_a) = strip_tag(chunk_a)?;
    let (idx_b, payload_b) = strip_tag(chunk_b)?;
    if idx_a == idx_b {
        return Err(FrameError::DuplicateIndex(idx_a));
    }

    let mut payload = Vec::with_capacity(payload_a.len() + payload_b.len());
    if idx_a == 0 {
        payload.extend_from_slice(payload_a);
        payload.extend_from_slice(payload_b);
    } else {
        payload.extend_from_slice(payload_b);
        payload.extend_from_slice(payload_a);
    }

    // At least one bitmap byte: an empty validator set cannot checkpoint.
    if payload.len() <= FIXED_PAYLOAD_BYTES {
        return Err(FrameError::ShortPayload(payload.len()));
    }
    let bitmap_len = payload.len() - FIXED_PAYLOAD_BYTES;

    let mut epoch_bytes = [0u8; 8];
    epoch_bytes.copy_from_slice(&payload[..8]);
    let epoch = u64::from_be_bytes(epoch_bytes);

    let mut hash = [0u8; BLOCK_HASH_BYTES];
    hash.copy_from_slice(&payload[8..8 + BLOCK_HASH_BYTES]);

    let bitmap_start = 8 + BLOCK_HASH_BYTES;
    let bitmap = payload[bitmap_start..bitmap_start + bitmap_len].to_vec();

    let sig_start = bitmap_start + bitmap_len;
    let mut sig = [0u8; BLS_SIGNATURE_BYTES];
    sig.copy_from_slice(&payload[sig_start..sig_start + BLS_SIGNATURE_BYTES]);

    let mut submitter = [0u8; SUBMITTER_ADDR_BYTES];
    submitter.copy_from_slice(&payload[sig_start + BLS_SIGNATURE_BYTES..]);

    Ok((
        RawCheckpoint {
            epoch,
            block_hash: BlockHash(hash),
            bitmap,
            bls_multi_sig: BlsSignature(sig),
        },
        submitter,
    ))
}

fn tag(index: u8) -> [u8; TAG_BYTES] {
    [
        FRAME_MAGIC[0],
        FRAME_MAGIC[1],
        FRAME_MAGIC[2],
        (FRAME_VERSION << 4) | index,
    ]
}

fn strip_tag(chunk: &[u8]) -> Result<(u8, &[u8]), FrameError> {
    if chunk.len() < TAG_BYTES {
        return Err(FrameError::ShortChunk);
    }
    if chunk[..3] != FRAME_MAGIC {
        return Err(FrameError::BadMagic);
    }
    let version = chunk[3] >> 4;
    if version != FRAME_VERSION {
        return Err(FrameError::BadVersion(version));
    }
    let index = chunk[3] & 0x0f;
    if index > 1 {
        return Err(FrameError::BadIndex(index));
    }
    Ok((index, &chunk[TAG_BYTES..]))
}
