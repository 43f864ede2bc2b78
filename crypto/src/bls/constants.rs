//! Shared constants for BLS12-381 min-sig signing in this crate.
//!
//! Scope:
//! - Checkpoint signing and multi-signature verification (`bls::keys`)
//! - Internal low-level BLST byte operations (`bls::ops`)

/// Domain separation tag for checkpoint signatures.
///
/// This must remain stable across all nodes in a network. Changing it breaks
/// compatibility with existing signatures.
pub const DST_SIG: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Domain separation tag for proofs of possession.
///
/// Distinct from [`DST_SIG`] so a proof of possession can never be replayed
/// as a checkpoint signature or vice versa.
pub const DST_POP: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_POP_";

/// Compressed byte length of a BLS12-381 G2 public key.
pub const BLS_PUBLIC_KEY_BYTES: usize = 96;

/// Compressed byte length of a BLS12-381 G1 signature.
pub const BLS_SIGNATURE_BYTES: usize = 48;

/// Byte length of a serialized BLS secret key scalar.
pub const BLS_SECRET_KEY_BYTES: usize = 32;
