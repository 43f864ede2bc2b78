//! Cryptographic primitives for the Keel checkpointing core.
//!
//! Two signature schemes live here, used for different purposes:
//!
//! - **BLS12-381 (min-sig)**: epoch checkpoint signatures. Signatures are
//!   compressed G1 points (48 bytes), public keys compressed G2 points
//!   (96 bytes), which keeps the aggregated multi-signature written to
//!   Bitcoin small.
//! - **Ed25519**: validator consensus keys. A proof of possession binds a
//!   BLS key to the consensus key that registered it.

pub mod bls;
pub mod ed25519;
pub mod pop;
