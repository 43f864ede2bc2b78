//! BLS key registry.
//!
//! A one-to-one, append-only mapping between validator operator addresses
//! and BLS public keys. Proof-of-possession checks happen at the message
//! layer (`msgs`) before anything reaches the registry; the registry itself
//! only enforces the bijection.

use crypto::bls::keys::BlsPublicKey;

use crate::errors::{CheckpointingError, Result};
use crate::state::address::ValidatorAddress;
use crate::storage::store::CheckpointStore;

/// Handle over the registry tables of a [`CheckpointStore`].
#[derive(Clone)]
pub struct KeyRegistry {
    store: CheckpointStore,
}

impl KeyRegistry {
    pub fn new(store: CheckpointStore) -> Self {
        Self { store }
    }

    /// Registers `(addr, pk)`. Idempotent for the identical pair; any other
    /// collision on either side of the mapping fails.
    ///
    /// The caller must have validated the proof of possession already.
    pub fn register(&self, addr: &ValidatorAddress, pk: &BlsPublicKey) -> Result<()> {
        self.store.insert_bls_key(addr, pk)
    }

    /// The BLS key registered for `addr`.
    pub fn lookup_pk(&self, addr: &ValidatorAddress) -> Result<BlsPublicKey> {
        self.store
            .get_bls_key(addr)?
            .ok_or_else(|| CheckpointingError::BlsKeyNotFound(addr.to_string()))
    }

    /// The validator `pk` is registered to.
    pub fn lookup_addr(&self, pk: &BlsPublicKey) -> Result<ValidatorAddress> {
        self.store
            .get_validator_address(pk)?
            .ok_or_else(|| CheckpointingError::ValidatorNotFound(pk.to_string()))
    }

    pub fn exists(&self, addr: &ValidatorAddress) -> Result<bool> {
        self.store.has_bls_key(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::address::ADDRESS_BYTES;
    use crypto::bls::keys::BlsSecretKey;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn temp_registry(suffix: &str) -> (KeyRegistry, String) {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "key_registry_test-{}-{}.redb",
            suffix,
            rand::random::<u64>()
        ));
        let path = p.to_string_lossy().to_string();
        let store = CheckpointStore::open(&path).expect("open store");
        (KeyRegistry::new(store), path)
    }

    #[test]
    fn lookups_invert_each_other() {
        let (registry, path) = temp_registry("bijection");
        let mut rng = StdRng::seed_from_u64(1);

        // P1: after any sequence of successful registrations, lookup_pk and
        // lookup_addr invert each other.
        let mut pairs = Vec::new();
        for i in 0..8u8 {
            let mut addr_bytes = [0u8; ADDRESS_BYTES];
            rng.fill(&mut addr_bytes);
            addr_bytes[0] = i;
            let addr = ValidatorAddress::from_bytes(addr_bytes);
            let pk = BlsSecretKey::generate(&mut rng).public_key();
            registry.register(&addr, &pk).expect("register");
            pairs.push((addr, pk));
        }

        for (addr, pk) in &pairs {
            let looked_up_pk = registry.lookup_pk(addr).expect("lookup pk");
            assert_eq!(&looked_up_pk, pk);
            let looked_up_addr = registry.lookup_addr(&looked_up_pk).expect("lookup addr");
            assert_eq!(&looked_up_addr, addr);
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn collisions_on_either_side_fail() {
        let (registry, path) = temp_registry("collision");
        let mut rng = StdRng::seed_from_u64(2);

        let addr_a = ValidatorAddress::from_bytes([1u8; ADDRESS_BYTES]);
        let addr_b = ValidatorAddress::from_bytes([2u8; ADDRESS_BYTES]);
        let pk_a = BlsSecretKey::generate(&mut rng).public_key();
        let pk_b = BlsSecretKey::generate(&mut rng).public_key();

        registry.register(&addr_a, &pk_a).expect("register");
        registry.register(&addr_a, &pk_a).expect("same pair again");

        assert!(registry.register(&addr_a, &pk_b).is_err());
        assert!(registry.register(&addr_b, &pk_a).is_err());
        assert!(!registry.exists(&addr_b).unwrap());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_entries_are_not_found() {
        let (registry, path) = temp_registry("missing");
        let mut rng = StdRng::seed_from_u64(3);

        let addr = ValidatorAddress::from_bytes([9u8; ADDRESS_BYTES]);
        let pk = BlsSecretKey::generate(&mut rng).public_key();

        assert!(matches!(
            registry.lookup_pk(&addr),
            Err(CheckpointingError::BlsKeyNotFound(_))
        ));
        assert!(matches!(
            registry.lookup_addr(&pk),
            Err(CheckpointingError::ValidatorNotFound(_))
        ));

        std::fs::remove_file(&path).ok();
    }
}
