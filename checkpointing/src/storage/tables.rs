use redb::TableDefinition;

pub const CHECKPOINTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("checkpoints");
pub const VALIDATOR_SETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("validator_sets");
pub const BLS_KEYS_BY_ADDR: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("bls_keys_by_addr");
pub const ADDRS_BY_BLS_KEY: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("addrs_by_bls_key");
pub const CHAIN_META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chain_meta");

/// `chain_meta` key holding the highest finalized epoch (8 bytes BE).
pub const META_LAST_FINALIZED_EPOCH: &[u8] = b"last_finalized_epoch";

/// `chain_meta` key holding the conflicting-checkpoint halt flag (1 byte).
pub const META_CONFLICTING_CHECKPOINT: &[u8] = b"conflicting_checkpoint";
