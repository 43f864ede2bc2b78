//! Shared fixtures for checkpointing tests.

use anyhow::Result as AnyResult;
use rand::{SeedableRng, rngs::StdRng};
use slog::{Logger, o};

use crypto::bls::keys::BlsSecretKey;
use crypto::ed25519::ConsensusSecretKey;
use crypto::pop::ProofOfPossession;

use crate::epoching::{EpochNum, EpochingParams};
use crate::hooks::MultiHooks;
use crate::keeper::{CheckpointingKeeper, ValidatorSetSource};
use crate::msgs::{BlsKeyInfo, GenesisKey, MsgCreateValidator, StakingForwarder};
use crate::proposal::commit::{BlockIdFlag, ExtendedCommitInfo, ExtendedVoteInfo};
use crate::proposal::extend::{LocalBlsSigner, VoteExtensionProducer};
use crate::state::address::{ConsensusAddress, ValidatorAddress};
use crate::state::checkpoint::BlockHash;
use crate::state::valset::{ValidatorBlsRecord, ValidatorWithBlsKeySet};
use crate::state::vote_extension::VoteExtension;
use crate::storage::store::CheckpointStore;

/// One test validator with its full key material.
pub struct TestValidator {
    pub bls_sk: BlsSecretKey,
    pub cons_sk: ConsensusSecretKey,
    pub addr: ValidatorAddress,
    pub cons_addr: ConsensusAddress,
    pub power: u64,
}

impl TestValidator {
    fn generate(rng: &mut StdRng, power: u64) -> Self {
        let bls_sk = BlsSecretKey::generate(rng);
        let cons_sk = ConsensusSecretKey::generate(rng);
        let cons_addr = ConsensusAddress::from_consensus_pubkey(&cons_sk.public_key());
        Self {
            bls_sk,
            cons_sk,
            addr: ValidatorAddress::from_consensus_address(cons_addr),
            cons_addr,
            power,
        }
    }

    pub fn producer(&self, params: EpochingParams) -> VoteExtensionProducer<LocalBlsSigner> {
        VoteExtensionProducer::new(
            LocalBlsSigner::new(self.bls_sk.clone(), self.cons_sk.public_key()),
            params,
        )
    }

    pub fn genesis_key(&self) -> GenesisKey {
        GenesisKey {
            validator_address: self.addr,
            consensus_pubkey: self.cons_sk.public_key(),
            bls_key: BlsKeyInfo {
                pubkey: self.bls_sk.public_key(),
                pop: ProofOfPossession::prove(&self.bls_sk, &self.cons_sk),
            },
        }
    }

    pub fn create_validator_msg(&self, moniker: &str) -> MsgCreateValidator {
        MsgCreateValidator {
            operator_address: self.addr,
            consensus_pubkey: self.cons_sk.public_key(),
            moniker: moniker.to_string(),
        }
    }
}

/// A deterministic validator network whose `validators[i]` sits at bitmap
/// index `i` of the epoch-1 snapshot.
pub struct TestNetwork {
    pub validators: Vec<TestValidator>,
    pub valset: ValidatorWithBlsKeySet,
    pub params: EpochingParams,
}

impl TestNetwork {
    pub fn new(n: usize, power: u64, epoch_interval: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let mut validators: Vec<TestValidator> =
            (0..n).map(|_| TestValidator::generate(&mut rng, power)).collect();
        // Keep validators[i] aligned with snapshot index i.
        validators.sort_by(|a, b| a.addr.as_bytes().cmp(b.addr.as_bytes()));

        let records = validators
            .iter()
            .map(|v| ValidatorBlsRecord {
                addr: v.addr,
                bls_pk: v.bls_sk.public_key(),
                power: v.power,
            })
            .collect();
        let valset = ValidatorWithBlsKeySet::new(1, records).expect("test valset");

        Self {
            validators,
            valset,
            params: EpochingParams::new(epoch_interval),
        }
    }

    /// A signed vote extension from validator `i` for `(epoch, hash)`.
    pub fn signed_extension(&self, i: usize, epoch: EpochNum, hash: &BlockHash) -> VoteExtension {
        let height = self.params.last_block_height(epoch);
        self.validators[i]
            .producer(self.params)
            .extend_vote(height, hash.as_bytes())
            .expect("extend vote")
            .expect("epoch boundary")
    }

    /// An extended commit where the listed validators pre-committed with
    /// extensions over `hash`.
    pub fn extended_commit(
        &self,
        epoch: EpochNum,
        hash: &BlockHash,
        signers: &[usize],
    ) -> ExtendedCommitInfo {
        let votes = signers
            .iter()
            .map(|&i| ExtendedVoteInfo {
                consensus_address: self.validators[i].cons_addr,
                power: self.validators[i].power,
                block_id_flag: BlockIdFlag::Commit,
                vote_extension: self.signed_extension(i, epoch, hash).encode(),
                extension_signature: vec![0xEE; 64],
            })
            .collect();
        ExtendedCommitInfo { votes }
    }

    /// The single bitmap byte marking the given snapshot indices.
    pub fn expected_bitmap(&self, indices: &[usize]) -> u8 {
        indices.iter().fold(0u8, |acc, &i| acc | (1 << i))
    }

    pub fn genesis_keys(&self) -> Vec<GenesisKey> {
        self.validators.iter().map(|v| v.genesis_key()).collect()
    }
}

/// Replaces an encoded extension's signature with garbage; the result stays
/// structurally valid but fails BLS verification.
pub fn corrupt_signature(bytes: &mut Vec<u8>) {
    let mut ext = VoteExtension::decode(bytes).expect("decodable extension");
    ext.bls_sig.0[40] ^= 0x55;
    *bytes = ext.encode();
}

/// A fixed bonded set, the way the staking collaborator would serve it.
pub struct StaticValSetSource {
    pub bonded: Vec<(ValidatorAddress, u64)>,
}

impl ValidatorSetSource for StaticValSetSource {
    fn bonded_validators(&self) -> AnyResult<Vec<(ValidatorAddress, u64)>> {
        Ok(self.bonded.clone())
    }
}

/// Records forwarded create-validator messages instead of staking them.
#[derive(Default)]
pub struct RecordingForwarder {
    pub forwarded: Vec<String>,
}

impl StakingForwarder for RecordingForwarder {
    fn forward_create_validator(&mut self, msg: &MsgCreateValidator) -> AnyResult<()> {
        self.forwarded.push(msg.moniker.clone());
        Ok(())
    }
}

pub fn test_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

pub fn temp_db_path(suffix: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "checkpointing_e2e_test-{}-{}.redb",
        suffix,
        rand::random::<u64>()
    ));
    p.to_string_lossy().to_string()
}

pub type TestKeeper = CheckpointingKeeper<StaticValSetSource, RecordingForwarder>;

/// A keeper over a throwaway store, with every network validator's BLS key
/// registered through genesis.
pub fn test_keeper(network: &TestNetwork, suffix: &str) -> (TestKeeper, String) {
    let path = temp_db_path(suffix);
    let store = CheckpointStore::open(&path).expect("open store");
    let source = StaticValSetSource {
        bonded: network
            .validators
            .iter()
            .map(|v| (v.addr, v.power))
            .collect(),
    };
    let mut keeper = CheckpointingKeeper::new(
        store,
        MultiHooks::new(),
        source,
        RecordingForwarder::default(),
        network.params,
        test_logger(),
    );
    keeper
        .init_genesis(&network.genesis_keys())
        .expect("genesis keys");
    (keeper, path)
}
