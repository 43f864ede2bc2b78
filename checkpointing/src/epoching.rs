//! Epoch arithmetic.
//!
//! An epoch is a fixed-interval run of consecutive blocks sharing one
//! validator set and one BLS-key snapshot. Height 0 is the genesis block and
//! forms epoch 0 on its own; epoch 0 has no checkpoint and is finalized at
//! genesis. Every later epoch `e` covers heights
//! `[(e-1)*interval + 1, e*interval]`.

use std::path::Path;

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

/// Epoch number. Epoch 0 is genesis.
pub type EpochNum = u64;

/// Epoching parameters shared by every node in a network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochingParams {
    /// Number of blocks per epoch. Must be at least 1.
    pub epoch_interval: u64,
}

impl EpochingParams {
    pub fn new(epoch_interval: u64) -> Self {
        assert!(epoch_interval >= 1, "epoch interval must be at least 1");
        Self { epoch_interval }
    }

    /// Loads parameters from a TOML/YAML file, with `KEEL_` environment
    /// variable overrides.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut figment = Figment::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            figment = match ext {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(anyhow::anyhow!(
                        "Unsupported config file format: {}. Use .toml, .yaml, or .yml",
                        ext
                    ));
                }
            };
        }
        figment = figment.merge(Env::prefixed("KEEL_").split("__"));

        let params: EpochingParams = figment.extract()?;
        Ok(params)
    }

    /// The epoch that owns block height `height`.
    pub fn epoch_of_height(&self, height: u64) -> EpochNum {
        if height == 0 {
            return 0;
        }
        (height - 1) / self.epoch_interval + 1
    }

    /// First block height of epoch `epoch` (≥ 1).
    pub fn first_block_height(&self, epoch: EpochNum) -> u64 {
        assert!(epoch >= 1, "epoch 0 is the genesis block");
        (epoch - 1) * self.epoch_interval + 1
    }

    /// Last block height of epoch `epoch` (≥ 1).
    pub fn last_block_height(&self, epoch: EpochNum) -> u64 {
        assert!(epoch >= 1, "epoch 0 is the genesis block");
        epoch * self.epoch_interval
    }

    pub fn is_first_block_of_epoch(&self, height: u64) -> bool {
        height >= 1 && (height - 1) % self.epoch_interval == 0
    }

    pub fn is_last_block_of_epoch(&self, height: u64) -> bool {
        height >= 1 && height % self.epoch_interval == 0
    }
}

impl Default for EpochingParams {
    fn default() -> Self {
        Self {
            epoch_interval: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_epoch_zero() {
        let params = EpochingParams::new(10);
        assert_eq!(params.epoch_of_height(0), 0);
        assert_eq!(params.epoch_of_height(1), 1);
    }

    #[test]
    fn epoch_boundaries() {
        let params = EpochingParams::new(10);

        assert_eq!(params.first_block_height(1), 1);
        assert_eq!(params.last_block_height(1), 10);
        assert_eq!(params.first_block_height(2), 11);
        assert_eq!(params.last_block_height(2), 20);

        assert!(params.is_first_block_of_epoch(1));
        assert!(params.is_last_block_of_epoch(10));
        assert!(params.is_first_block_of_epoch(11));
        assert!(!params.is_first_block_of_epoch(10));
        assert!(!params.is_last_block_of_epoch(11));
        assert!(!params.is_first_block_of_epoch(0));
        assert!(!params.is_last_block_of_epoch(0));
    }

    #[test]
    fn every_height_maps_into_its_boundaries() {
        let params = EpochingParams::new(7);
        for height in 1..200u64 {
            let epoch = params.epoch_of_height(height);
            assert!(height >= params.first_block_height(epoch));
            assert!(height <= params.last_block_height(epoch));
        }
    }

    #[test]
    fn interval_of_one_makes_every_block_a_boundary() {
        let params = EpochingParams::new(1);
        for height in 1..20u64 {
            assert!(params.is_first_block_of_epoch(height));
            assert!(params.is_last_block_of_epoch(height));
            assert_eq!(params.epoch_of_height(height), height);
        }
    }
}
