//! Checkpoint lifecycle hooks exposed to collaborating modules.
//!
//! Hooks are fire-and-observe: the keeper invokes them after the
//! corresponding state change has been persisted, logs any error, and never
//! propagates it into consensus.

use anyhow::Result;

use crate::epoching::EpochNum;
use crate::state::address::ValidatorAddress;
use crate::state::checkpoint::RawCheckpoint;

/// Callbacks observed by collaborating modules (reward distribution, the
/// epoching module, monitoring). Every method defaults to a no-op.
pub trait CheckpointingHooks {
    fn after_bls_key_registered(&self, _val_addr: &ValidatorAddress) -> Result<()> {
        Ok(())
    }

    fn after_raw_checkpoint_sealed(&self, _epoch: EpochNum) -> Result<()> {
        Ok(())
    }

    fn after_raw_checkpoint_confirmed(&self, _epoch: EpochNum) -> Result<()> {
        Ok(())
    }

    fn after_raw_checkpoint_finalized(&self, _epoch: EpochNum) -> Result<()> {
        Ok(())
    }

    fn after_raw_checkpoint_forgotten(&self, _ckpt: &RawCheckpoint) -> Result<()> {
        Ok(())
    }

    fn after_raw_checkpoint_bls_sig_verified(&self, _ckpt: &RawCheckpoint) -> Result<()> {
        Ok(())
    }
}

/// An ordered collection of hooks, dispatched in registration order.
/// Dispatch stops at the first error and propagates it; the keeper treats a
/// propagated error as observational and logs it.
#[derive(Default)]
pub struct MultiHooks {
    hooks: Vec<Box<dyn CheckpointingHooks + Send + Sync>>,
}

impl MultiHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Box<dyn CheckpointingHooks + Send + Sync>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl CheckpointingHooks for MultiHooks {
    fn after_bls_key_registered(&self, val_addr: &ValidatorAddress) -> Result<()> {
        for hook in &self.hooks {
            hook.after_bls_key_registered(val_addr)?;
        }
        Ok(())
    }

    fn after_raw_checkpoint_sealed(&self, epoch: EpochNum) -> Result<()> {
        for hook in &self.hooks {
            hook.after_raw_checkpoint_sealed(epoch)?;
        }
        Ok(())
    }

    fn after_raw_checkpoint_confirmed(&self, epoch: EpochNum) -> Result<()> {
        for hook in &self.hooks {
            hook.after_raw_checkpoint_confirmed(epoch)?;
        }
        Ok(())
    }

    fn after_raw_checkpoint_finalized(&self, epoch: EpochNum) -> Result<()> {
        for hook in &self.hooks {
            hook.after_raw_checkpoint_finalized(epoch)?;
        }
        Ok(())
    }

    fn after_raw_checkpoint_forgotten(&self, ckpt: &RawCheckpoint) -> Result<()> {
        for hook in &self.hooks {
            hook.after_raw_checkpoint_forgotten(ckpt)?;
        }
        Ok(())
    }

    fn after_raw_checkpoint_bls_sig_verified(&self, ckpt: &RawCheckpoint) -> Result<()> {
        for hook in &self.hooks {
            hook.after_raw_checkpoint_bls_sig_verified(ckpt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CheckpointingHooks for Counting {
        fn after_raw_checkpoint_sealed(&self, _epoch: EpochNum) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow::anyhow!("hook failed"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn dispatch_runs_in_registration_order_and_stops_on_error() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));

        let mut hooks = MultiHooks::new();
        hooks.push(Box::new(Counting {
            calls: first.clone(),
            fail: false,
        }));
        hooks.push(Box::new(Counting {
            calls: second.clone(),
            fail: true,
        }));
        hooks.push(Box::new(Counting {
            calls: third.clone(),
            fail: false,
        }));

        let result = hooks.after_raw_checkpoint_sealed(1);
        assert!(result.is_err());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Noop;
        impl CheckpointingHooks for Noop {}

        let mut hooks = MultiHooks::new();
        hooks.push(Box::new(Noop));
        assert!(hooks.after_bls_key_registered(&ValidatorAddress::from_bytes([0u8; 20])).is_ok());
        assert!(hooks.after_raw_checkpoint_finalized(3).is_ok());
    }
}
