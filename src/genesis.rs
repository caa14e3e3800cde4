//! Genesis block construction and startup self-check
//!
//! The genesis block is fully determined by the consensus config: zero
//! lineage fields, the initial base target and an unsigned all-zero
//! signature. Its id is derived, never fetched from a peer; a node whose
//! computed genesis disagrees with its stored chain must refuse to start
//! rather than silently adopt someone else's history.

use anyhow::{bail, Result};

use crate::block::Block;
use crate::chain::set_previous;
use crate::config::ConsensusConfig;
use crate::fork::ForkSchedule;

/// Build the genesis block. Deterministic: every call yields the same block
/// and therefore the same id on every conforming node.
pub fn genesis_block(config: &ConsensusConfig, forks: &ForkSchedule) -> Block {
    let mut block = Block::new(
        forks.block_version.value_at(0),
        0,
        0,
        [0u8; 32],
        [0u8; 32],
        [0u8; 32],
        0,
        config.initial_base_target,
        vec![],
    );
    set_previous(&mut block, None);
    block
}

/// Id every conforming node derives for genesis under `config`.
pub fn genesis_id(config: &ConsensusConfig, forks: &ForkSchedule) -> u64 {
    genesis_block(config, forks).id()
}

/// Startup self-check: the chain's stored genesis must be the one this
/// node's constants produce. A mismatch means the data directory belongs to
/// a different network (or was tampered with) and startup must abort.
pub fn verify_genesis(stored: &Block, config: &ConsensusConfig, forks: &ForkSchedule) -> Result<()> {
    let expected = genesis_id(config, forks);
    if stored.id() != expected {
        bail!(
            "genesis mismatch: chain has {:#018x}, this network derives {:#018x}",
            stored.id(),
            expected
        );
    }
    if stored.height != 0 || !stored.is_genesis() {
        bail!("stored genesis is not linked at height 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let config = ConsensusConfig::default();
        let forks = ForkSchedule::default();
        assert_eq!(genesis_id(&config, &forks), genesis_id(&config, &forks));
    }

    #[test]
    fn test_genesis_links_at_height_zero() {
        let config = ConsensusConfig::default();
        let forks = ForkSchedule::default();
        let genesis = genesis_block(&config, &forks);

        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.cumulative_difficulty, 0);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.base_target, config.initial_base_target);
        assert!(verify_genesis(&genesis, &config, &forks).is_ok());
    }

    #[test]
    fn test_foreign_genesis_is_rejected() {
        let config = ConsensusConfig::default();
        let forks = ForkSchedule::default();
        let mut foreign = genesis_block(&config, &forks);
        foreign.nonce = 1;

        assert!(verify_genesis(&foreign, &config, &forks).is_err());
    }
}
