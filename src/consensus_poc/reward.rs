//! Block rewards
//!
//! The subsidy is a pure step function of height: it starts at the
//! configured initial amount and shrinks 5% per reward epoch ("month" of
//! blocks), hitting zero at the schedule end. Genesis pays nothing. The
//! generator additionally collects the block's whole fee total. Everything
//! is replayable from chain history alone; there is no hidden state.

use crate::block::Block;
use crate::config::{ConsensusConfig, ONE_COIN};

/// Subsidy in planck for a block at `height`.
///
/// The 5% step is applied by iterated floor multiplication
/// (`r = r * 95 / 100` once per elapsed epoch), which every node reproduces
/// bit-identically without big-integer support.
pub fn block_subsidy(height: u64, config: &ConsensusConfig) -> u64 {
    if height == 0 || height >= config.subsidy_end_height {
        return 0;
    }
    let epochs = height / config.blocks_per_reward_epoch;
    let mut reward = config.initial_subsidy_coins.saturating_mul(ONE_COIN);
    for _ in 0..epochs {
        reward = reward / 100 * 95;
    }
    reward
}

/// Everything payable to the block's generator: subsidy plus collected fees.
pub fn block_reward(block: &Block, config: &ConsensusConfig) -> u64 {
    block_subsidy(block.height, config).saturating_add(block.total_fee_planck)
}
