//! Adaptive base-target adjustment
//!
//! The base target tracks the configured block interval: blocks arriving
//! faster than the interval shrink it (harder), slower blocks grow it
//! (easier). Two rules exist, selected by the smoothed-difficulty fork:
//! a single-step rule over the previous block, and a windowed rule that
//! averages the trailing base targets to resist single-block shocks.
//!
//! Determinism rules everything here: u128 integer arithmetic, floor
//! division, no floats. Given identical inputs every node must compute the
//! bit-identical target.
//!
//! Per-block movement is clamped to [-20%, +20%] of the previous target and
//! the result is floored at 1 and ceilinged at the configured maximum, so a
//! timestamp outlier can never push the network into an unrecoverable
//! all-zero or unbounded target.

use crate::block::Block;
use crate::config::ConsensusConfig;
use crate::fork::ForkSchedule;

/// Heights below this always use the initial base target (bootstrap ramp:
/// there is not enough history to measure an interval worth trusting).
const BOOTSTRAP_HEIGHT: u64 = 4;

/// Compute the base target a block at `timestamp` must declare when linking
/// onto `previous`.
///
/// `recent` is the trailing slice of the canonical chain ending with
/// `previous` (at most the averaging window is consumed); the windowed rule
/// falls back to the single-step rule while fewer than two blocks exist.
pub fn calculate_base_target(
    timestamp: u64,
    previous: &Block,
    recent: &[Block],
    forks: &ForkSchedule,
    config: &ConsensusConfig,
) -> u64 {
    let height = previous.height + 1;
    if height < BOOTSTRAP_HEIGHT {
        return config.initial_base_target;
    }

    let prev_target = previous.base_target as u128;
    let interval = config.block_interval_secs as u128;

    let raw = if forks.smoothed_difficulty.is_active(height) && recent.len() >= 2 {
        let n = recent.len().min(config.averaging_window as usize);
        let window = &recent[recent.len() - n..];
        let avg_target =
            window.iter().map(|b| b.base_target as u128).sum::<u128>() / n as u128;
        let span = n as u128 * interval;
        let elapsed =
            (timestamp.saturating_sub(window[0].timestamp) as u128).clamp(span / 2, span * 2);
        avg_target * elapsed / span
    } else {
        let elapsed = (timestamp.saturating_sub(previous.timestamp) as u128)
            .clamp(interval / 2, interval * 2);
        prev_target * elapsed / interval
    };

    // Per-block clamp, then the global floor/ceiling.
    let ceiling = (prev_target * 12 / 10).min(config.max_base_target as u128).max(1);
    let floor = (prev_target * 8 / 10).max(1).min(ceiling);
    raw.clamp(floor, ceiling) as u64
}
