//! Consensus parameters for the Strata chain
//!
//! All values here are network constants: every node must run with the same
//! set or the chain forks. Env overrides (`STRATA_*`) exist for private test
//! networks only.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

/// Smallest indivisible unit of the native coin.
pub const ONE_COIN: u64 = 100_000_000;

/// Consensus-critical chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Unix time of the genesis block. Block timestamps count seconds from
    /// this instant.
    pub genesis_unix_time: u64,

    /// Target seconds between blocks.
    pub block_interval_secs: u64,

    /// Number of trailing blocks averaged by the smoothed base-target rule.
    pub averaging_window: u64,

    /// Base target of the genesis block (easiest the network ever gets).
    pub initial_base_target: u64,

    /// Ceiling for any computed base target. Equal to the initial target:
    /// difficulty never drops below the genesis difficulty.
    pub max_base_target: u64,

    /// Reject blocks stamped more than this many seconds ahead of local time.
    pub max_timestamp_drift_secs: u64,

    /// Hard cap on transactions per block.
    pub max_transactions_per_block: usize,

    /// Blocks per subsidy step ("month" of the reward schedule).
    pub blocks_per_reward_epoch: u64,

    /// First height with zero subsidy.
    pub subsidy_end_height: u64,

    /// Subsidy of the first reward epoch, in whole coins.
    pub initial_subsidy_coins: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            genesis_unix_time: 1_735_689_600, // 2025-01-01T00:00:00Z
            block_interval_secs: 240,
            averaging_window: 24,
            initial_base_target: 18_325_193_796,
            max_base_target: 18_325_193_796,
            max_timestamp_drift_secs: 15,
            max_transactions_per_block: 255,
            blocks_per_reward_epoch: 10_800,
            subsidy_end_height: 1_944_000,
            initial_subsidy_coins: 10_000,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

impl ConsensusConfig {
    /// Build the config from defaults with `STRATA_*` env overrides applied.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            genesis_unix_time: env_u64("STRATA_GENESIS_UNIX_TIME", d.genesis_unix_time),
            block_interval_secs: env_u64("STRATA_BLOCK_INTERVAL_SECS", d.block_interval_secs),
            averaging_window: env_u64("STRATA_AVERAGING_WINDOW", d.averaging_window),
            initial_base_target: env_u64("STRATA_INITIAL_BASE_TARGET", d.initial_base_target),
            max_base_target: env_u64("STRATA_MAX_BASE_TARGET", d.max_base_target),
            max_timestamp_drift_secs: env_u64(
                "STRATA_MAX_TIMESTAMP_DRIFT_SECS",
                d.max_timestamp_drift_secs,
            ),
            ..d
        }
    }

    /// Current time in seconds since the genesis epoch. Saturates at zero
    /// before genesis (misconfigured clock).
    pub fn epoch_time_now(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(self.genesis_unix_time)
    }
}
