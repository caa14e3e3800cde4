//! Chain state and linkage
//!
//! `Chain` holds the canonical chain in memory and mirrors every accepted
//! block into sled under big-endian height keys, so a restarted node reloads
//! and relinks its history without the network. Fork candidates are verified
//! against read snapshots of this state; only `accept::apply` mutates it.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use sled::Db;
use tracing::info;

use crate::block::Block;
use crate::config::ConsensusConfig;
use crate::fork::ForkSchedule;
use crate::genesis;

pub mod accept;

const BLOCK_KEY_PREFIX: &str = "blk:";

fn block_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_KEY_PREFIX.len() + 8);
    key.extend_from_slice(BLOCK_KEY_PREFIX.as_bytes());
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Wire a block to its parent: height, cumulative difficulty. Passing `None`
/// links to nothing — that is genesis, explicitly. Pure bookkeeping; no
/// validation happens here.
pub fn set_previous(block: &mut Block, previous: Option<&Block>) {
    match previous {
        Some(parent) => {
            block.height = parent.height + 1;
            block.cumulative_difficulty =
                parent.cumulative_difficulty + block_difficulty(block.base_target);
        }
        None => {
            block.height = 0;
            block.cumulative_difficulty = 0;
        }
    }
}

/// Difficulty contribution of a single block: 2^64 / base target. A larger
/// (easier) target contributes less weight to fork choice.
pub fn block_difficulty(base_target: u64) -> u128 {
    (1u128 << 64) / u128::from(base_target.max(1))
}

pub struct Chain {
    db: Db,
    blocks: Vec<Block>,
    seen_ids: HashSet<u64>,
}

impl Chain {
    /// Load the persisted chain, or install genesis into an empty store.
    /// Relinks every block and refuses to start on gaps or broken lineage.
    pub fn bootstrap(db: Db, config: &ConsensusConfig, forks: &ForkSchedule) -> Result<Self> {
        let mut blocks: Vec<Block> = Vec::new();
        for entry in db.scan_prefix(BLOCK_KEY_PREFIX.as_bytes()) {
            let (_, raw) = entry.context("failed to scan block store")?;
            let block: Block =
                serde_json::from_slice(&raw).context("failed to decode stored block")?;
            blocks.push(block);
        }

        let mut chain = Self { db, blocks: Vec::new(), seen_ids: HashSet::new() };

        if blocks.is_empty() {
            let genesis = genesis::genesis_block(config, forks);
            info!(genesis_id = format_args!("{:#018x}", genesis.id()), "installing genesis");
            chain.persist(&genesis)?;
            chain.seen_ids.insert(genesis.id());
            chain.blocks.push(genesis);
            return Ok(chain);
        }

        // Keys are big-endian heights, so the scan already yielded height
        // order; relink and verify lineage as we go.
        for (expected_height, mut block) in blocks.into_iter().enumerate() {
            let previous = chain.blocks.last();
            if let Some(parent) = previous {
                if block.previous_block_id != parent.id() {
                    bail!(
                        "broken lineage at height {}: parent id mismatch",
                        expected_height
                    );
                }
            }
            set_previous(&mut block, previous);
            if block.height != expected_height as u64 {
                bail!("gap in block store at height {}", expected_height);
            }
            chain.seen_ids.insert(block.id());
            chain.blocks.push(block);
        }

        genesis::verify_genesis(&chain.blocks[0], config, forks)?;
        info!(height = chain.height(), "chain loaded");
        Ok(chain)
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always holds genesis")
    }

    pub fn height(&self) -> u64 {
        self.tip().height
    }

    pub fn cumulative_difficulty(&self) -> u128 {
        self.tip().cumulative_difficulty
    }

    pub fn contains(&self, id: u64) -> bool {
        self.seen_ids.contains(&id)
    }

    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.blocks.get(height as usize)
    }

    /// Trailing `n` blocks of the canonical chain, oldest first, ending with
    /// the tip. Input to the windowed difficulty rule.
    pub fn recent_window(&self, n: usize) -> &[Block] {
        let start = self.blocks.len().saturating_sub(n);
        &self.blocks[start..]
    }

    /// Append an already-verified, already-linked block and persist it.
    /// Callers hold the write lock; see `accept::apply`.
    pub(crate) fn commit(&mut self, block: Block) -> Result<(), sled::Error> {
        self.persist(&block)?;
        self.seen_ids.insert(block.id());
        self.blocks.push(block);
        Ok(())
    }

    fn persist(&self, block: &Block) -> Result<(), sled::Error> {
        let encoded = serde_json::to_vec(block).expect("block serialization is infallible");
        self.db.insert(block_key(block.height), encoded)?;
        self.db.flush()?;
        Ok(())
    }
}
