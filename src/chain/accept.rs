//! Block acceptance — the single admission pipeline
//!
//! Every candidate block, whatever its source, goes through `pre_verify`
//! and then `apply`. Verification runs against an immutable snapshot of the
//! current tip and may proceed concurrently for independent candidates;
//! `apply` serializes on the chain write lock. The pipeline order is fixed:
//! structure, block signature, linkage, base target, generation signature,
//! capacity proof. The first failed check names itself in the error.
//!
//! Cooperative cancellation is observed at the boundary before each stage:
//! a triggered interrupt unwinds with `VerifyError::Interrupted`, which is
//! the only retryable outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::block::{payload_hash, payload_length, Block, ScoopData};
use crate::chain::{set_previous, Chain};
use crate::config::ConsensusConfig;
use crate::consensus_poc::generation;
use crate::consensus_poc::reward::block_reward;
use crate::consensus_poc::scoop::scoop_index;
use crate::consensus_poc::{calculate_base_target, deadline, generation_hit};
use crate::errors::{ApplyError, ConsensusError, Interrupted, MalformedBlock, VerifyError};
use crate::fork::ForkSchedule;
use crate::listener::{BlockEvent, ListenerRegistry};

/// Cooperative cancellation handle. Cloneable; triggering any clone
/// interrupts verifications holding another.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), Interrupted> {
        if self.is_triggered() {
            Err(Interrupted { stage })
        } else {
            Ok(())
        }
    }
}

/// Proof that `pre_verify` accepted a block against a specific parent.
/// Only `pre_verify` constructs one and `apply` consumes it, so a block can
/// never be applied unverified or applied twice.
#[derive(Debug)]
pub struct VerifiedBlock {
    block: Block,
    parent_id: u64,
}

impl VerifiedBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Surrender the block, e.g. to hand it back through the reduced
    /// verification path later (the recorded capacity hit travels with it).
    pub fn into_block(self) -> Block {
        self.block
    }
}

pub struct BlockEngine {
    chain: Arc<RwLock<Chain>>,
    config: ConsensusConfig,
    forks: ForkSchedule,
    listeners: ListenerRegistry,
}

impl BlockEngine {
    pub fn new(chain: Arc<RwLock<Chain>>, config: ConsensusConfig, forks: ForkSchedule) -> Self {
        Self { chain, config, forks, listeners: ListenerRegistry::new() }
    }

    pub fn chain(&self) -> &Arc<RwLock<Chain>> {
        &self.chain
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Run the full admission pipeline against the current tip.
    ///
    /// With `scoop_data` the capacity proof is recomputed from the supplied
    /// plot bytes and the resulting hit recorded on the block; without it
    /// the previously recorded hit is re-checked (the reduced path).
    pub fn pre_verify(
        &self,
        block: Block,
        scoop_data: Option<&ScoopData>,
        interrupt: &Interrupt,
    ) -> Result<VerifiedBlock, VerifyError> {
        self.pre_verify_at(block, scoop_data, interrupt, self.config.epoch_time_now())
    }

    /// `pre_verify` with an explicit "now" (seconds since genesis epoch).
    pub fn pre_verify_at(
        &self,
        mut block: Block,
        scoop_data: Option<&ScoopData>,
        interrupt: &Interrupt,
        now: u64,
    ) -> Result<VerifiedBlock, VerifyError> {
        interrupt.checkpoint("start")?;

        // Immutable snapshot of the parent and the difficulty window. The
        // read lock is dropped before any heavy work.
        let (previous, recent, duplicate) = {
            let chain = self.chain.read();
            (
                chain.tip().clone(),
                chain.recent_window(self.config.averaging_window as usize).to_vec(),
                chain.contains(block.id()),
            )
        };
        let height = previous.height + 1;

        self.check_structure(&block, height)?;

        interrupt.checkpoint("block signature")?;
        if !block.verify_signature()? {
            warn!(height, "rejected: bad block signature");
            return Err(ConsensusError::BadBlockSignature { height }.into());
        }

        interrupt.checkpoint("linkage")?;
        self.check_linkage(&block, &previous, duplicate, now)?;
        set_previous(&mut block, Some(&previous));

        interrupt.checkpoint("base target")?;
        let computed =
            calculate_base_target(block.timestamp, &previous, &recent, &self.forks, &self.config);
        if block.base_target != computed {
            warn!(
                height,
                declared = block.base_target,
                computed,
                "rejected: base target mismatch"
            );
            return Err(ConsensusError::BaseTargetMismatch {
                declared: block.base_target,
                computed,
            }
            .into());
        }

        interrupt.checkpoint("generation signature")?;
        if !generation::verify_generation_signature(&block, &previous) {
            warn!(height, "rejected: bad generation signature");
            return Err(ConsensusError::BadGenerationSignature { height }.into());
        }

        interrupt.checkpoint("capacity proof")?;
        self.check_capacity_proof(&mut block, &previous, scoop_data)?;

        debug!(
            height,
            block_id = format_args!("{:#018x}", block.id()),
            "block pre-verified"
        );
        Ok(VerifiedBlock { parent_id: previous.id(), block })
    }

    /// Link an accepted block into the chain. Single writer: the tip
    /// mutation lock is held for the whole commit. Listeners fire
    /// `BeforeBlockAccept` under the lock and `BlockPushed` after commit.
    pub fn apply(&self, verified: VerifiedBlock) -> Result<u64, ApplyError> {
        let VerifiedBlock { block, parent_id } = verified;
        let committed = {
            let mut chain = self.chain.write();

            let tip_id = chain.tip().id();
            if tip_id != parent_id {
                warn!(
                    expected = format_args!("{:#018x}", parent_id),
                    tip = format_args!("{:#018x}", tip_id),
                    "apply refused: chain tip moved since verification"
                );
                return Err(ApplyError::TipMoved { expected: parent_id, tip: tip_id });
            }
            if chain.contains(block.id()) {
                return Err(ApplyError::AlreadyApplied { id: block.id() });
            }

            self.listeners.notify(BlockEvent::BeforeBlockAccept, &block);

            let reward = block_reward(&block, &self.config);
            info!(
                height = block.height,
                block_id = format_args!("{:#018x}", block.id()),
                generator = %hex::encode(block.generator_public_key),
                reward_planck = reward,
                cumulative_difficulty = %block.cumulative_difficulty,
                "block applied; head updated"
            );

            let committed = block.clone();
            chain.commit(block)?;
            committed
        };

        self.listeners.notify(BlockEvent::BlockPushed, &committed);
        Ok(committed.height)
    }

    fn check_structure(&self, block: &Block, height: u64) -> Result<(), VerifyError> {
        if block.transactions.len() > self.config.max_transactions_per_block {
            return Err(MalformedBlock::TooManyTransactions {
                count: block.transactions.len(),
                max: self.config.max_transactions_per_block,
            }
            .into());
        }

        let actual_length = payload_length(&block.transactions);
        if block.payload_length != actual_length {
            return Err(MalformedBlock::PayloadLengthMismatch {
                declared: block.payload_length,
                actual: actual_length,
            }
            .into());
        }

        let max_length = self.forks.max_payload_length.value_at(height);
        if block.payload_length > max_length {
            return Err(MalformedBlock::PayloadTooLarge {
                length: block.payload_length,
                max: max_length,
            }
            .into());
        }

        let mut last_id = 0u64;
        for tx in &block.transactions {
            if tx.id == 0 || tx.id <= last_id {
                return Err(MalformedBlock::TransactionsNotSorted.into());
            }
            last_id = tx.id;
        }

        if payload_hash(&block.transactions) != block.payload_hash {
            warn!(height, "rejected: payload hash mismatch");
            return Err(ConsensusError::PayloadHashMismatch { height }.into());
        }

        let fee_sum = block
            .transactions
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee_planck));
        if fee_sum > block.total_fee_planck {
            return Err(ConsensusError::FeeTotalMismatch {
                declared: block.total_fee_planck,
                actual: fee_sum,
            }
            .into());
        }

        Ok(())
    }

    fn check_linkage(
        &self,
        block: &Block,
        previous: &Block,
        duplicate: bool,
        now: u64,
    ) -> Result<(), VerifyError> {
        let height = previous.height + 1;

        if block.previous_block_id != previous.id() {
            warn!(
                height,
                declared = format_args!("{:#018x}", block.previous_block_id),
                tip = format_args!("{:#018x}", previous.id()),
                "rejected: previous block mismatch"
            );
            return Err(ConsensusError::PreviousBlockMismatch {
                declared: block.previous_block_id,
                tip: previous.id(),
            }
            .into());
        }

        if block.previous_block_hash != previous.hash() {
            return Err(ConsensusError::PreviousHashMismatch.into());
        }

        let expected_version = self.forks.block_version.value_at(height);
        if block.version != expected_version {
            return Err(ConsensusError::InvalidVersion { version: block.version, height }.into());
        }

        if block.timestamp <= previous.timestamp
            || block.timestamp > now + self.config.max_timestamp_drift_secs
        {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp: block.timestamp,
                previous: previous.timestamp,
                now,
            }
            .into());
        }

        if block.id() == 0 || duplicate {
            return Err(ConsensusError::DuplicateBlock { height }.into());
        }

        Ok(())
    }

    /// Two-tier capacity check. Full tier: recompute the hit from supplied
    /// scoop bytes and record it. Reduced tier: re-check a hit recorded by
    /// an earlier full pass. Either way the claimed deadline must actually
    /// have elapsed relative to the parent, measured against the parent's
    /// base target.
    fn check_capacity_proof(
        &self,
        block: &mut Block,
        previous: &Block,
        scoop_data: Option<&ScoopData>,
    ) -> Result<(), VerifyError> {
        let hit = match scoop_data {
            Some(data) => {
                let index = scoop_index(block.height, &block.generation_signature);
                debug!(height = block.height, scoop = index, "full capacity verification");
                let hit = generation_hit(&block.generation_signature, data, block.nonce);
                block.poc_hit = Some(hit);
                hit
            }
            None => block.poc_hit.ok_or(ConsensusError::MissingCapacityProof)?,
        };

        let elapsed = block.timestamp - previous.timestamp;
        let deadline = deadline(hit, previous.base_target);
        if elapsed <= deadline {
            warn!(height = block.height, elapsed, deadline, "rejected: deadline not reached");
            return Err(ConsensusError::DeadlineNotReached { elapsed, deadline }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    /// Config with a maximally easy base target so arbitrary scoop bytes
    /// meet their deadline after one second.
    fn easy_config() -> ConsensusConfig {
        ConsensusConfig {
            initial_base_target: u64::MAX,
            max_base_target: u64::MAX,
            ..ConsensusConfig::default()
        }
    }

    fn engine_with(config: ConsensusConfig) -> (tempfile::TempDir, BlockEngine) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("chain")).unwrap();
        let forks = ForkSchedule::default();
        let chain = Chain::bootstrap(db, &config, &forks).unwrap();
        (dir, BlockEngine::new(Arc::new(RwLock::new(chain)), config, forks))
    }

    fn forge_next(engine: &BlockEngine, key: &SigningKey, elapsed: u64) -> Block {
        let chain = engine.chain().read();
        let previous = chain.tip().clone();
        let recent = chain.recent_window(engine.config.averaging_window as usize).to_vec();
        drop(chain);

        let generator = key.verifying_key().to_bytes();
        let generation_signature = generation::derive_generation_signature(
            &previous.generation_signature,
            &generator,
        );
        let timestamp = previous.timestamp + elapsed;
        let base_target = calculate_base_target(
            timestamp,
            &previous,
            &recent,
            &engine.forks,
            &engine.config,
        );
        let mut block = Block::new(
            engine.forks.block_version.value_at(previous.height + 1),
            timestamp,
            previous.id(),
            previous.hash(),
            generator,
            generation_signature,
            7,
            base_target,
            vec![],
        );
        block.sign(key);
        block
    }

    fn now_for(block: &Block) -> u64 {
        block.timestamp
    }

    #[test]
    fn test_accept_and_apply_extends_tip() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);
        let now = now_for(&block);
        let id = block.id();

        let verified = engine
            .pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now)
            .unwrap();
        assert_eq!(verified.block().height, 1);
        assert!(verified.block().poc_hit.is_some());

        let height = engine.apply(verified).unwrap();
        assert_eq!(height, 1);

        let chain = engine.chain().read();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip().id(), id);
        assert!(chain.cumulative_difficulty() > 0);
    }

    #[test]
    fn test_genesis_is_never_reverified() {
        // Genesis is installed by bootstrap, never pushed: resubmitting it
        // must fail finally (unsigned, null lineage), whichever check trips.
        let (_dir, engine) = engine_with(easy_config());
        let genesis = genesis::genesis_block(&engine.config, &engine.forks);
        let now = 240;

        match engine.pre_verify_at(genesis, None, &Interrupt::new(), now) {
            Err(err) => assert!(!err.is_retryable()),
            Ok(_) => panic!("genesis resubmission must be rejected"),
        }
        assert_eq!(engine.chain().read().height(), 0);
    }

    #[test]
    fn test_reduced_tier_uses_recorded_hit() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);
        let now = now_for(&block);

        // No scoop data and no recorded hit: the reduced path must refuse.
        let bare = engine.pre_verify_at(block.clone(), None, &Interrupt::new(), now);
        assert!(matches!(
            bare,
            Err(VerifyError::NotAccepted(ConsensusError::MissingCapacityProof))
        ));

        // A full pass records the hit; the reduced path then succeeds.
        let verified = engine
            .pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now)
            .unwrap();
        let carried = verified.into_block();
        let reverified = engine.pre_verify_at(carried, None, &Interrupt::new(), now).unwrap();
        engine.apply(reverified).unwrap();
    }

    #[test]
    fn test_deadline_not_reached_is_rejected() {
        // Hardest possible target: deadlines are astronomically long.
        let config = ConsensusConfig {
            initial_base_target: 1,
            max_base_target: 1,
            ..ConsensusConfig::default()
        };
        let (_dir, engine) = engine_with(config);
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);
        let now = now_for(&block);

        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::DeadlineNotReached { .. }))
        ));
    }

    #[test]
    fn test_base_target_off_by_one_is_rejected() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let mut block = forge_next(&engine, &key, 240);
        block.base_target -= 1;
        block.sign(&key);
        let now = now_for(&block);

        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::BaseTargetMismatch { .. }))
        ));
    }

    #[test]
    fn test_wrong_parent_is_rejected() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let mut block = forge_next(&engine, &key, 240);
        block.previous_block_id ^= 0xdead_beef;
        block.sign(&key);
        let now = now_for(&block);

        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::PreviousBlockMismatch { .. }))
        ));
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let mut block = forge_next(&engine, &key, 240);
        block.block_signature[0] ^= 0x01;
        let now = now_for(&block);

        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::BadBlockSignature { .. }))
        ));
    }

    #[test]
    fn test_tampered_generation_signature_is_rejected() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let mut block = forge_next(&engine, &key, 240);
        block.generation_signature[5] ^= 0x01;
        block.sign(&key);
        let now = now_for(&block);

        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::BadGenerationSignature { .. }))
        ));
    }

    #[test]
    fn test_future_timestamp_is_rejected() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);

        // Local clock sits well before the block's stamp.
        let result =
            engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), 0);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::InvalidTimestamp { .. }))
        ));
    }

    #[test]
    fn test_interrupt_unwinds_as_retryable() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);
        let now = now_for(&block);

        let interrupt = Interrupt::new();
        interrupt.trigger();
        let result = engine.pre_verify_at(block, Some(&ScoopData([1u8; 64])), &interrupt, now);
        match result {
            Err(err @ VerifyError::Interrupted(_)) => assert!(err.is_retryable()),
            other => panic!("expected interruption, got {other:?}"),
        }

        // The same candidate goes through once the interrupt is withdrawn.
        let block = forge_next(&engine, &key, 240);
        let verified = engine
            .pre_verify_at(block, Some(&ScoopData([1u8; 64])), &Interrupt::new(), now)
            .unwrap();
        engine.apply(verified).unwrap();
    }

    #[test]
    fn test_apply_is_once_only() {
        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let block = forge_next(&engine, &key, 240);
        let now = now_for(&block);
        let scoop = ScoopData([1u8; 64]);

        // Two concurrent verifications of the same candidate both pass...
        let first = engine
            .pre_verify_at(block.clone(), Some(&scoop), &Interrupt::new(), now)
            .unwrap();
        let second = engine
            .pre_verify_at(block.clone(), Some(&scoop), &Interrupt::new(), now)
            .unwrap();

        // ...but only one commit wins; the loser's snapshot is stale.
        engine.apply(first).unwrap();
        assert!(matches!(engine.apply(second), Err(ApplyError::TipMoved { .. })));

        // Re-verifying the already-linked block is a duplicate, so a third
        // apply cannot even be reached.
        let result = engine.pre_verify_at(block, Some(&scoop), &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::DuplicateBlock { .. }))
        ));
        assert_eq!(engine.chain().read().height(), 1);
    }

    #[test]
    fn test_payload_checks() {
        use crate::block::Transaction;

        let (_dir, engine) = engine_with(easy_config());
        let key = SigningKey::generate(&mut OsRng);
        let mut block = forge_next(&engine, &key, 240);

        block.transactions = vec![
            Transaction { id: 2, timestamp: 1, amount_planck: 10, fee_planck: 1 },
            Transaction { id: 1, timestamp: 2, amount_planck: 10, fee_planck: 1 },
        ];
        block.payload_length = payload_length(&block.transactions);
        block.sign(&key);
        let now = now_for(&block);

        let result = engine.pre_verify_at(block.clone(), None, &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::Malformed(MalformedBlock::TransactionsNotSorted))
        ));

        block.transactions.swap(0, 1);
        block.sign(&key);
        // Sorted now, but the payload hash still belongs to the empty list.
        let result = engine.pre_verify_at(block, None, &Interrupt::new(), now);
        assert!(matches!(
            result,
            Err(VerifyError::NotAccepted(ConsensusError::PayloadHashMismatch { .. }))
        ));
    }
}
