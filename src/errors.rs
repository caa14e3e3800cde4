//! Domain-specific error types for the Strata consensus engine
//!
//! Three kinds of verification failure exist and callers are expected to
//! treat them differently: `MalformedBlock` (never valid, peer may be
//! penalized), `ConsensusError` (well-formed but fails a consensus check,
//! final for this block instance) and `Interrupted` (verification was
//! cancelled cooperatively, safe to retry the same block later).

use thiserror::Error;

/// Structurally invalid blocks. These can never become valid.
#[derive(Error, Debug)]
pub enum MalformedBlock {
    #[error("generator public key is not a valid ed25519 key")]
    InvalidGeneratorKey,

    #[error("too many transactions: {count} (max: {max})")]
    TooManyTransactions { count: usize, max: usize },

    #[error("payload too large: {length} bytes (max: {max})")]
    PayloadTooLarge { length: u32, max: u32 },

    #[error("transactions are not sorted by id or contain duplicates")]
    TransactionsNotSorted,

    #[error("declared payload length {declared} does not match {actual}")]
    PayloadLengthMismatch { declared: u32, actual: u32 },
}

/// Well-formed blocks that fail a consensus check. The variant names the
/// failed check so callers can log and score the sending peer.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("previous block id {declared:#018x} does not match chain tip {tip:#018x}")]
    PreviousBlockMismatch { declared: u64, tip: u64 },

    #[error("previous block hash does not match chain tip")]
    PreviousHashMismatch,

    #[error("invalid version {version} at height {height}")]
    InvalidVersion { version: u32, height: u64 },

    #[error("invalid timestamp {timestamp}: previous is {previous}, now is {now}")]
    InvalidTimestamp { timestamp: u64, previous: u64, now: u64 },

    #[error("duplicate block or invalid id at height {height}")]
    DuplicateBlock { height: u64 },

    #[error("base target mismatch: declared {declared}, computed {computed}")]
    BaseTargetMismatch { declared: u64, computed: u64 },

    #[error("generation signature verification failed at height {height}")]
    BadGenerationSignature { height: u64 },

    #[error("block signature verification failed at height {height}")]
    BadBlockSignature { height: u64 },

    #[error("deadline not reached: elapsed {elapsed}s, deadline {deadline}s")]
    DeadlineNotReached { elapsed: u64, deadline: u64 },

    #[error("no capacity proof available for the reduced verification path")]
    MissingCapacityProof,

    #[error("payload hash does not match transactions at height {height}")]
    PayloadHashMismatch { height: u64 },

    #[error("transaction fees {actual} exceed declared total {declared}")]
    FeeTotalMismatch { declared: u64, actual: u64 },
}

/// Verification was cancelled before it could finish. Retryable.
#[derive(Error, Debug)]
#[error("block verification interrupted at stage `{stage}`")]
pub struct Interrupted {
    pub stage: &'static str,
}

/// Everything `pre_verify` can raise.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Malformed(#[from] MalformedBlock),

    #[error(transparent)]
    NotAccepted(#[from] ConsensusError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl VerifyError {
    /// Only interruption is safe to retry; the other kinds are final for
    /// this block instance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::Interrupted(_))
    }
}

/// Faults raised by `apply`. With a verified block in hand these indicate a
/// violated caller contract or a storage fault, never an invalid block.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("chain tip moved since verification: expected parent {expected:#018x}, tip is {tip:#018x}")]
    TipMoved { expected: u64, tip: u64 },

    #[error("block {id:#018x} was already applied")]
    AlreadyApplied { id: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interruption_is_retryable() {
        let interrupted = VerifyError::from(Interrupted { stage: "capacity proof" });
        assert!(interrupted.is_retryable());

        let rejected = VerifyError::from(ConsensusError::BaseTargetMismatch {
            declared: 1,
            computed: 2,
        });
        assert!(!rejected.is_retryable());

        let malformed = VerifyError::from(MalformedBlock::InvalidGeneratorKey);
        assert!(!malformed.is_retryable());
    }

    #[test]
    fn errors_name_the_failed_check() {
        let err = ConsensusError::BaseTargetMismatch { declared: 100, computed: 101 };
        assert!(err.to_string().contains("base target"));

        let err = ConsensusError::DeadlineNotReached { elapsed: 3, deadline: 240 };
        assert!(err.to_string().contains("deadline"));
    }
}
