//! Strata node — proof-of-capacity block consensus engine
//!
//! Block eligibility on the Strata chain is decided by precomputed plot
//! data, not hashing work: each height selects one scoop of the generator's
//! plot, and the derived generation hit against the adaptive base target
//! yields the deadline the generator must wait out. This crate owns the
//! consensus-critical path — deterministic derivations, the admission
//! pipeline and chain linkage. Networking, storage engines beyond local
//! bookkeeping, wallets and transaction business logic are collaborators.

pub mod block;
pub mod chain;
pub mod config;
pub mod consensus_poc;
pub mod errors;
pub mod fork;
pub mod genesis;
pub mod listener;

pub use block::{Block, ScoopData, Transaction};
pub use chain::accept::{BlockEngine, Interrupt, VerifiedBlock};
pub use chain::Chain;
pub use config::ConsensusConfig;
pub use errors::{ApplyError, ConsensusError, MalformedBlock, VerifyError};
pub use fork::{ForkSchedule, ForkValue};
