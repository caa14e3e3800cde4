//! Proof-of-capacity consensus primitives
//!
//! Pure, side-effect-free derivations shared by block producers and
//! verifiers: canonical block encoding, adaptive base-target adjustment,
//! generation signatures and deadlines, scoop selection and the reward
//! schedule. Everything here must be bit-identical across nodes; all
//! arithmetic is integer with floor division.

pub mod difficulty;
pub mod encoding;
pub mod generation;
pub mod reward;
pub mod scoop;

pub use difficulty::calculate_base_target;
pub use generation::{deadline, derive_generation_signature, generation_hit};
pub use reward::{block_reward, block_subsidy};
pub use scoop::scoop_index;
