//! Generation signatures, hits and deadlines
//!
//! The generation signature chains each block to its predecessor in the
//! pseudo-random scoop/deadline space: blake3 over the parent's generation
//! signature and the generator's public key, with no randomness and no
//! node-local state. The generation hit folds the generator's plot scoop
//! into that signature; hit divided by the base target is the deadline in
//! seconds the generator had to wait out before the block became eligible.

use crate::block::{Block, ScoopData};

/// Derive the 32-byte generation signature for a block produced on top of
/// `previous_signature` by the holder of `generator_public_key`.
pub fn derive_generation_signature(
    previous_signature: &[u8; 32],
    generator_public_key: &[u8; 32],
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous_signature);
    hasher.update(generator_public_key);
    *hasher.finalize().as_bytes()
}

/// Recompute the expected generation signature from the parent and compare
/// byte-for-byte with what the block declares.
pub fn verify_generation_signature(block: &Block, previous: &Block) -> bool {
    let expected = derive_generation_signature(
        &previous.generation_signature,
        &block.generator_public_key,
    );
    expected == block.generation_signature
}

/// Numeric generation hit: the first eight bytes, little-endian, of
/// blake3(generation signature || scoop data || nonce). Smaller hit, earlier
/// deadline.
pub fn generation_hit(generation_signature: &[u8; 32], scoop: &ScoopData, nonce: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(generation_signature);
    hasher.update(&scoop.0);
    hasher.update(&nonce.to_be_bytes());
    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap())
}

/// Deadline in seconds for a hit against a base target. Floor division; the
/// target is floored at 1 so a corrupt zero can never divide.
pub fn deadline(hit: u64, base_target: u64) -> u64 {
    hit / base_target.max(1)
}
