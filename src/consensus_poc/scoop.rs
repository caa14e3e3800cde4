//! Scoop selection
//!
//! Every height examines exactly one scoop of the generator's plot. The
//! index is derived from the block height and generation signature alone,
//! keeping the proof of space independent from the proof of signature.

/// Bytes per scoop.
pub const SCOOP_SIZE: usize = 64;

/// Scoops per plot; scoop indices are `0..SCOOPS_PER_PLOT`.
pub const SCOOPS_PER_PLOT: u32 = 4096;

/// Scoop index examined at `height` under `generation_signature`:
/// blake3(generation signature || height), last two bytes interpreted
/// big-endian, modulo the plot size.
pub fn scoop_index(height: u64, generation_signature: &[u8; 32]) -> u16 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(generation_signature);
    hasher.update(&height.to_be_bytes());
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    let tail = u16::from_be_bytes([bytes[30], bytes[31]]);
    tail % (SCOOPS_PER_PLOT as u16)
}
