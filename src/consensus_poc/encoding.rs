//! Canonical block byte encoding
//!
//! The unsigned encoding is the exact byte sequence covered by the block
//! signature; the signed encoding (unsigned bytes with the signature
//! appended) is what the block hash and id are computed over. Fixed-width
//! little-endian fields only: producers and verifiers must see identical
//! bytes. The base target is deliberately not part of the encoding; it is
//! recomputed from the parent on every verification.

use crate::block::Block;

/// Leading magic of every encoded block.
pub const BLOCK_MAGIC: &[u8; 4] = b"SPOC";

/// magic + version + timestamp + previous id + previous hash + tx count
/// + fee total + payload length + payload hash + generator key
/// + generation signature + nonce
pub const UNSIGNED_BLOCK_LENGTH: usize = 4 + 4 + 8 + 8 + 32 + 4 + 8 + 4 + 32 + 32 + 32 + 8;

pub const SIGNED_BLOCK_LENGTH: usize = UNSIGNED_BLOCK_LENGTH + 64;

pub fn unsigned_block_bytes(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(UNSIGNED_BLOCK_LENGTH);
    out.extend_from_slice(BLOCK_MAGIC);
    out.extend_from_slice(&block.version.to_le_bytes());
    out.extend_from_slice(&block.timestamp.to_le_bytes());
    out.extend_from_slice(&block.previous_block_id.to_le_bytes());
    out.extend_from_slice(&block.previous_block_hash);
    out.extend_from_slice(&(block.transactions.len() as u32).to_le_bytes());
    out.extend_from_slice(&block.total_fee_planck.to_le_bytes());
    out.extend_from_slice(&block.payload_length.to_le_bytes());
    out.extend_from_slice(&block.payload_hash);
    out.extend_from_slice(&block.generator_public_key);
    out.extend_from_slice(&block.generation_signature);
    out.extend_from_slice(&block.nonce.to_le_bytes());
    out
}

pub fn signed_block_bytes(block: &Block) -> Vec<u8> {
    let mut out = unsigned_block_bytes(block);
    out.extend_from_slice(&block.block_signature);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(
            3,
            1_700,
            0xaabb_ccdd_eeff_0011,
            [0x11; 32],
            [0x22; 32],
            [0x33; 32],
            7,
            1_000_000,
            vec![],
        )
    }

    #[test]
    fn unsigned_bytes_are_stable_and_sized() {
        let block = sample_block();
        let bytes = unsigned_block_bytes(&block);

        assert_eq!(&bytes[0..4], BLOCK_MAGIC);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(bytes.len(), UNSIGNED_BLOCK_LENGTH);

        // Encoding twice must yield identical bytes.
        assert_eq!(bytes, unsigned_block_bytes(&block));
    }

    #[test]
    fn signed_bytes_append_the_signature() {
        let mut block = sample_block();
        block.block_signature = [0x5a; 64];
        let bytes = signed_block_bytes(&block);

        assert_eq!(bytes.len(), SIGNED_BLOCK_LENGTH);
        assert_eq!(&bytes[UNSIGNED_BLOCK_LENGTH..], &[0x5a; 64][..]);
        assert_eq!(&bytes[..UNSIGNED_BLOCK_LENGTH], &unsigned_block_bytes(&block)[..]);
    }

    #[test]
    fn nonce_and_generation_signature_affect_the_encoding() {
        let block = sample_block();
        let baseline = unsigned_block_bytes(&block);

        let mut other = sample_block();
        other.nonce = 8;
        assert_ne!(baseline, unsigned_block_bytes(&other));

        let mut other = sample_block();
        other.generation_signature = [0x34; 32];
        assert_ne!(baseline, unsigned_block_bytes(&other));
    }
}
