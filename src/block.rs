//! Block data model
//!
//! A block is immutable once signed; the node-local bookkeeping fields
//! (height, cumulative difficulty, recorded capacity hit) are assigned at
//! link time and never trusted from the wire, so they are excluded from both
//! the serialized form and the signed byte encoding.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::consensus_poc::encoding;
use crate::consensus_poc::scoop::SCOOP_SIZE;
use crate::errors::MalformedBlock;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Serde adapters: byte arrays travel as lowercase hex strings.
pub(crate) mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = hex::decode(&raw).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

pub(crate) mod hex64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = hex::decode(&raw).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

/// Minimal view of a transaction as the block engine needs it: identity for
/// ordering/dedupe, amounts for the fee cross-check, and a stable byte form
/// for payload hashing. Full transaction semantics live with the transaction
/// processing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub timestamp: u64,
    pub amount_planck: u64,
    pub fee_planck: u64,
}

impl Transaction {
    pub fn bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[0..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        out[16..24].copy_from_slice(&self.amount_planck.to_le_bytes());
        out[24..32].copy_from_slice(&self.fee_planck.to_le_bytes());
        out
    }
}

/// One 64-byte slice of a plot file, supplied by the plotting collaborator
/// when the node elects full capacity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoopData(pub [u8; SCOOP_SIZE]);

impl TryFrom<&[u8]> for ScoopData {
    type Error = usize;

    /// Fails with the offending length.
    fn try_from(raw: &[u8]) -> Result<Self, usize> {
        let bytes: [u8; SCOOP_SIZE] = raw.try_into().map_err(|_| raw.len())?;
        Ok(ScoopData(bytes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub version: u32,
    /// Seconds since the genesis epoch.
    pub timestamp: u64,
    pub previous_block_id: u64,
    #[serde(with = "hex32")]
    pub previous_block_hash: [u8; 32],
    #[serde(with = "hex32")]
    pub generator_public_key: [u8; 32],
    #[serde(with = "hex32")]
    pub generation_signature: [u8; 32],
    /// Plot nonce chosen by the generator.
    pub nonce: u64,
    pub base_target: u64,
    pub total_fee_planck: u64,
    pub payload_length: u32,
    #[serde(with = "hex32")]
    pub payload_hash: [u8; 32],
    pub transactions: Vec<Transaction>,
    #[serde(with = "hex64")]
    pub block_signature: [u8; 64],

    // Node-local bookkeeping. Assigned by linkage, never read off the wire.
    #[serde(skip)]
    pub height: u64,
    #[serde(skip)]
    pub cumulative_difficulty: u128,
    /// Generation hit recorded by a full capacity verification; consumed by
    /// the reduced verification path.
    #[serde(skip)]
    pub poc_hit: Option<u64>,

    #[serde(skip)]
    cached_hash: OnceCell<[u8; 32]>,
}

impl Block {
    /// Assemble an unsigned block. Fee total, payload hash and payload length
    /// are derived from the transaction list; tamper with the public fields
    /// afterwards if an inconsistent block is needed (tests do).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        timestamp: u64,
        previous_block_id: u64,
        previous_block_hash: [u8; 32],
        generator_public_key: [u8; 32],
        generation_signature: [u8; 32],
        nonce: u64,
        base_target: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let total_fee_planck = transactions
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee_planck));
        let payload_hash = payload_hash(&transactions);
        let payload_length = payload_length(&transactions);
        Self {
            version,
            timestamp,
            previous_block_id,
            previous_block_hash,
            generator_public_key,
            generation_signature,
            nonce,
            base_target,
            total_fee_planck,
            payload_length,
            payload_hash,
            transactions,
            block_signature: [0u8; 64],
            height: 0,
            cumulative_difficulty: 0,
            poc_hit: None,
            cached_hash: OnceCell::new(),
        }
    }

    /// Canonical bytes covered by the block signature.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        encoding::unsigned_block_bytes(self)
    }

    /// Canonical signed bytes: unsigned bytes with the signature appended.
    pub fn bytes(&self) -> Vec<u8> {
        encoding::signed_block_bytes(self)
    }

    /// Full hash over the signed bytes. Computed at most once per block.
    pub fn hash(&self) -> [u8; 32] {
        *self
            .cached_hash
            .get_or_init(|| *blake3::hash(&self.bytes()).as_bytes())
    }

    /// Block id: the first eight bytes of the full hash, little-endian.
    pub fn id(&self) -> u64 {
        let hash = self.hash();
        u64::from_le_bytes(hash[0..8].try_into().unwrap())
    }

    /// Sign the canonical unsigned bytes with the generator's key.
    pub fn sign(&mut self, key: &SigningKey) {
        self.block_signature = key.sign(&self.unsigned_bytes()).to_bytes();
        self.cached_hash = OnceCell::new();
    }

    /// Verify the block signature against the embedded generator key.
    ///
    /// A key that fails to parse is a malformed block, not a failed check.
    pub fn verify_signature(&self) -> Result<bool, MalformedBlock> {
        let key = VerifyingKey::from_bytes(&self.generator_public_key)
            .map_err(|_| MalformedBlock::InvalidGeneratorKey)?;
        let signature = Signature::from_bytes(&self.block_signature);
        Ok(key.verify(&self.unsigned_bytes(), &signature).is_ok())
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_block_id == 0
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Block {}

/// Payload hash: blake3 over the concatenated canonical transaction bytes.
pub fn payload_hash(transactions: &[Transaction]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for tx in transactions {
        hasher.update(&tx.bytes());
    }
    *hasher.finalize().as_bytes()
}

pub fn payload_length(transactions: &[Transaction]) -> u32 {
    (transactions.len() * 32) as u32
}
