use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[cfg(test)]
use rand::Rng;

pub mod fixed;
pub mod incremental;

/// Depth of the deposit contract's merkle tree.
pub const DEPOSIT_CONTRACT_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(#[serde(with = "hex")] pub [u8; 32]);

impl Hash {
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl From<Hash> for B256 {
    fn from(value: Hash) -> Self {
        B256::from(value.0)
    }
}

impl From<B256> for Hash {
    fn from(value: B256) -> Self {
        Hash(value.0)
    }
}

#[cfg(test)]
impl Hash {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Hash(rng.gen::<[u8; 32]>())
    }
}

pub fn hash_two<H: Digest>(left: Hash, right: Hash) -> Hash {
    let mut hasher = H::new();
    hasher.update(left.0);
    hasher.update(right.0);
    let hash = hasher.finalize().to_vec();
    let mut bytes: [u8; 32] = [0; 32];
    bytes.copy_from_slice(&hash);
    Hash(bytes)
}

/// Roots of empty subtrees, `zero_hashes[i]` being the root of an empty tree of height `i`.
pub fn zero_hashes<H: Digest>(depth: usize) -> Vec<Hash> {
    let mut default = Vec::with_capacity(depth + 1);
    default.push(Hash::default());
    for i in 1..=depth {
        let h = hash_two::<H>(default[i - 1], default[i - 1]);
        default.push(h);
    }
    default
}

/// Mixes the element count into a list root: `hash(root ‖ le_u64(len) ‖ 0^24)`.
pub fn mix_in_length<H: Digest>(root: Hash, len: u64) -> Hash {
    hash_two::<H>(root, u64_chunk(len))
}

/// Little-endian `u64` right-padded to one 32-byte chunk.
pub fn u64_chunk(value: u64) -> Hash {
    let mut bytes = [0; 32];
    bytes[..8].copy_from_slice(&value.to_le_bytes());
    Hash(bytes)
}

/// Splits `bytes` into 32-byte chunks, zero-padding the last one.
pub fn pack_bytes(bytes: &[u8]) -> Vec<Hash> {
    bytes
        .chunks(32)
        .map(|chunk| {
            let mut bytes = [0; 32];
            bytes[..chunk.len()].copy_from_slice(chunk);
            Hash(bytes)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    TreeFull,
}

impl StdError for MerkleError {}

impl Display for MerkleError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::TreeFull => write!(f, "TreeFull"),
        }
    }
}
