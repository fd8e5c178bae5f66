use alloy_primitives::{b256, keccak256, Address, Bloom, Bytes, B256, B64, U256, U64};
use alloy_rlp::encode;
use alloy_rlp_derive::RlpEncodable;
use serde::{Deserialize, Serialize};

/// keccak256(rlp([]))
pub const EMPTY_UNCLE_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
/// Root of an empty trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

pub const FILLER_DIFFICULTY: u64 = 20;
pub const FILLER_GAS_LIMIT: u64 = 100;
pub const FILLER_GAS_USED: u64 = 100;
pub const FILLER_EXTRA_DATA: &[u8] = b"eth1 mock";

/// Execution block header. Only `number`, `timestamp` and `parent_hash` carry
/// real values, everything else is filler.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: B256,
    #[serde(rename = "sha3Uncles")]
    pub uncle_hash: B256,
    #[serde(rename = "miner")]
    pub coinbase: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: U64,
    pub gas_limit: U64,
    pub gas_used: U64,
    pub timestamp: U64,
    pub extra_data: Bytes,
    pub mix_hash: B256,
    pub nonce: B64,
}

impl Header {
    pub fn synthetic(number: u64, timestamp: u64, parent_hash: B256) -> Self {
        Self {
            parent_hash,
            uncle_hash: EMPTY_UNCLE_HASH,
            coinbase: Address::ZERO,
            state_root: B256::ZERO,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::from(FILLER_DIFFICULTY),
            number: U64::from(number),
            gas_limit: U64::from(FILLER_GAS_LIMIT),
            gas_used: U64::from(FILLER_GAS_USED),
            timestamp: U64::from(timestamp),
            extra_data: Bytes::from_static(FILLER_EXTRA_DATA),
            mix_hash: B256::ZERO,
            nonce: B64::ZERO,
        }
    }

    /// keccak256 of the RLP encoding.
    pub fn hash_slow(&self) -> B256 {
        keccak256(encode(self))
    }

    pub fn seal(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }
}

/// Header together with its hash, computed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedHeader {
    #[serde(flatten)]
    header: Header,
    hash: B256,
}

impl SealedHeader {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn number(&self) -> u64 {
        self.header.number.to()
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp.to()
    }
}

/// Synthetic chain history `1..=head`, `block_time` seconds apart, `head` stamped with `now`.
pub fn construct_history(head: u64, block_time: u64, now: u64) -> Vec<SealedHeader> {
    let mut parent_hash = B256::ZERO;
    (1..=head)
        .map(|number| {
            let timestamp = now.saturating_sub((head - number).saturating_mul(block_time));
            let sealed = Header::synthetic(number, timestamp, parent_hash).seal();
            parent_hash = sealed.hash();
            sealed
        })
        .collect()
}
