//! In-memory mock of the execution chain the deposit contract lives on.

use crate::{
    deposit::DepositRecord,
    error::Error,
    header::{construct_history, Header, SealedHeader},
    log::{deposit_logs, LogEntry},
    merkle::{incremental::DepositTree, Hash, MerkleError, DEPOSIT_CONTRACT_TREE_DEPTH},
};
use alloy_primitives::{Address, B256};
use getset::Getters;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};
use tracing::debug;

/// Longest synthetic history the chain is built with.
pub const MAX_HISTORY_BLOCKS: u64 = 100_000;

/// Parameters of the synthetic block history the chain starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Number of the head block at startup.
    pub head: u64,
    /// Seconds between two history blocks.
    pub block_time: u64,
    /// Timestamp of the head block.
    pub now: u64,
}

/// Block selector of `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Latest,
    Earliest,
    Number(u64),
}

impl FromStr for BlockId {
    type Err = Error;

    /// Parses a block tag or a `0x`-prefixed hex quantity.
    /// `pending`, `safe` and `finalized` all resolve to the head.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" | "pending" | "safe" | "finalized" => Ok(Self::Latest),
            "earliest" => Ok(Self::Earliest),
            _ => {
                let digits = s
                    .strip_prefix("0x")
                    .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_hexdigit()))
                    .ok_or_else(|| Error::InvalidBlockId(s.to_string()))?;
                u64::from_str_radix(digits, 16)
                    .map(Self::Number)
                    .map_err(|_| Error::InvalidBlockId(s.to_string()))
            },
        }
    }
}

#[derive(Debug, Getters)]
/// Mock chain: deposits, their logs, and the block headers the logs point at.
///
/// Deposits become visible ("ready") only through a block: a trigger queues them and
/// the next `advance_block` stamps their logs with the freshly minted header.
pub struct ChainState {
    deposits: Vec<DepositRecord>,
    logs: Vec<LogEntry>,
    #[getset(get = "pub")]
    ready_count: usize,
    #[getset(get = "pub")]
    queued_count: usize,
    headers_by_number: BTreeMap<u64, SealedHeader>,
    numbers_by_hash: HashMap<B256, u64>,
    #[getset(get = "pub")]
    head_number: u64,
    first_number: u64,
    /// Deposit tree over `deposits[..ready_count]`
    tree: DepositTree<Sha256>,
}

impl ChainState {
    pub fn new(
        deposits: Vec<DepositRecord>, genesis_ready: usize, history: History, contract: Address,
    ) -> Result<Self, Error> {
        if genesis_ready > deposits.len() {
            return Err(Error::InsufficientDeposits {
                requested: genesis_ready,
                available: deposits.len(),
            });
        }
        if history.head > MAX_HISTORY_BLOCKS {
            return Err(Error::HistoryTooLong { requested: history.head, max: MAX_HISTORY_BLOCKS });
        }
        let head = history.head.max(1);
        let logs = deposit_logs(&deposits, contract);

        let mut chain = Self {
            deposits,
            logs,
            ready_count: 0,
            queued_count: 0,
            headers_by_number: BTreeMap::new(),
            numbers_by_hash: HashMap::new(),
            head_number: head,
            first_number: 1,
            tree: DepositTree::new(DEPOSIT_CONTRACT_TREE_DEPTH),
        };
        for header in construct_history(head, history.block_time, history.now) {
            chain.insert_header(header);
        }
        let head_hash = chain.latest_header().hash();
        chain.mark_ready(genesis_ready, head_hash, head)?;
        Ok(chain)
    }

    fn insert_header(&mut self, header: SealedHeader) {
        self.numbers_by_hash.insert(header.hash(), header.number());
        self.headers_by_number.insert(header.number(), header);
    }

    fn ensure_capacity(&self, n: usize) -> Result<(), Error> {
        if n as u128 > self.tree.remaining() {
            return Err(MerkleError::TreeFull.into());
        }
        Ok(())
    }

    /// Stamps the next `n` logs with the given block and grows the ready window.
    /// Nothing is touched when the deposit tree cannot take `n` more leaves.
    fn mark_ready(&mut self, n: usize, block_hash: B256, block_number: u64) -> Result<(), Error> {
        self.ensure_capacity(n)?;
        let start = self.ready_count;
        let end = start + n;
        for (log, deposit) in self.logs[start..end].iter_mut().zip(&self.deposits[start..end]) {
            log.include(block_hash, block_number);
            self.tree.push(deposit.tree_hash_root())?;
        }
        self.ready_count = end;
        Ok(())
    }

    /// Mints the next block and includes every queued deposit in it.
    pub fn advance_block(&mut self, now: u64) -> Result<SealedHeader, Error> {
        self.ensure_capacity(self.queued_count)?;
        let parent = self.latest_header();
        let timestamp = now.max(parent.timestamp());
        let number = self.head_number + 1;
        let header = Header::synthetic(number, timestamp, parent.hash()).seal();

        self.insert_header(header.clone());
        self.head_number = number;

        let queued = std::mem::take(&mut self.queued_count);
        self.mark_ready(queued, header.hash(), number)?;
        debug!(number, included = queued, ready = self.ready_count, "advanced block");
        Ok(header)
    }

    /// Number of deposits that can still be triggered.
    pub fn available(&self) -> usize {
        self.deposits.len() - self.ready_count - self.queued_count
    }

    /// Queues `n` deposits for inclusion in the next block.
    pub fn trigger_deposits(&mut self, n: usize) -> Result<(), Error> {
        let available = self.available();
        if n > available {
            return Err(Error::InsufficientDeposits { requested: n, available });
        }
        self.queued_count += n;
        Ok(())
    }

    pub fn total_deposits(&self) -> usize {
        self.deposits.len()
    }

    pub fn ready_deposits(&self) -> &[DepositRecord] {
        &self.deposits[..self.ready_count]
    }

    pub fn ready_logs(&self) -> &[LogEntry] {
        &self.logs[..self.ready_count]
    }

    pub fn deposit_root(&self) -> Hash {
        self.tree.root()
    }

    /// Ready deposit count as 8 little-endian bytes, like the deposit contract returns it.
    pub fn deposit_count(&self) -> [u8; 8] {
        (self.ready_count as u64).to_le_bytes()
    }

    pub fn latest_header(&self) -> &SealedHeader {
        // The history always holds at least the head block.
        &self.headers_by_number[&self.head_number]
    }

    pub fn header_by_number(&self, id: BlockId) -> Result<&SealedHeader, Error> {
        let number = match id {
            BlockId::Latest => self.head_number,
            BlockId::Earliest => self.first_number,
            BlockId::Number(n) => n.max(self.first_number),
        };
        self.headers_by_number.get(&number).ok_or(Error::NotFound)
    }

    pub fn header_by_hash(&self, hash: B256) -> Result<&SealedHeader, Error> {
        let number = self.numbers_by_hash.get(&hash).ok_or(Error::NotFound)?;
        self.headers_by_number.get(number).ok_or(Error::NotFound)
    }
}

#[cfg(test)]
mod test {
    use super::{BlockId, ChainState, History, MAX_HISTORY_BLOCKS};
    use crate::{
        deposit::{build_deposits, test::key_pairs, DepositRecord, GENESIS_FORK_VERSION},
        error::Error,
        merkle::{
            fixed::DenseMerkleTree, incremental::DepositTree, mix_in_length, Hash, MerkleError,
            DEPOSIT_CONTRACT_TREE_DEPTH,
        },
    };
    use alloy_primitives::{Address, B256};
    use sha2::Sha256;

    const HISTORY: History = History { head: 2000, block_time: 10, now: 1_700_000_000 };

    fn deposits(n: u8) -> Vec<DepositRecord> {
        build_deposits(&key_pairs(n), 32_000_000_000, GENESIS_FORK_VERSION).unwrap()
    }

    fn naive_root(deposits: &[DepositRecord]) -> Hash {
        let leaves = deposits.iter().map(|d| d.tree_hash_root()).collect();
        let tree = DenseMerkleTree::<Sha256>::new(leaves, DEPOSIT_CONTRACT_TREE_DEPTH as u8);
        mix_in_length::<Sha256>(tree.root(), deposits.len() as u64)
    }

    #[test]
    fn should_start_with_genesis_deposits_ready() {
        let chain = ChainState::new(deposits(5), 2, HISTORY, Address::ZERO).unwrap();
        assert_eq!(*chain.head_number(), 2000);
        assert_eq!(*chain.ready_count(), 2);
        assert_eq!(chain.available(), 3);
        assert_eq!(chain.deposit_count(), 2u64.to_le_bytes());

        let head = chain.latest_header().clone();
        assert_eq!(head.number(), 2000);
        assert_eq!(head.timestamp(), HISTORY.now);
        for log in chain.ready_logs() {
            assert_eq!(log.block_hash, Some(head.hash()));
            assert_eq!(log.block_number.unwrap().to::<u64>(), 2000);
        }
        assert!(chain.logs[2..].iter().all(|log| !log.is_included()));
        assert_eq!(chain.deposit_root(), naive_root(chain.ready_deposits()));
    }

    #[test]
    fn should_reject_too_many_genesis_deposits() {
        let res = ChainState::new(deposits(2), 3, HISTORY, Address::ZERO);
        assert!(matches!(
            res,
            Err(Error::InsufficientDeposits { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn should_include_triggered_deposits_in_next_block() {
        let mut chain = ChainState::new(deposits(6), 1, HISTORY, Address::ZERO).unwrap();
        let before = chain.ready_logs().to_vec();

        chain.trigger_deposits(3).unwrap();
        // deferred until the next block exists
        assert_eq!(*chain.ready_count(), 1);
        assert_eq!(*chain.queued_count(), 3);
        assert!(!chain.logs[1].is_included());

        let header = chain.advance_block(HISTORY.now + 14).unwrap();
        assert_eq!(header.number(), 2001);
        assert_eq!(*chain.ready_count(), 4);
        assert_eq!(*chain.queued_count(), 0);
        assert_eq!(&chain.ready_logs()[..1], &before[..]);
        for log in &chain.ready_logs()[1..] {
            assert_eq!(log.block_hash, Some(header.hash()));
            assert_eq!(log.block_number.unwrap().to::<u64>(), 2001);
        }
        assert_eq!(chain.header_by_hash(header.hash()).unwrap(), &header);
        assert_eq!(chain.deposit_root(), naive_root(chain.ready_deposits()));
    }

    #[test]
    fn should_reject_over_trigger_without_side_effects() {
        let mut chain = ChainState::new(deposits(4), 2, HISTORY, Address::ZERO).unwrap();
        let logs = chain.logs.clone();
        let root = chain.deposit_root();

        let res = chain.trigger_deposits(3);
        assert!(matches!(
            res,
            Err(Error::InsufficientDeposits { requested: 3, available: 2 })
        ));
        assert_eq!(*chain.ready_count(), 2);
        assert_eq!(*chain.queued_count(), 0);
        assert_eq!(chain.logs, logs);
        assert_eq!(chain.deposit_root(), root);

        // queued deposits count against what is left
        chain.trigger_deposits(2).unwrap();
        assert!(chain.trigger_deposits(1).is_err());
    }

    #[test]
    fn should_advance_without_queued_deposits() {
        let mut chain = ChainState::new(deposits(2), 0, HISTORY, Address::ZERO).unwrap();
        let root = chain.deposit_root();
        let first = chain.advance_block(HISTORY.now + 1).unwrap();
        let second = chain.advance_block(HISTORY.now).unwrap();

        assert_eq!(*chain.head_number(), 2002);
        assert_eq!(second.header().parent_hash, first.hash());
        // time never goes backwards
        assert_eq!(second.timestamp(), first.timestamp());
        assert_eq!(*chain.ready_count(), 0);
        assert_eq!(chain.deposit_root(), root);
        assert_eq!(
            root.to_hex(),
            "d70a234731285c6804c2a4f56711ddb8c82c99740f207854891028af34e27e5e"
        );
    }

    #[test]
    fn should_parse_block_ids() {
        assert_eq!("latest".parse::<BlockId>().unwrap(), BlockId::Latest);
        assert_eq!("finalized".parse::<BlockId>().unwrap(), BlockId::Latest);
        assert_eq!("earliest".parse::<BlockId>().unwrap(), BlockId::Earliest);
        assert_eq!("0x7d0".parse::<BlockId>().unwrap(), BlockId::Number(2000));
        assert!(matches!("0x".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert!(matches!("2000".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert!(matches!("newest".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert!(matches!("0x+7d0".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert!(matches!("0x-1".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert!(matches!("0x7d0 ".parse::<BlockId>(), Err(Error::InvalidBlockId(_))));
        assert_eq!("0x7D0".parse::<BlockId>().unwrap(), BlockId::Number(2000));
    }

    #[test]
    fn should_look_up_headers() {
        let mut chain = ChainState::new(deposits(1), 1, HISTORY, Address::ZERO).unwrap();
        chain.advance_block(HISTORY.now + 20).unwrap();

        let latest = chain.header_by_number(BlockId::Latest).unwrap().clone();
        assert_eq!(latest.number(), 2001);
        assert_eq!(chain.header_by_hash(latest.hash()).unwrap(), &latest);
        assert_eq!(chain.header_by_number(BlockId::Number(1500)).unwrap().number(), 1500);
        assert_eq!(chain.header_by_number(BlockId::Number(0)).unwrap().number(), 1);
        assert_eq!(chain.header_by_number(BlockId::Earliest).unwrap().number(), 1);
        assert!(matches!(chain.header_by_number(BlockId::Number(2002)), Err(Error::NotFound)));
        assert!(matches!(chain.header_by_hash(B256::ZERO), Err(Error::NotFound)));
    }

    #[test]
    fn should_keep_deposit_root_in_sync_with_ready_window() {
        let all = deposits(5);
        let mut chain = ChainState::new(all.clone(), 0, HISTORY, Address::ZERO).unwrap();
        for k in 1..=5 {
            chain.trigger_deposits(1).unwrap();
            chain.advance_block(HISTORY.now + k as u64).unwrap();
            assert_eq!(chain.deposit_root(), naive_root(&all[..k]));
        }
        assert_eq!(chain.available(), 0);
    }

    #[test]
    fn should_leave_chain_untouched_when_tree_is_full() {
        let mut chain = ChainState::new(deposits(5), 0, HISTORY, Address::ZERO).unwrap();
        // room for three leaves only
        chain.tree = DepositTree::new(2);
        let logs = chain.logs.clone();
        let headers = chain.headers_by_number.len();

        chain.trigger_deposits(4).unwrap();
        let res = chain.advance_block(HISTORY.now + 14);
        assert!(matches!(res, Err(Error::Merkle(MerkleError::TreeFull))));
        assert_eq!(*chain.head_number(), 2000);
        assert_eq!(chain.headers_by_number.len(), headers);
        assert_eq!(*chain.ready_count(), 0);
        assert_eq!(*chain.queued_count(), 4);
        assert_eq!(chain.logs, logs);
        assert!(chain.tree.is_empty());

        // a block that fits still goes through
        chain.queued_count = 3;
        let header = chain.advance_block(HISTORY.now + 14).unwrap();
        assert_eq!(*chain.ready_count(), 3);
        assert!(chain.ready_logs().iter().all(|log| log.block_hash == Some(header.hash())));
    }

    #[test]
    fn should_reject_oversized_history() {
        let history = History { head: MAX_HISTORY_BLOCKS + 1, ..HISTORY };
        let res = ChainState::new(deposits(1), 0, history, Address::ZERO);
        assert!(matches!(
            res,
            Err(Error::HistoryTooLong { requested, max: MAX_HISTORY_BLOCKS })
                if requested == MAX_HISTORY_BLOCKS + 1
        ));
    }
}
