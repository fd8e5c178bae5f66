use crate::{contract::DepositEvent, deposit::DepositRecord};
use alloy_primitives::{Address, Bytes, B256, U64};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

/// Transaction index reported for every deposit log, no real transaction exists.
pub const PLACEHOLDER_TX_INDEX: u64 = 100;
/// Log index reported for every deposit log.
pub const PLACEHOLDER_LOG_INDEX: u64 = 10;

/// ABI-encoded `DepositEvent` data for the deposit at `index`.
/// Amount and index are 8-byte little-endian, as the deposit contract emits them.
pub fn encode_deposit_data(record: &DepositRecord, index: u64) -> Bytes {
    let event = DepositEvent {
        pubkey: Bytes::copy_from_slice(record.pubkey.as_slice()),
        withdrawal_credentials: Bytes::copy_from_slice(record.withdrawal_credentials.as_slice()),
        amount: Bytes::copy_from_slice(&record.amount.to_le_bytes()),
        signature: Bytes::copy_from_slice(record.signature.as_slice()),
        index: Bytes::copy_from_slice(&index.to_le_bytes()),
    };
    event.encode_data().into()
}

/// Deposit contract log, in the shape `eth_getLogs` returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Set once the deposit has been included in a block.
    pub block_number: Option<U64>,
    pub transaction_hash: B256,
    pub transaction_index: U64,
    /// Set once the deposit has been included in a block.
    pub block_hash: Option<B256>,
    pub log_index: U64,
    pub removed: bool,
}

impl LogEntry {
    pub fn deposit(record: &DepositRecord, index: u64, contract: Address) -> Self {
        Self {
            address: contract,
            topics: vec![DepositEvent::SIGNATURE_HASH],
            data: encode_deposit_data(record, index),
            block_number: None,
            transaction_hash: B256::ZERO,
            transaction_index: U64::from(PLACEHOLDER_TX_INDEX),
            block_hash: None,
            log_index: U64::from(PLACEHOLDER_LOG_INDEX),
            removed: false,
        }
    }

    pub fn is_included(&self) -> bool {
        self.block_hash.is_some() && self.block_number.is_some()
    }

    pub(crate) fn include(&mut self, block_hash: B256, block_number: u64) {
        self.block_hash = Some(block_hash);
        self.block_number = Some(U64::from(block_number));
    }
}

/// Builds one log per deposit, indexed by position.
pub fn deposit_logs(deposits: &[DepositRecord], contract: Address) -> Vec<LogEntry> {
    deposits
        .iter()
        .enumerate()
        .map(|(index, record)| LogEntry::deposit(record, index as u64, contract))
        .collect()
}
