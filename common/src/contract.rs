//! ABI of the parts of the deposit contract the mock answers for.

use crate::merkle::Hash;
use alloy_primitives::{Bytes, B256};
use alloy_sol_types::{sol, SolCall};

sol! {
    event DepositEvent(
        bytes pubkey,
        bytes withdrawal_credentials,
        bytes amount,
        bytes signature,
        bytes index
    );

    function get_deposit_count() external view returns (bytes);
    function get_deposit_root() external view returns (bytes32);
    /// Name of the root getter in older deposit contract releases.
    function get_hash_tree_root() external view returns (bytes32);
}

/// Deposit contract view calls recognised by `eth_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractCall {
    DepositCount,
    DepositRoot,
}

impl ContractCall {
    /// Matches the 4-byte selector at the start of the call data.
    pub fn from_call_data(data: &[u8]) -> Option<Self> {
        let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
        if selector == get_deposit_countCall::SELECTOR {
            Some(Self::DepositCount)
        } else if selector == get_deposit_rootCall::SELECTOR
            || selector == get_hash_tree_rootCall::SELECTOR
        {
            Some(Self::DepositRoot)
        } else {
            None
        }
    }
}

/// Return data of `get_deposit_count()`: the little-endian count wrapped in ABI `bytes`.
pub fn encode_deposit_count(count: [u8; 8]) -> Bytes {
    get_deposit_countCall::abi_encode_returns(&(Bytes::copy_from_slice(&count),)).into()
}

/// Return data of `get_deposit_root()`.
pub fn encode_deposit_root(root: Hash) -> Bytes {
    get_deposit_rootCall::abi_encode_returns(&(B256::from(root),)).into()
}
