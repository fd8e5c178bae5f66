use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Bytes, B256, U64};
use eth1_mock_common::chain::{BlockId, ChainState};
use eth1_mock_common::contract::{encode_deposit_count, encode_deposit_root, ContractCall};
use eth1_mock_common::header::SealedHeader;
use eth1_mock_common::log::LogEntry;
use eth1_mock_common::Error as ChainError;
use jsonrpsee::core::{async_trait, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::INVALID_PARAMS_CODE;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// The only subscription kind served.
pub const NEW_HEADS: &str = "newHeads";

#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    UnknownSelector = -32000,
    NotFound = -32001,
}
impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorCode::UnknownSelector => "Unknown contract method",
            ErrorCode::NotFound => "Block not found",
        };
        write!(f, "{}", message)
    }
}
impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

fn to_error_object<T: ToString>(code: ErrorCode, data: Option<T>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code.code(), code.to_string(), data.map(|d| d.to_string()))
}

fn invalid_params<T: ToString>(message: T) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INVALID_PARAMS_CODE, message.to_string(), None::<()>)
}

fn lookup_error(e: ChainError) -> ErrorObjectOwned {
    match e {
        ChainError::NotFound => to_error_object(ErrorCode::NotFound, None::<String>),
        ChainError::InvalidBlockId(_) => invalid_params(e),
        e => {
            error!("{}", e);
            ErrorObjectOwned::from(jsonrpsee::types::ErrorCode::InternalError)
        },
    }
}

/// Call object of `eth_call`. Only the call data is looked at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(default)]
    pub data: Option<Bytes>,
    /// Newer clients send the call data as `input`.
    #[serde(default)]
    pub input: Option<Bytes>,
}

impl CallRequest {
    fn call_data(&self) -> &[u8] {
        self.input.as_ref().or(self.data.as_ref()).map(|b| &b[..]).unwrap_or_default()
    }
}

#[rpc(server, namespace = "eth")]
pub trait Rpc {
    #[method(name = "getBlockByNumber")]
    async fn get_block_by_number(
        &self, block: String, full_transactions: Option<bool>,
    ) -> Result<SealedHeader, ErrorObjectOwned>;

    #[method(name = "getBlockByHash")]
    async fn get_block_by_hash(
        &self, hash: B256, full_transactions: Option<bool>,
    ) -> Result<SealedHeader, ErrorObjectOwned>;

    #[method(name = "getLogs")]
    async fn get_logs(
        &self, filter: Option<serde_json::Value>,
    ) -> Result<Vec<LogEntry>, ErrorObjectOwned>;

    #[method(name = "call")]
    async fn call(
        &self, request: CallRequest, block: Option<String>,
    ) -> Result<Bytes, ErrorObjectOwned>;

    #[method(name = "blockNumber")]
    async fn block_number(&self) -> Result<U64, ErrorObjectOwned>;

    #[method(name = "chainId")]
    async fn chain_id(&self) -> Result<U64, ErrorObjectOwned>;

    #[subscription(name = "subscribe" => "subscription", unsubscribe = "unsubscribe", item = SealedHeader)]
    async fn subscribe(&self, kind: String) -> SubscriptionResult;
}

/// The eth1 JsonRPC server. Every handler goes through the shared chain lock.
pub struct Eth1Server {
    chain: Arc<Mutex<ChainState>>,
    chain_id: u64,
    head_interval: Duration,
}

impl Eth1Server {
    pub fn new(chain: Arc<Mutex<ChainState>>, chain_id: u64, head_interval: Duration) -> Self {
        Self { chain, chain_id, head_interval }
    }
}

#[async_trait]
impl RpcServer for Eth1Server {
    async fn get_block_by_number(
        &self, block: String, _full_transactions: Option<bool>,
    ) -> Result<SealedHeader, ErrorObjectOwned> {
        debug!(%block, "eth_getBlockByNumber");
        let id: BlockId = block.parse().map_err(lookup_error)?;
        let chain = self.chain.lock().await;
        chain.header_by_number(id).cloned().map_err(lookup_error)
    }

    async fn get_block_by_hash(
        &self, hash: B256, _full_transactions: Option<bool>,
    ) -> Result<SealedHeader, ErrorObjectOwned> {
        debug!(%hash, "eth_getBlockByHash");
        let chain = self.chain.lock().await;
        chain.header_by_hash(hash).cloned().map_err(lookup_error)
    }

    /// The filter is ignored: every log of a ready deposit is returned.
    async fn get_logs(
        &self, _filter: Option<serde_json::Value>,
    ) -> Result<Vec<LogEntry>, ErrorObjectOwned> {
        let chain = self.chain.lock().await;
        debug!(count = chain.ready_count(), "eth_getLogs");
        Ok(chain.ready_logs().to_vec())
    }

    async fn call(
        &self, request: CallRequest, _block: Option<String>,
    ) -> Result<Bytes, ErrorObjectOwned> {
        let data = request.call_data();
        let call = ContractCall::from_call_data(data).ok_or_else(|| {
            let selector = Bytes::copy_from_slice(&data[..data.len().min(4)]);
            to_error_object(ErrorCode::UnknownSelector, Some(selector))
        })?;
        debug!(?call, "eth_call");
        let chain = self.chain.lock().await;
        let output = match call {
            ContractCall::DepositCount => encode_deposit_count(chain.deposit_count()),
            ContractCall::DepositRoot => encode_deposit_root(chain.deposit_root()),
        };
        Ok(output)
    }

    async fn block_number(&self) -> Result<U64, ErrorObjectOwned> {
        let chain = self.chain.lock().await;
        Ok(U64::from(*chain.head_number()))
    }

    async fn chain_id(&self) -> Result<U64, ErrorObjectOwned> {
        Ok(U64::from(self.chain_id))
    }

    /// Pushes the current head on every tick until the client goes away.
    async fn subscribe(&self, pending: PendingSubscriptionSink, kind: String) -> SubscriptionResult {
        if kind != NEW_HEADS {
            pending.reject(invalid_params(format!("unsupported subscription: {kind}"))).await;
            return Ok(());
        }
        let sink = pending.accept().await?;
        debug!(id = ?sink.subscription_id(), "new heads subscription");

        let mut interval = tokio::time::interval(self.head_interval);
        loop {
            tokio::select! {
                _ = sink.closed() => break,
                _ = interval.tick() => {
                    let head = self.chain.lock().await.latest_header().clone();
                    let message = SubscriptionMessage::from_json(&head)?;
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(id = ?sink.subscription_id(), "new heads subscription closed");
        Ok(())
    }
}
