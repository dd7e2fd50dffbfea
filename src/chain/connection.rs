//! Chain connection interface.
//!
//! The facade only talks to the node through this trait, so any transport
//! (HTTP, WebSocket, or an in-process double) can stand behind it.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use futures_util::stream::BoxStream;

use crate::chain::types::{
    BlockSummary, BlockTag, FacadeResult, LogEvent, LogFilter, Receipt, TransactionSummary,
};

/// Call parameters for `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub data: Bytes,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Live log stream handed out by [`ChainConnection::subscribe_logs`].
///
/// The stream ending means the underlying subscription died.
pub type LogStream = BoxStream<'static, FacadeResult<LogEvent>>;

/// Operations the facade needs from a node.
#[async_trait::async_trait]
pub trait ChainConnection: Send + Sync + 'static {
    async fn chain_id(&self) -> FacadeResult<u64>;

    async fn block_number(&self) -> FacadeResult<u64>;

    async fn balance(&self, address: Address, block: BlockTag) -> FacadeResult<U256>;

    async fn code(&self, address: Address, block: BlockTag) -> FacadeResult<Bytes>;

    /// `Ok(None)` when the block does not exist yet.
    async fn block(&self, block: BlockTag) -> FacadeResult<Option<BlockSummary>>;

    async fn block_transactions(
        &self,
        block: BlockTag,
    ) -> FacadeResult<Option<Vec<TransactionSummary>>>;

    async fn call(&self, request: CallRequest, block: BlockTag) -> FacadeResult<Bytes>;

    async fn estimate_gas(&self, request: CallRequest) -> FacadeResult<u64>;

    async fn gas_price(&self) -> FacadeResult<u128>;

    async fn max_priority_fee(&self) -> FacadeResult<u128>;

    /// Next nonce including transactions still in the mempool.
    async fn pending_nonce(&self, address: Address) -> FacadeResult<u64>;

    async fn send_raw_transaction(&self, raw: Bytes) -> FacadeResult<TxHash>;

    /// `true` when the node knows the transaction (mined or pending).
    async fn transaction_known(&self, hash: TxHash) -> FacadeResult<bool>;

    async fn raw_transaction(&self, hash: TxHash) -> FacadeResult<Option<Bytes>>;

    async fn receipt(&self, hash: TxHash) -> FacadeResult<Option<Receipt>>;

    async fn logs(&self, filter: &LogFilter) -> FacadeResult<Vec<LogEvent>>;

    async fn subscribe_logs(&self, filter: &LogFilter) -> FacadeResult<LogStream>;

    /// Endpoint name for logs and diagnostics.
    fn endpoint_name(&self) -> String;
}
