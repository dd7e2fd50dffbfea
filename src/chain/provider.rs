//! Alloy-backed chain connection with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Map alloy responses into facade domain types
//! - Classify node error responses versus transport failures
//! - Open WebSocket log subscriptions when a `ws_url` is configured

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::consensus::Transaction as ConsensusTx;
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::network::{TransactionBuilder, TransactionResponse};
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{
    Filter, Log, TransactionReceipt, TransactionRequest as RpcTransactionRequest,
};
use alloy::transports::{RpcError, TransportError};
use futures_util::StreamExt;
use tokio::time::timeout;

use crate::chain::connection::{CallRequest, ChainConnection, LogStream};
use crate::chain::types::{
    BlockSummary, BlockTag, ChainConfig, FacadeError, FacadeResult, LogEvent, LogFilter,
    Receipt, TransactionSummary,
};
use crate::observability::metrics;

type SharedProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC connection with failover support.
#[derive(Clone)]
pub struct AlloyConnection {
    /// List of providers (primary + failovers).
    providers: Vec<SharedProvider>,
    /// Configuration.
    config: ChainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl AlloyConnection {
    /// Create a new connection.
    ///
    /// Fails only on an unparseable primary URL; an unreachable node is
    /// reported per request so callers can degrade gracefully.
    pub async fn connect(config: ChainConfig) -> FacadeResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            FacadeError::Connection(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as SharedProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as SharedProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let connection = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match connection.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Chain connection initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Chain connection initialized but chain verification failed"
                );
            }
        }

        Ok(connection)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> FacadeResult<()> {
        let actual = self.chain_id().await?;
        if actual != self.config.chain_id {
            return Err(FacadeError::InvalidArgument(format!(
                "configured chain id {} but node reports {}",
                self.config.chain_id, actual
            )));
        }
        Ok(())
    }

    /// Check if the node is reachable.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.block_number().await.is_ok();
        metrics::record_endpoint_health(&self.config.rpc_url, healthy);
        healthy
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run one RPC against each provider in turn.
    ///
    /// A JSON-RPC error response means the node answered, so it is classified
    /// with `on_response` and returned without trying the next provider.
    async fn request<T, F, Fut>(
        &self,
        method: &'static str,
        on_response: fn(String) -> FacadeError,
        op: F,
    ) -> FacadeResult<T>
    where
        F: Fn(SharedProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let start = Instant::now();
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => {
                    metrics::record_rpc(method, "ok", start);
                    return Ok(result);
                }
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    metrics::record_rpc(method, "error_response", start);
                    tracing::debug!(method, code = payload.code, message = %payload.message, "Node returned error");
                    return Err(on_response(payload.message.to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }
        metrics::record_rpc(method, "unreachable", start);
        Err(FacadeError::Connection(format!(
            "All RPC providers failed for {}",
            method
        )))
    }
}

/// Node replies meaning the transaction is already in its pool.
fn is_already_known(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already known")
        || message.contains("known transaction")
        || message.contains("alreadyknown")
}

fn block_id(tag: BlockTag) -> BlockId {
    BlockId::Number(BlockNumberOrTag::from(tag))
}

fn to_rpc_request(request: &CallRequest) -> RpcTransactionRequest {
    let mut tx = RpcTransactionRequest::default().with_input(request.data.clone());
    if let Some(from) = request.from {
        tx = tx.with_from(from);
    }
    if let Some(to) = request.to {
        tx = tx.with_to(to);
    }
    if let Some(value) = request.value {
        tx = tx.with_value(value);
    }
    if let Some(fee_cap) = request.max_fee_per_gas {
        tx = tx.with_max_fee_per_gas(fee_cap);
    }
    if let Some(tip_cap) = request.max_priority_fee_per_gas {
        tx = tx.with_max_priority_fee_per_gas(tip_cap);
    }
    tx
}

fn to_rpc_filter(filter: &LogFilter) -> Filter {
    let mut rpc = Filter::new();
    if !filter.addresses.is_empty() {
        rpc = rpc.address(filter.addresses.clone());
    }
    if let Some(from) = filter.from_block {
        rpc = rpc.from_block(BlockNumberOrTag::from(from));
    }
    if let Some(to) = filter.to_block {
        rpc = rpc.to_block(BlockNumberOrTag::from(to));
    }
    for (position, topic) in filter.topics.iter().enumerate() {
        let Some(values) = topic.as_ref().filter(|v| !v.is_empty()) else {
            continue;
        };
        rpc = match position {
            0 => rpc.event_signature(values.clone()),
            1 => rpc.topic1(values.clone()),
            2 => rpc.topic2(values.clone()),
            3 => rpc.topic3(values.clone()),
            _ => rpc,
        };
    }
    rpc
}

fn log_event(log: &Log) -> LogEvent {
    LogEvent {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        transaction_hash: log.transaction_hash,
    }
}

fn to_receipt(receipt: &TransactionReceipt) -> Receipt {
    Receipt {
        transaction_hash: receipt.transaction_hash,
        success: receipt.status(),
        gas_used: receipt.gas_used,
        block_number: receipt.block_number,
        contract_address: receipt.contract_address,
        logs: receipt.inner.logs().iter().map(log_event).collect(),
    }
}

#[async_trait::async_trait]
impl ChainConnection for AlloyConnection {
    async fn chain_id(&self) -> FacadeResult<u64> {
        self.request("eth_chainId", FacadeError::Rejected, |p| async move {
            p.get_chain_id().await
        })
        .await
    }

    async fn block_number(&self) -> FacadeResult<u64> {
        self.request("eth_blockNumber", FacadeError::Rejected, |p| async move {
            p.get_block_number().await
        })
        .await
    }

    async fn balance(&self, address: Address, block: BlockTag) -> FacadeResult<U256> {
        self.request("eth_getBalance", FacadeError::Rejected, |p| async move {
            p.get_balance(address).block_id(block_id(block)).await
        })
        .await
    }

    async fn code(&self, address: Address, block: BlockTag) -> FacadeResult<Bytes> {
        self.request("eth_getCode", FacadeError::Rejected, |p| async move {
            p.get_code_at(address).block_id(block_id(block)).await
        })
        .await
    }

    async fn block(&self, block: BlockTag) -> FacadeResult<Option<BlockSummary>> {
        let found = self
            .request("eth_getBlockByNumber", FacadeError::Rejected, |p| async move {
                p.get_block_by_number(BlockNumberOrTag::from(block)).await
            })
            .await?;

        Ok(found.map(|b| BlockSummary {
            number: b.header.number,
            timestamp: b.header.timestamp,
            difficulty: b.header.difficulty,
            hash: b.header.hash,
            transactions: b.transactions.hashes().collect(),
        }))
    }

    async fn block_transactions(
        &self,
        block: BlockTag,
    ) -> FacadeResult<Option<Vec<TransactionSummary>>> {
        let found = self
            .request("eth_getBlockByNumber", FacadeError::Rejected, |p| async move {
                p.get_block_by_number(BlockNumberOrTag::from(block)).full().await
            })
            .await?;

        Ok(found.map(|b| {
            b.transactions
                .txns()
                .map(|tx| TransactionSummary {
                    hash: TransactionResponse::tx_hash(tx),
                    from: TransactionResponse::from(tx),
                    to: ConsensusTx::to(tx),
                    value: ConsensusTx::value(tx),
                    gas_limit: ConsensusTx::gas_limit(tx),
                    gas_price: ConsensusTx::gas_price(tx)
                        .unwrap_or_else(|| ConsensusTx::max_fee_per_gas(tx)),
                    nonce: ConsensusTx::nonce(tx),
                    input: ConsensusTx::input(tx).clone(),
                })
                .collect()
        }))
    }

    async fn call(&self, request: CallRequest, block: BlockTag) -> FacadeResult<Bytes> {
        let tx = to_rpc_request(&request);
        self.request("eth_call", FacadeError::Rejected, |p| {
            let tx = tx.clone();
            async move { p.call(tx).block(block_id(block)).await }
        })
        .await
    }

    async fn estimate_gas(&self, request: CallRequest) -> FacadeResult<u64> {
        let tx = to_rpc_request(&request);
        self.request("eth_estimateGas", FacadeError::Estimation, |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await }
        })
        .await
    }

    async fn gas_price(&self) -> FacadeResult<u128> {
        self.request("eth_gasPrice", FacadeError::Rejected, |p| async move {
            p.get_gas_price().await
        })
        .await
    }

    async fn max_priority_fee(&self) -> FacadeResult<u128> {
        self.request("eth_maxPriorityFeePerGas", FacadeError::Rejected, |p| async move {
            p.get_max_priority_fee_per_gas().await
        })
        .await
    }

    async fn pending_nonce(&self, address: Address) -> FacadeResult<u64> {
        self.request("eth_getTransactionCount", FacadeError::Rejected, |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    /// Broadcast to the primary endpoint only.
    ///
    /// A failed broadcast is never replayed on a failover node. A node that
    /// already holds the transaction counts as an acceptance.
    async fn send_raw_transaction(&self, raw: Bytes) -> FacadeResult<TxHash> {
        let method = "eth_sendRawTransaction";
        let start = Instant::now();
        let primary = self
            .providers
            .first()
            .ok_or_else(|| FacadeError::Connection("no RPC provider configured".into()))?;

        match timeout(self.timeout_duration, primary.send_raw_transaction(&raw)).await {
            Ok(Ok(pending)) => {
                metrics::record_rpc(method, "ok", start);
                Ok(*pending.tx_hash())
            }
            Ok(Err(RpcError::ErrorResp(payload))) if is_already_known(&payload.message) => {
                metrics::record_rpc(method, "ok", start);
                let hash = keccak256(&raw);
                tracing::info!(tx_hash = %hash, "Node already holds transaction");
                Ok(hash)
            }
            Ok(Err(RpcError::ErrorResp(payload))) => {
                metrics::record_rpc(method, "error_response", start);
                tracing::debug!(method, code = payload.code, message = %payload.message, "Node returned error");
                Err(FacadeError::Rejected(payload.message.to_string()))
            }
            Ok(Err(e)) => {
                metrics::record_rpc(method, "unreachable", start);
                Err(FacadeError::Connection(format!("{} failed: {}", method, e)))
            }
            Err(_) => {
                metrics::record_rpc(method, "timeout", start);
                Err(FacadeError::Timeout(self.timeout_duration))
            }
        }
    }

    async fn transaction_known(&self, hash: TxHash) -> FacadeResult<bool> {
        let found = self
            .request("eth_getTransactionByHash", FacadeError::Rejected, |p| async move {
                p.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(found.is_some())
    }

    async fn raw_transaction(&self, hash: TxHash) -> FacadeResult<Option<Bytes>> {
        self.request("eth_getRawTransactionByHash", FacadeError::Rejected, |p| async move {
            p.get_raw_transaction_by_hash(hash).await
        })
        .await
    }

    async fn receipt(&self, hash: TxHash) -> FacadeResult<Option<Receipt>> {
        let found = self
            .request("eth_getTransactionReceipt", FacadeError::Rejected, |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(found.as_ref().map(to_receipt))
    }

    async fn logs(&self, filter: &LogFilter) -> FacadeResult<Vec<LogEvent>> {
        let rpc_filter = to_rpc_filter(filter);
        let logs = self
            .request("eth_getLogs", FacadeError::Rejected, |p| {
                let rpc_filter = rpc_filter.clone();
                async move { p.get_logs(&rpc_filter).await }
            })
            .await?;

        let mut events: Vec<LogEvent> = logs.iter().filter(|l| !l.removed).map(log_event).collect();
        events.sort_by_key(LogEvent::position);
        Ok(events)
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> FacadeResult<LogStream> {
        let ws_url = self.config.ws_url.clone().ok_or_else(|| {
            FacadeError::Connection("no ws_url configured for log subscriptions".to_string())
        })?;

        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url.clone()))
            .await
            .map_err(|e| FacadeError::Connection(format!("WebSocket connect failed: {}", e)))?;

        let subscription = provider
            .subscribe_logs(&to_rpc_filter(filter))
            .await
            .map_err(|e| FacadeError::Connection(format!("eth_subscribe failed: {}", e)))?;

        tracing::debug!(ws_url = %ws_url, "WebSocket log subscription established");

        // The provider owns the WebSocket backend; keep it alive with the stream.
        let stream = subscription.into_stream().map(move |log| {
            let _backend = &provider;
            Ok(log_event(&log))
        });
        Ok(stream.boxed())
    }

    fn endpoint_name(&self) -> String {
        self.config.rpc_url.clone()
    }
}

impl std::fmt::Debug for AlloyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyConnection")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
