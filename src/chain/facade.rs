//! The client facade: one explicit handle for every chain operation.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy_dyn_abi::DynSolValue;

use crate::chain::codec;
use crate::chain::connection::{CallRequest, ChainConnection};
use crate::chain::contract::{erc20, ContractMethod};
use crate::chain::events::{self, DecodedEvent, EventRegistry, LogSubscription};
use crate::chain::nonce::NonceManager;
use crate::chain::transaction::{self, ReceiptWait, TransferIntent};
use crate::chain::types::{
    AddressKind, Amount, BlockSummary, BlockTag, FacadeError, FacadeResult, LogEvent, LogFilter,
    Receipt, SignedTransaction, TokenMetadata, TransactionRequest, TransactionSummary,
    TransferEvent, TxStatus,
};
use crate::chain::wallet::Wallet;
use crate::config::ReceiptConfig;
use crate::lifecycle::CancelToken;

/// Events buffered between the subscription task and the caller.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Blockchain client facade.
///
/// Cheap to clone; clones share the connection and the nonce cache.
#[derive(Clone)]
pub struct Facade {
    conn: Arc<dyn ChainConnection>,
    nonces: NonceManager,
    registry: EventRegistry,
    receipts: ReceiptConfig,
}

impl Facade {
    pub fn new(conn: Arc<dyn ChainConnection>) -> Self {
        Self {
            conn,
            nonces: NonceManager::new(),
            registry: EventRegistry::erc20(),
            receipts: ReceiptConfig::default(),
        }
    }

    /// Use `config` for the receipt polling ceiling.
    pub fn with_receipt_config(mut self, config: ReceiptConfig) -> Self {
        self.receipts = config;
        self
    }

    /// Replace the decoders used by [`decode_logs`](Self::decode_logs).
    pub fn with_event_registry(mut self, registry: EventRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn event_registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn connection(&self) -> &Arc<dyn ChainConnection> {
        &self.conn
    }

    pub async fn chain_id(&self) -> FacadeResult<u64> {
        self.conn.chain_id().await
    }

    pub async fn block_number(&self) -> FacadeResult<u64> {
        self.conn.block_number().await
    }

    /// Balance in wei; zero for addresses the chain has never seen.
    pub async fn get_balance(&self, address: Address, block: BlockTag) -> FacadeResult<Amount> {
        self.conn.balance(address, block).await
    }

    /// Account or contract, as of the latest block.
    ///
    /// See [`AddressKind`] for why the answer can change over time.
    pub async fn classify_address(&self, address: Address) -> FacadeResult<AddressKind> {
        let code = self.conn.code(address, BlockTag::Latest).await?;
        Ok(AddressKind::from_code(&code))
    }

    pub async fn get_block(&self, block: BlockTag) -> FacadeResult<BlockSummary> {
        self.conn
            .block(block)
            .await?
            .ok_or_else(|| FacadeError::NotFound(format!("block {:?}", block)))
    }

    pub async fn block_transactions(
        &self,
        block: BlockTag,
    ) -> FacadeResult<Vec<TransactionSummary>> {
        self.conn
            .block_transactions(block)
            .await?
            .ok_or_else(|| FacadeError::NotFound(format!("block {:?}", block)))
    }

    /// Read-only call of `signature` on `contract` at the latest block.
    pub async fn call_contract_method(
        &self,
        contract: Address,
        signature: &str,
        args: &[DynSolValue],
    ) -> FacadeResult<Vec<DynSolValue>> {
        let method = ContractMethod::parse(signature)?;
        self.call_method(contract, &method, args).await
    }

    /// Like [`call_contract_method`](Self::call_contract_method) for an
    /// already parsed method.
    pub async fn call_method(
        &self,
        contract: Address,
        method: &ContractMethod,
        args: &[DynSolValue],
    ) -> FacadeResult<Vec<DynSolValue>> {
        let data = method.encode_call(args)?;
        let output = self
            .conn
            .call(
                CallRequest {
                    to: Some(contract),
                    data,
                    ..Default::default()
                },
                BlockTag::Latest,
            )
            .await?;

        tracing::debug!(
            contract = %contract,
            method = %method.signature(),
            output_len = output.len(),
            "Contract call returned"
        );
        method.decode_output(&output)
    }

    pub async fn token_metadata(&self, token: Address) -> FacadeResult<TokenMetadata> {
        let name = self.call_single(token, erc20::NAME, &[]).await?;
        let symbol = self.call_single(token, erc20::SYMBOL, &[]).await?;
        let decimals = self.call_single(token, erc20::DECIMALS, &[]).await?;

        let as_string = |value: DynSolValue, field: &str| match value {
            DynSolValue::String(s) => Ok(s),
            other => Err(FacadeError::Decode(format!(
                "{} returned {:?}, expected a string",
                field, other
            ))),
        };
        let decimals = match decimals {
            DynSolValue::Uint(v, _) => u8::try_from(v)
                .map_err(|_| FacadeError::Decode(format!("decimals {} out of range", v)))?,
            other => {
                return Err(FacadeError::Decode(format!(
                    "decimals returned {:?}, expected uint8",
                    other
                )))
            }
        };

        Ok(TokenMetadata {
            name: as_string(name, "name")?,
            symbol: as_string(symbol, "symbol")?,
            decimals,
        })
    }

    pub async fn token_balance(&self, token: Address, holder: Address) -> FacadeResult<Amount> {
        match self
            .call_single(token, erc20::BALANCE_OF, &[DynSolValue::Address(holder)])
            .await?
        {
            DynSolValue::Uint(balance, _) => Ok(balance),
            other => Err(FacadeError::Decode(format!(
                "balanceOf returned {:?}, expected uint256",
                other
            ))),
        }
    }

    async fn call_single(
        &self,
        contract: Address,
        signature: &str,
        args: &[DynSolValue],
    ) -> FacadeResult<DynSolValue> {
        self.call_contract_method(contract, signature, args)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FacadeError::Decode(format!("{} returned no values", signature)))
    }

    /// Resolve gas and nonce for `intent`.
    pub async fn build_transaction(&self, intent: TransferIntent) -> FacadeResult<TransactionRequest> {
        transaction::build_transaction(self.conn.as_ref(), &self.nonces, intent).await
    }

    /// Sign `request` with `wallet`.
    ///
    /// On failure the request's nonce is released so the next build reuses it.
    pub async fn sign_transaction(
        &self,
        request: &TransactionRequest,
        wallet: &Wallet,
    ) -> FacadeResult<SignedTransaction> {
        match wallet.sign_transaction(request) {
            Ok(signed) => Ok(signed),
            Err(e) => {
                self.release_nonce(request).await;
                Err(e)
            }
        }
    }

    /// Return the nonce of a built request that will not be submitted.
    pub async fn release_nonce(&self, request: &TransactionRequest) {
        self.nonces.release(request.from, request.nonce).await;
    }

    pub async fn submit_transaction(&self, signed: &SignedTransaction) -> FacadeResult<TxHash> {
        transaction::submit_transaction(self.conn.as_ref(), &self.nonces, signed).await
    }

    /// Convenience: build, sign, and submit a plain value transfer.
    pub async fn transfer(
        &self,
        wallet: &Wallet,
        to: Address,
        value: U256,
        gas_policy: crate::chain::types::GasPolicy,
    ) -> FacadeResult<TxHash> {
        let chain_id = self.conn.chain_id().await?;
        let request = self
            .build_transaction(TransferIntent {
                chain_id,
                from: wallet.address(),
                to: Some(to),
                value,
                payload: Bytes::new(),
                gas_policy,
            })
            .await?;
        let signed = self.sign_transaction(&request, wallet).await?;
        self.submit_transaction(&signed).await
    }

    /// Wait for the receipt of `hash`.
    ///
    /// The poll interval grows from `poll_interval` up to the configured
    /// ceiling.
    pub async fn await_receipt(
        &self,
        hash: TxHash,
        poll_interval: Duration,
        timeout: Duration,
        cancel: CancelToken,
    ) -> FacadeResult<Receipt> {
        let ceiling = Duration::from_millis(self.receipts.max_poll_interval_ms);
        let wait = ReceiptWait {
            poll_interval,
            max_poll_interval: ceiling.max(poll_interval),
            timeout,
        };
        transaction::await_receipt(self.conn.as_ref(), hash, wait, cancel).await
    }

    /// [`await_receipt`](Self::await_receipt) with the configured schedule.
    pub async fn await_receipt_default(
        &self,
        hash: TxHash,
        cancel: CancelToken,
    ) -> FacadeResult<Receipt> {
        let wait = ReceiptWait::from(&self.receipts);
        transaction::await_receipt(self.conn.as_ref(), hash, wait, cancel).await
    }

    pub async fn transaction_status(&self, hash: TxHash) -> FacadeResult<TxStatus> {
        transaction::transaction_status(self.conn.as_ref(), hash).await
    }

    /// Historical logs in chain order. Calling twice with the same filter
    /// over a finalized range returns the same sequence.
    pub async fn fetch_logs(&self, filter: &LogFilter) -> FacadeResult<Vec<LogEvent>> {
        let mut logs = self.conn.logs(filter).await?;
        logs.sort_by_key(LogEvent::position);
        tracing::debug!(count = logs.len(), "Fetched logs");
        Ok(logs)
    }

    /// Live logs matching `filter` until cancelled or the transport fails.
    pub async fn subscribe_logs(
        &self,
        filter: &LogFilter,
        cancel: CancelToken,
    ) -> FacadeResult<LogSubscription> {
        let stream = self.conn.subscribe_logs(filter).await?;
        tracing::info!(endpoint = %self.conn.endpoint_name(), "Log subscription opened");
        Ok(LogSubscription::spawn(stream, SUBSCRIPTION_BUFFER, cancel))
    }

    pub fn decode_transfer_event(&self, log: &LogEvent) -> FacadeResult<TransferEvent> {
        events::decode_transfer_event(log)
    }

    /// One result per log; failures do not stop the batch.
    pub fn decode_logs(&self, logs: &[LogEvent]) -> Vec<FacadeResult<DecodedEvent>> {
        self.registry.decode_all(logs)
    }

    pub fn encode_transaction(&self, signed: &SignedTransaction) -> Vec<u8> {
        codec::encode_transaction(signed)
    }

    pub fn decode_transaction(&self, raw: &[u8]) -> FacadeResult<SignedTransaction> {
        codec::decode_transaction(raw)
    }

    /// Network encoding of a transaction the node already knows.
    pub async fn raw_transaction(&self, hash: TxHash) -> FacadeResult<Vec<u8>> {
        self.conn
            .raw_transaction(hash)
            .await?
            .map(|raw| raw.to_vec())
            .ok_or_else(|| FacadeError::NotFound(format!("transaction {}", hash)))
    }
}

impl std::fmt::Debug for Facade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("endpoint", &self.conn.endpoint_name())
            .field("receipts", &self.receipts)
            .finish_non_exhaustive()
    }
}
