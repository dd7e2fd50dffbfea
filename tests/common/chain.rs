//! In-process chain double for deterministic tests.
//!
//! `MockConnection` keeps all chain state in memory behind a mutex that is
//! never held across an await point. Clones share state, so a test can keep
//! one handle for scripting while the facade owns another.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, Bytes, TxHash, U256};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use eth_facade::chain::codec::decode_transaction;
use eth_facade::chain::connection::{CallRequest, ChainConnection, LogStream};
use eth_facade::chain::types::{
    BlockSummary, BlockTag, FacadeError, FacadeResult, LogEvent, LogFilter, Receipt,
    TransactionSummary,
};

struct ScriptedReceipt {
    /// Polls that still return `None` before the receipt shows up.
    hidden_polls: u32,
    receipt: Receipt,
}

struct Subscriber {
    filter: LogFilter,
    tx: mpsc::UnboundedSender<FacadeResult<LogEvent>>,
}

struct MockState {
    unreachable: bool,
    chain_id: u64,
    block_number: u64,
    balances: HashMap<Address, U256>,
    code: HashMap<Address, Bytes>,
    blocks: BTreeMap<u64, (BlockSummary, Vec<TransactionSummary>)>,
    calls: HashMap<(Address, [u8; 4]), Result<Bytes, String>>,
    estimate: Result<u64, String>,
    gas_price: u128,
    priority_fee: u128,
    pending_nonces: HashMap<Address, u64>,
    rejection: Option<String>,
    sent: Vec<Bytes>,
    known: HashSet<TxHash>,
    raw: HashMap<TxHash, Bytes>,
    receipts: HashMap<TxHash, ScriptedReceipt>,
    receipt_polls: HashMap<TxHash, u32>,
    logs: Vec<LogEvent>,
    subscribers: Vec<Subscriber>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            unreachable: false,
            chain_id: 31337,
            block_number: 0,
            balances: HashMap::new(),
            code: HashMap::new(),
            blocks: BTreeMap::new(),
            calls: HashMap::new(),
            estimate: Ok(21_000),
            gas_price: 1_000_000_000,
            priority_fee: 100_000_000,
            pending_nonces: HashMap::new(),
            rejection: None,
            sent: Vec::new(),
            known: HashSet::new(),
            raw: HashMap::new(),
            receipts: HashMap::new(),
            receipt_polls: HashMap::new(),
            logs: Vec::new(),
            subscribers: Vec::new(),
        }
    }
}

impl MockState {
    fn resolve(&self, tag: BlockTag) -> u64 {
        match tag {
            BlockTag::Latest => self.block_number,
            BlockTag::Pending => self.block_number + 1,
            BlockTag::Earliest => 0,
            BlockTag::Number(n) => n,
        }
    }
}

/// Scriptable [`ChainConnection`] backed by memory.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next call if the transport is marked down.
    fn live(&self) -> FacadeResult<MutexGuard<'_, MockState>> {
        let state = self.state();
        if state.unreachable {
            return Err(FacadeError::Connection("mock endpoint unreachable".into()));
        }
        Ok(state)
    }

    /// Make every call fail with a connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state().chain_id = chain_id;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state().balances.insert(address, balance);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state().code.insert(address, code);
    }

    /// Add a block and advance the head to it if it is newer.
    pub fn insert_block(&self, block: BlockSummary, transactions: Vec<TransactionSummary>) {
        let mut state = self.state();
        state.block_number = state.block_number.max(block.number);
        state.blocks.insert(block.number, (block, transactions));
    }

    /// Script the `eth_call` result for `selector` at `address`.
    ///
    /// `Err` simulates a revert.
    pub fn set_call(&self, address: Address, selector: [u8; 4], result: Result<Bytes, String>) {
        self.state().calls.insert((address, selector), result);
    }

    /// `Err` simulates a reverting simulation.
    pub fn set_estimate_gas(&self, result: Result<u64, String>) {
        self.state().estimate = result;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    pub fn set_priority_fee(&self, fee: u128) {
        self.state().priority_fee = fee;
    }

    pub fn set_pending_nonce(&self, address: Address, nonce: u64) {
        self.state().pending_nonces.insert(address, nonce);
    }

    /// Refuse every following `eth_sendRawTransaction` with `reason`.
    pub fn reject_submissions(&self, reason: &str) {
        self.state().rejection = Some(reason.to_string());
    }

    pub fn accept_submissions(&self) {
        self.state().rejection = None;
    }

    /// Raw bytes of every accepted submission, in order.
    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.state().sent.clone()
    }

    /// Make the node report `hash` as pending.
    pub fn mark_known(&self, hash: TxHash) {
        self.state().known.insert(hash);
    }

    /// Make the receipt for `hash` visible after `hidden_polls` empty polls.
    pub fn publish_receipt_after(&self, hash: TxHash, hidden_polls: u32, success: bool) {
        let mut state = self.state();
        let receipt = Receipt {
            transaction_hash: hash,
            success,
            gas_used: 21_000,
            block_number: Some(state.block_number),
            contract_address: None,
            logs: Vec::new(),
        };
        state.known.insert(hash);
        state.receipts.insert(
            hash,
            ScriptedReceipt {
                hidden_polls,
                receipt,
            },
        );
    }

    /// Number of receipt lookups made for `hash`.
    pub fn receipt_polls(&self, hash: TxHash) -> u32 {
        self.state().receipt_polls.get(&hash).copied().unwrap_or(0)
    }

    /// Store a historical log.
    pub fn push_log(&self, log: LogEvent) {
        let mut state = self.state();
        state.block_number = state.block_number.max(log.block_number);
        state.logs.push(log);
    }

    /// Store a log and deliver it to every matching live subscription.
    pub fn emit_log(&self, log: LogEvent) {
        let mut state = self.state();
        state
            .subscribers
            .retain(|sub| !sub.filter.matches(&log) || sub.tx.send(Ok(log.clone())).is_ok());
        state.block_number = state.block_number.max(log.block_number);
        state.logs.push(log);
    }

    /// Push a transport error into every live subscription and close them.
    pub fn fail_subscriptions(&self, reason: &str) {
        let mut state = self.state();
        for sub in state.subscribers.drain(..) {
            let _ = sub
                .tx
                .send(Err(FacadeError::Connection(reason.to_string())));
        }
    }

    /// Close every live subscription without an error.
    pub fn close_subscriptions(&self) {
        self.state().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        state.subscribers.len()
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MockConnection")
            .field("chain_id", &state.chain_id)
            .field("block_number", &state.block_number)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ChainConnection for MockConnection {
    async fn chain_id(&self) -> FacadeResult<u64> {
        Ok(self.live()?.chain_id)
    }

    async fn block_number(&self) -> FacadeResult<u64> {
        Ok(self.live()?.block_number)
    }

    async fn balance(&self, address: Address, _block: BlockTag) -> FacadeResult<U256> {
        Ok(self.live()?.balances.get(&address).copied().unwrap_or_default())
    }

    async fn code(&self, address: Address, _block: BlockTag) -> FacadeResult<Bytes> {
        Ok(self.live()?.code.get(&address).cloned().unwrap_or_default())
    }

    async fn block(&self, block: BlockTag) -> FacadeResult<Option<BlockSummary>> {
        let state = self.live()?;
        let number = state.resolve(block);
        Ok(state.blocks.get(&number).map(|(summary, _)| summary.clone()))
    }

    async fn block_transactions(
        &self,
        block: BlockTag,
    ) -> FacadeResult<Option<Vec<TransactionSummary>>> {
        let state = self.live()?;
        let number = state.resolve(block);
        Ok(state.blocks.get(&number).map(|(_, txs)| txs.clone()))
    }

    async fn call(&self, request: CallRequest, _block: BlockTag) -> FacadeResult<Bytes> {
        let state = self.live()?;
        let Some(to) = request.to else {
            return Err(FacadeError::InvalidArgument("call without a target".into()));
        };
        if request.data.len() < 4 {
            return Ok(Bytes::new());
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&request.data[..4]);

        match state.calls.get(&(to, selector)) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(reason)) => Err(FacadeError::Rejected(reason.clone())),
            None => Ok(Bytes::new()),
        }
    }

    async fn estimate_gas(&self, _request: CallRequest) -> FacadeResult<u64> {
        self.live()?
            .estimate
            .clone()
            .map_err(FacadeError::Estimation)
    }

    async fn gas_price(&self) -> FacadeResult<u128> {
        Ok(self.live()?.gas_price)
    }

    async fn max_priority_fee(&self) -> FacadeResult<u128> {
        Ok(self.live()?.priority_fee)
    }

    async fn pending_nonce(&self, address: Address) -> FacadeResult<u64> {
        Ok(self
            .live()?
            .pending_nonces
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> FacadeResult<TxHash> {
        let mut state = self.live()?;
        if let Some(reason) = &state.rejection {
            return Err(FacadeError::Rejected(reason.clone()));
        }
        let tx = decode_transaction(&raw)
            .map_err(|e| FacadeError::Rejected(format!("rlp: {}", e)))?;
        let hash = tx.hash();

        state.known.insert(hash);
        state.raw.insert(hash, raw.clone());
        state.sent.push(raw);
        Ok(hash)
    }

    async fn transaction_known(&self, hash: TxHash) -> FacadeResult<bool> {
        let state = self.live()?;
        Ok(state.known.contains(&hash))
    }

    async fn raw_transaction(&self, hash: TxHash) -> FacadeResult<Option<Bytes>> {
        Ok(self.live()?.raw.get(&hash).cloned())
    }

    async fn receipt(&self, hash: TxHash) -> FacadeResult<Option<Receipt>> {
        let mut state = self.live()?;
        *state.receipt_polls.entry(hash).or_insert(0) += 1;

        match state.receipts.get_mut(&hash) {
            Some(scripted) if scripted.hidden_polls == 0 => Ok(Some(scripted.receipt.clone())),
            Some(scripted) => {
                scripted.hidden_polls -= 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn logs(&self, filter: &LogFilter) -> FacadeResult<Vec<LogEvent>> {
        let state = self.live()?;
        let from = filter.from_block.map(|tag| state.resolve(tag)).unwrap_or(0);
        let to = filter
            .to_block
            .map(|tag| state.resolve(tag))
            .unwrap_or(state.block_number);

        let mut logs: Vec<LogEvent> = state
            .logs
            .iter()
            .filter(|log| log.block_number >= from && log.block_number <= to)
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(LogEvent::position);
        Ok(logs)
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> FacadeResult<LogStream> {
        let mut state = self.live()?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            filter: filter.clone(),
            tx,
        });

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    fn endpoint_name(&self) -> String {
        "mock".to_string()
    }
}
