//! Event log decoding and live subscriptions.
//!
//! # Responsibilities
//! - Decode ERC-20 `Transfer`/`Approval` logs from topics and data
//! - Dispatch logs to decoders by signature hash (`EventRegistry`)
//! - Forward a live log stream to the caller with an observable error state

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Event;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

use crate::chain::connection::LogStream;
use crate::chain::types::{
    ApprovalEvent, FacadeError, FacadeResult, LogEvent, TransferEvent,
};
use crate::lifecycle::{CancelHandle, CancelToken};

sol! {
    /// ERC-20 token transfer.
    #[derive(Debug)]
    event Transfer(address indexed from, address indexed to, uint256 value);

    /// ERC-20 allowance change.
    #[derive(Debug)]
    event Approval(address indexed owner, address indexed spender, uint256 value);
}

/// Keccak hash of `Transfer(address,address,uint256)`.
pub const TRANSFER_SIGNATURE_HASH: B256 = Transfer::SIGNATURE_HASH;

/// Keccak hash of `Approval(address,address,uint256)`.
pub const APPROVAL_SIGNATURE_HASH: B256 = Approval::SIGNATURE_HASH;

/// Split a three-topic, one-word ERC-20 style log after checking its signature.
fn two_addresses_and_amount(
    log: &LogEvent,
    expected: B256,
    name: &str,
) -> FacadeResult<(Address, Address, U256)> {
    if log.topics.len() < 3 {
        return Err(FacadeError::Decode(format!(
            "{} log needs 3 topics, got {}",
            name,
            log.topics.len()
        )));
    }
    if log.topics[0] != expected {
        return Err(FacadeError::Decode(format!(
            "topic0 {} is not the {} signature {}",
            log.topics[0], name, expected
        )));
    }
    if log.data.len() < 32 {
        return Err(FacadeError::Decode(format!(
            "{} data must hold a 32-byte amount, got {} bytes",
            name,
            log.data.len()
        )));
    }

    let first = Address::from_word(log.topics[1]);
    let second = Address::from_word(log.topics[2]);
    let amount = U256::from_be_slice(&log.data[..32]);
    Ok((first, second, amount))
}

/// Decode an ERC-20 `Transfer` log.
pub fn decode_transfer_event(log: &LogEvent) -> FacadeResult<TransferEvent> {
    let (from, to, value) = two_addresses_and_amount(log, TRANSFER_SIGNATURE_HASH, "Transfer")?;
    Ok(TransferEvent { from, to, value })
}

/// Decode an ERC-20 `Approval` log.
pub fn decode_approval_event(log: &LogEvent) -> FacadeResult<ApprovalEvent> {
    let (owner, spender, value) =
        two_addresses_and_amount(log, APPROVAL_SIGNATURE_HASH, "Approval")?;
    Ok(ApprovalEvent {
        owner,
        spender,
        value,
    })
}

/// Result of running a log through the [`EventRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
    /// An event registered by signature; values in declaration order.
    Generic { name: String, values: Vec<DynSolValue> },
}

impl DecodedEvent {
    pub fn name(&self) -> &str {
        match self {
            DecodedEvent::Transfer(_) => "Transfer",
            DecodedEvent::Approval(_) => "Approval",
            DecodedEvent::Generic { name, .. } => name,
        }
    }
}

type Decoder = Arc<dyn Fn(&LogEvent) -> FacadeResult<DecodedEvent> + Send + Sync>;

/// Maps an event signature hash to its decoder.
#[derive(Clone)]
pub struct EventRegistry {
    decoders: HashMap<B256, Decoder>,
}

impl EventRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry preloaded with ERC-20 `Transfer` and `Approval`.
    pub fn erc20() -> Self {
        let mut registry = Self::new();
        registry.register(TRANSFER_SIGNATURE_HASH, |log| {
            decode_transfer_event(log).map(DecodedEvent::Transfer)
        });
        registry.register(APPROVAL_SIGNATURE_HASH, |log| {
            decode_approval_event(log).map(DecodedEvent::Approval)
        });
        registry
    }

    /// Register (or replace) the decoder for `signature_hash`.
    pub fn register<F>(&mut self, signature_hash: B256, decoder: F)
    where
        F: Fn(&LogEvent) -> FacadeResult<DecodedEvent> + Send + Sync + 'static,
    {
        self.decoders.insert(signature_hash, Arc::new(decoder));
    }

    /// Register an event from its human-readable signature, e.g.
    /// `"event Deposit(address indexed who, uint256 amount)"`.
    ///
    /// Returns the signature hash the decoder was registered under.
    pub fn register_signature(&mut self, signature: &str) -> FacadeResult<B256> {
        let event = Event::parse(signature)
            .map_err(|e| FacadeError::InvalidArgument(format!("bad event signature: {}", e)))?;
        if event.anonymous {
            return Err(FacadeError::InvalidArgument(
                "anonymous events have no signature topic".to_string(),
            ));
        }

        let mut params = Vec::with_capacity(event.inputs.len());
        for input in &event.inputs {
            let ty = input
                .resolve()
                .map_err(|e| FacadeError::InvalidArgument(format!("bad event type: {}", e)))?;
            params.push((input.indexed, ty));
        }

        let hash = event.selector();
        let name = event.name.clone();
        self.register(hash, move |log| decode_generic(&name, &params, log));
        Ok(hash)
    }

    pub fn contains(&self, signature_hash: &B256) -> bool {
        self.decoders.contains_key(signature_hash)
    }

    /// Decode one log; `Decode` error if no decoder matches `topics[0]`.
    pub fn decode(&self, log: &LogEvent) -> FacadeResult<DecodedEvent> {
        let topic0 = log
            .topics
            .first()
            .ok_or_else(|| FacadeError::Decode("log has no topics".to_string()))?;
        let decoder = self
            .decoders
            .get(topic0)
            .ok_or_else(|| FacadeError::Decode(format!("no decoder registered for {}", topic0)))?;
        decoder(log)
    }

    /// Decode each log independently; one failure never drops the others.
    pub fn decode_all(&self, logs: &[LogEvent]) -> Vec<FacadeResult<DecodedEvent>> {
        logs.iter().map(|log| self.decode(log)).collect()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::erc20()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("signatures", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decode_generic(
    name: &str,
    params: &[(bool, DynSolType)],
    log: &LogEvent,
) -> FacadeResult<DecodedEvent> {
    let indexed_count = params.iter().filter(|(indexed, _)| *indexed).count();
    if log.topics.len() != indexed_count + 1 {
        return Err(FacadeError::Decode(format!(
            "{} expects {} topics, got {}",
            name,
            indexed_count + 1,
            log.topics.len()
        )));
    }

    let body_types: Vec<DynSolType> = params
        .iter()
        .filter(|(indexed, _)| !*indexed)
        .map(|(_, ty)| ty.clone())
        .collect();
    let body = DynSolType::Tuple(body_types)
        .abi_decode_sequence(&log.data)
        .map_err(|e| FacadeError::Decode(format!("{} data: {}", name, e)))?;
    let mut body = match body {
        DynSolValue::Tuple(values) => values.into_iter(),
        other => vec![other].into_iter(),
    };

    let mut topics = log.topics[1..].iter();
    let mut values = Vec::with_capacity(params.len());
    for (indexed, ty) in params {
        if *indexed {
            let topic = topics
                .next()
                .ok_or_else(|| FacadeError::Decode(format!("{} topics exhausted", name)))?;
            // Dynamic indexed values are stored as their hash
            let value = if ty.is_dynamic() {
                DynSolValue::FixedBytes(*topic, 32)
            } else {
                ty.abi_decode(topic.as_slice())
                    .map_err(|e| FacadeError::Decode(format!("{} topic: {}", name, e)))?
            };
            values.push(value);
        } else {
            let value = body
                .next()
                .ok_or_else(|| FacadeError::Decode(format!("{} data exhausted", name)))?;
            values.push(value);
        }
    }

    Ok(DecodedEvent::Generic {
        name: name.to_string(),
        values,
    })
}

/// Health of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    /// Transport failed or the stream ended; no further events will arrive.
    Failed(String),
    Cancelled,
}

/// Handle to a live log stream.
///
/// Events arrive in chain order. Transport failures move the state to
/// [`SubscriptionState::Failed`] instead of leaving the caller waiting.
#[derive(Debug)]
pub struct LogSubscription {
    events: mpsc::Receiver<LogEvent>,
    state: watch::Receiver<SubscriptionState>,
    cancel: CancelHandle,
}

impl LogSubscription {
    /// Spawn the forwarding task for `stream`.
    pub(crate) fn spawn(mut stream: LogStream, buffer: usize, external: CancelToken) -> Self {
        let (event_tx, events) = mpsc::channel(buffer);
        let (state_tx, state) = watch::channel(SubscriptionState::Active);
        let cancel = CancelHandle::new();
        let mut own_token = cancel.token();
        let mut external = external;

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = own_token.cancelled() => {
                        state_tx.send_replace(SubscriptionState::Cancelled);
                        break;
                    }
                    _ = external.cancelled() => {
                        state_tx.send_replace(SubscriptionState::Cancelled);
                        break;
                    }
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(event)) => {
                        // A full buffer must not hide a cancellation.
                        let delivered = tokio::select! {
                            sent = event_tx.send(event) => sent.is_ok(),
                            _ = own_token.cancelled() => {
                                state_tx.send_replace(SubscriptionState::Cancelled);
                                break;
                            }
                            _ = external.cancelled() => {
                                state_tx.send_replace(SubscriptionState::Cancelled);
                                break;
                            }
                        };
                        if !delivered {
                            tracing::debug!("Log subscriber dropped, stopping forwarder");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Log subscription failed");
                        state_tx.send_replace(SubscriptionState::Failed(e.to_string()));
                        break;
                    }
                    None => {
                        tracing::warn!("Log subscription stream ended");
                        state_tx.send_replace(SubscriptionState::Failed(
                            "subscription stream ended".to_string(),
                        ));
                        break;
                    }
                }
            }
        });

        Self {
            events,
            state,
            cancel,
        }
    }

    /// Next event, or the terminal error once the stream has stopped.
    pub async fn next(&mut self) -> FacadeResult<LogEvent> {
        match self.events.recv().await {
            Some(event) => Ok(event),
            None => match self.state() {
                SubscriptionState::Failed(reason) => Err(FacadeError::Connection(reason)),
                SubscriptionState::Cancelled | SubscriptionState::Active => {
                    Err(FacadeError::Cancelled)
                }
            },
        }
    }

    /// Like [`next`](Self::next) but gives up after `limit`.
    pub async fn next_timeout(&mut self, limit: std::time::Duration) -> FacadeResult<LogEvent> {
        crate::resilience::timeouts::with_timeout(limit, self.next()).await
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.borrow().clone()
    }

    /// Terminal error, if the transport failed.
    pub fn error(&self) -> Option<String> {
        match self.state() {
            SubscriptionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Stop the subscription. Already-buffered events can still be drained.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
