//! Transaction building, submission, and confirmation monitoring.
//!
//! # Responsibilities
//! - Build requests with fixed, explicit EIP-1559, or node-suggested gas
//! - Assign nonces through the per-sender [`NonceManager`]
//! - Broadcast signed transactions without automatic retry
//! - Poll for receipts with backoff, a deadline, and cancellation

use std::time::{Duration, Instant};

use alloy::primitives::{Address, Bytes, TxHash};

use crate::chain::codec::encode_transaction;
use crate::chain::connection::{CallRequest, ChainConnection};
use crate::chain::nonce::NonceManager;
use crate::chain::types::{
    Amount, FacadeError, FacadeResult, FeeFields, GasPolicy, Receipt, SignedTransaction,
    TransactionRequest, TxStatus,
};
use crate::config::ReceiptConfig;
use crate::lifecycle::CancelToken;
use crate::observability::metrics::record_submission;
use crate::resilience::backoff::PollBackoff;
use crate::resilience::timeouts::remaining;

/// What the caller wants to happen; the builder fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub chain_id: u64,
    pub from: Address,
    /// `None` deploys `payload` as contract code.
    pub to: Option<Address>,
    pub value: Amount,
    pub payload: Bytes,
    pub gas_policy: GasPolicy,
}

/// Receipt polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptWait {
    pub poll_interval: Duration,
    /// Ceiling for the growing poll interval.
    pub max_poll_interval: Duration,
    pub timeout: Duration,
}

impl From<&ReceiptConfig> for ReceiptWait {
    fn from(config: &ReceiptConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_interval: Duration::from_millis(config.max_poll_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Resolve gas and fees, then assign a nonce.
///
/// The nonce is taken last so a failed estimate never consumes one.
pub async fn build_transaction(
    conn: &dyn ChainConnection,
    nonces: &NonceManager,
    intent: TransferIntent,
) -> FacadeResult<TransactionRequest> {
    let (gas_limit, fees) = match intent.gas_policy {
        GasPolicy::Fixed {
            gas_price,
            gas_limit,
        } => (gas_limit, FeeFields::Legacy { gas_price }),
        GasPolicy::FeeMarket {
            tip_cap,
            fee_cap,
            gas_limit,
        } => {
            if tip_cap > fee_cap {
                return Err(FacadeError::InvalidArgument(format!(
                    "tip cap {} exceeds fee cap {}",
                    tip_cap, fee_cap
                )));
            }
            (gas_limit, FeeFields::Dynamic { tip_cap, fee_cap })
        }
        GasPolicy::Estimate => {
            let gas_limit = conn
                .estimate_gas(CallRequest {
                    from: Some(intent.from),
                    to: intent.to,
                    value: Some(intent.value),
                    data: intent.payload.clone(),
                    ..Default::default()
                })
                .await?;
            let gas_price = conn.gas_price().await?;
            let tip_cap = conn.max_priority_fee().await?;
            let fee_cap = gas_price.checked_add(tip_cap).ok_or_else(|| {
                FacadeError::Estimation(format!(
                    "fee cap overflows: gas price {} plus tip {}",
                    gas_price, tip_cap
                ))
            })?;

            tracing::debug!(
                gas_limit = gas_limit,
                tip_cap = tip_cap,
                fee_cap = fee_cap,
                "Using node-suggested gas"
            );
            (gas_limit, FeeFields::Dynamic { tip_cap, fee_cap })
        }
    };

    let from = intent.from;
    let nonce = nonces
        .next(from, || async move { conn.pending_nonce(from).await })
        .await?;

    tracing::info!(
        from = %from,
        to = ?intent.to,
        nonce = nonce,
        gas_limit = gas_limit,
        "Built transaction"
    );

    Ok(TransactionRequest {
        chain_id: intent.chain_id,
        from,
        to: intent.to,
        nonce,
        gas_limit,
        fees,
        value: intent.value,
        payload: intent.payload,
    })
}

/// Broadcast a signed transaction.
///
/// A refusal by the node drops the sender's cached nonce so the next build
/// re-reads it from the chain. When the node could not be reached the nonce
/// is released for reuse.
pub async fn submit_transaction(
    conn: &dyn ChainConnection,
    nonces: &NonceManager,
    signed: &SignedTransaction,
) -> FacadeResult<TxHash> {
    let raw = Bytes::from(encode_transaction(signed));

    match conn.send_raw_transaction(raw).await {
        Ok(hash) => {
            record_submission("accepted");
            tracing::info!(tx_hash = %hash, nonce = signed.nonce(), "Transaction submitted");
            Ok(hash)
        }
        Err(e) => {
            record_submission("rejected");
            tracing::warn!(tx_hash = %signed.hash(), error = %e, "Transaction submission failed");
            if let Ok(sender) = signed.recover_sender() {
                match e {
                    FacadeError::Rejected(_) => nonces.reset(sender).await,
                    FacadeError::Connection(_) | FacadeError::Timeout(_) => {
                        nonces.release(sender, signed.nonce()).await
                    }
                    _ => {}
                }
            }
            Err(e)
        }
    }
}

/// Poll until the receipt appears, the deadline passes, or `cancel` fires.
///
/// The first poll is immediate. Later polls back off from
/// `poll_interval` up to `max_poll_interval`, never sleeping past the
/// deadline. Transport errors while polling are logged and polling goes on.
pub async fn await_receipt(
    conn: &dyn ChainConnection,
    hash: TxHash,
    wait: ReceiptWait,
    mut cancel: CancelToken,
) -> FacadeResult<Receipt> {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + wait.timeout;
    let mut backoff = PollBackoff::new(wait.poll_interval, wait.max_poll_interval);

    loop {
        if cancel.is_cancelled() {
            return Err(FacadeError::Cancelled);
        }
        let left = remaining(deadline);
        if left.is_zero() {
            tracing::warn!(tx_hash = %hash, timeout = ?wait.timeout, "Receipt wait timed out");
            return Err(FacadeError::Timeout(wait.timeout));
        }

        let polled = tokio::select! {
            polled = tokio::time::timeout(left, conn.receipt(hash)) => polled,
            _ = cancel.cancelled() => return Err(FacadeError::Cancelled),
        };

        match polled {
            Ok(Ok(Some(receipt))) => {
                tracing::info!(
                    tx_hash = %hash,
                    success = receipt.success,
                    block = ?receipt.block_number,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Receipt received"
                );
                return Ok(receipt);
            }
            Ok(Ok(None)) => {
                tracing::debug!(tx_hash = %hash, "Transaction pending");
            }
            Ok(Err(FacadeError::Connection(reason))) => {
                tracing::warn!(tx_hash = %hash, error = %reason, "Receipt poll failed");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(FacadeError::Timeout(wait.timeout)),
        }

        let delay = backoff.next_delay().min(remaining(deadline));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(FacadeError::Cancelled),
        }
    }
}

/// Current status as seen by the node.
pub async fn transaction_status(conn: &dyn ChainConnection, hash: TxHash) -> FacadeResult<TxStatus> {
    if let Some(receipt) = conn.receipt(hash).await? {
        return Ok(TxStatus::Mined {
            success: receipt.success,
        });
    }
    if conn.transaction_known(hash).await? {
        Ok(TxStatus::Pending)
    } else {
        Ok(TxStatus::Dropped)
    }
}
