//! Chain domain types and error definitions.

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Value in the chain's smallest unit (wei).
///
/// Unsigned 256-bit; use the `checked_*` operations for arithmetic.
pub type Amount = U256;

/// Errors that can occur during facade operations.
#[derive(Debug, Error)]
pub enum FacadeError {
    /// Transport unreachable or the request timed out at the transport level.
    #[error("connection error: {0}")]
    Connection(String),

    /// Block or transaction does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node refused the request.
    #[error("rejected by node: {0}")]
    Rejected(String),

    /// Gas estimation failed because the simulated call would revert.
    #[error("gas estimation failed: {0}")]
    Estimation(String),

    /// Bad key material or a signer that does not match the sender.
    #[error("signing error: {0}")]
    Signing(String),

    /// ABI or log shape mismatch.
    #[error("decode error: {0}")]
    Decode(String),

    /// Raw transaction bytes are truncated or structurally invalid.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Deadline exceeded while waiting for a receipt or subscription event.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Caller-supplied arguments do not fit the declared ABI.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller cancelled the wait.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for facade operations.
pub type FacadeResult<T> = Result<T, FacadeError>;

/// Block selector for state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockTag {
    #[default]
    Latest,
    Pending,
    Earliest,
    Number(u64),
}

impl From<BlockTag> for BlockNumberOrTag {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Pending => BlockNumberOrTag::Pending,
            BlockTag::Earliest => BlockNumberOrTag::Earliest,
            BlockTag::Number(n) => BlockNumberOrTag::Number(n),
        }
    }
}

impl std::str::FromStr for BlockTag {
    type Err = FacadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "pending" => Ok(Self::Pending),
            "earliest" => Ok(Self::Earliest),
            other => {
                let parsed = match other.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => other.parse::<u64>(),
                };
                parsed
                    .map(Self::Number)
                    .map_err(|_| FacadeError::InvalidArgument(format!("invalid block tag '{}'", s)))
            }
        }
    }
}

/// Classification of an address by the code deployed at it.
///
/// This is a snapshot: an address with no code today can receive code later
/// (e.g. a CREATE2 deployment to a precomputed address), and a self-destructed
/// contract can lose it. Callers must not cache the result as permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    Account,
    Contract,
}

impl AddressKind {
    /// Classify from the bytecode currently stored at the address.
    pub fn from_code(code: &[u8]) -> Self {
        if code.is_empty() {
            Self::Account
        } else {
            Self::Contract
        }
    }
}

/// Header fields and transaction hashes of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub number: u64,
    pub timestamp: u64,
    pub difficulty: U256,
    pub hash: B256,
    pub transactions: Vec<TxHash>,
}

/// One transaction as included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Amount,
    pub gas_limit: u64,
    /// Legacy gas price, or the fee cap for dynamic-fee transactions.
    pub gas_price: u128,
    pub nonce: u64,
    pub input: Bytes,
}

/// How gas limit and fees are chosen for a new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPolicy {
    /// Legacy pricing with a fixed gas price.
    Fixed { gas_price: u128, gas_limit: u64 },
    /// EIP-1559 pricing with explicit caps.
    FeeMarket {
        tip_cap: u128,
        fee_cap: u128,
        gas_limit: u64,
    },
    /// EIP-1559 pricing with the gas limit and fees suggested by the node.
    Estimate,
}

/// Fee fields of a built transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeFields {
    Legacy { gas_price: u128 },
    Dynamic { tip_cap: u128, fee_cap: u128 },
}

/// An unsigned intent to transfer value or invoke a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub chain_id: u64,
    pub from: Address,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: FeeFields,
    pub value: Amount,
    pub payload: Bytes,
}

/// A transaction together with its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    envelope: TxEnvelope,
}

impl SignedTransaction {
    pub fn new(envelope: TxEnvelope) -> Self {
        Self { envelope }
    }

    pub fn envelope(&self) -> &TxEnvelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> TxEnvelope {
        self.envelope
    }

    /// Keccak hash of the network encoding.
    pub fn hash(&self) -> TxHash {
        *self.envelope.tx_hash()
    }

    pub fn nonce(&self) -> u64 {
        self.envelope.nonce()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.envelope.chain_id()
    }

    pub fn to(&self) -> Option<Address> {
        self.envelope.to()
    }

    pub fn value(&self) -> Amount {
        self.envelope.value()
    }

    pub fn gas_limit(&self) -> u64 {
        self.envelope.gas_limit()
    }

    pub fn input(&self) -> &Bytes {
        self.envelope.input()
    }

    /// Recover the address that produced the signature.
    pub fn recover_sender(&self) -> FacadeResult<Address> {
        let recovered = match &self.envelope {
            TxEnvelope::Legacy(tx) => tx
                .signature()
                .recover_address_from_prehash(&tx.signature_hash()),
            TxEnvelope::Eip2930(tx) => tx
                .signature()
                .recover_address_from_prehash(&tx.signature_hash()),
            TxEnvelope::Eip1559(tx) => tx
                .signature()
                .recover_address_from_prehash(&tx.signature_hash()),
            TxEnvelope::Eip4844(tx) => tx
                .signature()
                .recover_address_from_prehash(&tx.signature_hash()),
            TxEnvelope::Eip7702(tx) => tx
                .signature()
                .recover_address_from_prehash(&tx.signature_hash()),
        };
        recovered.map_err(|e| FacadeError::Signing(format!("signature recovery failed: {}", e)))
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEvent>,
}

/// Lifecycle of a transaction from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Built,
    Signed,
    Submitted,
    /// Known to the node but not yet mined.
    Pending,
    Mined { success: bool },
    /// Unknown to the node after submission.
    Dropped,
}

/// One emitted contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub address: Address,
    /// `topics[0]` is the event signature hash for non-anonymous events.
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<TxHash>,
}

impl LogEvent {
    /// Chain ordering key: block number, then log index.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Decoded ERC-20 `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: Amount,
}

/// Decoded ERC-20 `Approval` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub owner: Address,
    pub spender: Address,
    pub value: Amount,
}

/// Log filter for range queries and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    /// Positional topic constraints; `None` or an empty set matches anything.
    pub topics: Vec<Option<Vec<B256>>>,
    pub from_block: Option<BlockTag>,
    pub to_block: Option<BlockTag>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Constrain `topics[0]`.
    pub fn event_signature(self, hash: B256) -> Self {
        self.topic(0, vec![hash])
    }

    pub fn topic(mut self, position: usize, values: Vec<B256>) -> Self {
        if self.topics.len() <= position {
            self.topics.resize(position + 1, None);
        }
        self.topics[position] = Some(values);
        self
    }

    pub fn from_block(mut self, tag: BlockTag) -> Self {
        self.from_block = Some(tag);
        self
    }

    pub fn to_block(mut self, tag: BlockTag) -> Self {
        self.to_block = Some(tag);
        self
    }

    /// Address and topic match, ignoring the block range.
    pub fn matches(&self, log: &LogEvent) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            None => true,
            Some(set) if set.is_empty() => true,
            Some(set) => log.topics.get(i).is_some_and(|t| set.contains(t)),
        })
    }
}

/// ERC-20 descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tag_parsing() {
        assert_eq!("latest".parse::<BlockTag>().unwrap(), BlockTag::Latest);
        assert_eq!("0x10".parse::<BlockTag>().unwrap(), BlockTag::Number(16));
        assert_eq!("42".parse::<BlockTag>().unwrap(), BlockTag::Number(42));
        assert!(matches!(
            "soon".parse::<BlockTag>(),
            Err(FacadeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_address_kind_from_code() {
        assert_eq!(AddressKind::from_code(&[]), AddressKind::Account);
        assert_eq!(AddressKind::from_code(&[0x60, 0x80]), AddressKind::Contract);
    }

    #[test]
    fn test_filter_topic_matching() {
        let sig = B256::repeat_byte(1);
        let log = LogEvent {
            address: Address::repeat_byte(7),
            topics: vec![sig, B256::repeat_byte(2)],
            data: Bytes::new(),
            block_number: 1,
            log_index: 0,
            transaction_hash: None,
        };

        assert!(LogFilter::new().matches(&log));
        assert!(LogFilter::new().event_signature(sig).matches(&log));
        assert!(LogFilter::new().topic(1, vec![]).matches(&log));
        assert!(!LogFilter::new().topic(2, vec![sig]).matches(&log));
        assert!(!LogFilter::new().address(Address::ZERO).matches(&log));
    }

    #[test]
    fn test_error_display() {
        let err = FacadeError::Timeout(std::time::Duration::from_secs(3));
        assert_eq!(err.to_string(), "timed out after 3s");

        let err = FacadeError::Rejected("nonce too low".into());
        assert!(err.to_string().contains("nonce too low"));
    }
}
