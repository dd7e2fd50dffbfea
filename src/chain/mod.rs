//! Blockchain client subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → facade.rs (Facade: one explicit handle per node)
//!         → connection.rs (ChainConnection trait)
//!             → provider.rs (alloy HTTP/WS, failover, error classification)
//!     → transaction.rs (gas policy, nonce.rs, submit, receipt polling)
//!     → wallet.rs (key loading, signing) → codec.rs (EIP-2718 bytes)
//!     → events.rs (log decoding, EventRegistry, LogSubscription)
//!     → contract.rs (signature-driven eth_call encoding)
//! ```
//!
//! # Security Constraints
//! - Private keys come from the caller or `ETH_FACADE_PRIVATE_KEY`, never from config files
//! - Never log private keys
//! - Every RPC call has a timeout; every wait has a deadline

pub mod address;
pub mod codec;
pub mod connection;
pub mod contract;
pub mod events;
pub mod facade;
pub mod nonce;
pub mod provider;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use address::{is_valid_address, parse_address};
pub use connection::{CallRequest, ChainConnection};
pub use events::{DecodedEvent, EventRegistry, LogSubscription, SubscriptionState};
pub use facade::Facade;
pub use provider::AlloyConnection;
pub use transaction::{ReceiptWait, TransferIntent};
pub use types::{
    AddressKind, BlockTag, FacadeError, FacadeResult, GasPolicy, LogEvent, LogFilter, TxStatus,
};
pub use wallet::Wallet;
