//! Key loading and transaction signing.
//!
//! # Security
//! - Private keys are loaded from hex strings or an environment variable
//! - Keys are never logged or serialized by the facade
//! - Signing is deterministic (RFC 6979 nonces)

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::primitives::{Address, TxKind, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};

use crate::chain::types::{
    FacadeError, FacadeResult, FeeFields, SignedTransaction, TransactionRequest,
};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "ETH_FACADE_PRIVATE_KEY";

/// A local signing key.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// Accepts keys with or without the `0x` prefix.
    pub fn from_private_key(private_key_hex: &str) -> FacadeResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| FacadeError::Signing(format!("Invalid private key format: {}", e)))?;

        tracing::debug!(address = %signer.address(), "Wallet loaded");

        Ok(Self { signer })
    }

    /// Load wallet from `ETH_FACADE_PRIVATE_KEY`.
    pub fn from_env() -> FacadeResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            FacadeError::Signing(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key)
    }

    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Raw private key as `0x`-prefixed hex, for handing to the user once.
    pub fn private_key_hex(&self) -> String {
        format!("{:#x}", self.signer.to_bytes())
    }

    /// Sign a 32-byte prehash.
    pub fn sign_hash(&self, hash: &B256) -> FacadeResult<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| FacadeError::Signing(format!("Signing failed: {}", e)))
    }

    /// Sign a built transaction request.
    ///
    /// Legacy fee fields produce an EIP-155 transaction; dynamic fee fields
    /// produce an EIP-1559 transaction.
    pub fn sign_transaction(&self, request: &TransactionRequest) -> FacadeResult<SignedTransaction> {
        if request.from != self.address() {
            return Err(FacadeError::Signing(format!(
                "request sender {} does not match wallet {}",
                request.from,
                self.address()
            )));
        }

        let to = match request.to {
            Some(address) => TxKind::Call(address),
            None => TxKind::Create,
        };

        let envelope = match request.fees {
            FeeFields::Legacy { gas_price } => {
                let tx = TxLegacy {
                    chain_id: Some(request.chain_id),
                    nonce: request.nonce,
                    gas_price,
                    gas_limit: request.gas_limit,
                    to,
                    value: request.value,
                    input: request.payload.clone(),
                };
                let signature = self.sign_hash(&tx.signature_hash())?;
                TxEnvelope::from(tx.into_signed(signature))
            }
            FeeFields::Dynamic { tip_cap, fee_cap } => {
                let tx = TxEip1559 {
                    chain_id: request.chain_id,
                    nonce: request.nonce,
                    gas_limit: request.gas_limit,
                    max_fee_per_gas: fee_cap,
                    max_priority_fee_per_gas: tip_cap,
                    to,
                    value: request.value,
                    access_list: Default::default(),
                    input: request.payload.clone(),
                };
                let signature = self.sign_hash(&tx.signature_hash())?;
                TxEnvelope::from(tx.into_signed(signature))
            }
        };

        Ok(SignedTransaction::new(envelope))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
