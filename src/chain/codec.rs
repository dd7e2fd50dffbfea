//! Network encoding of signed transactions.
//!
//! Legacy transactions are plain RLP lists; typed transactions are a type
//! byte followed by the RLP payload (EIP-2718). The bytes produced here are
//! exactly what `eth_sendRawTransaction` accepts.

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::{Decodable2718, Encodable2718};

use crate::chain::types::{FacadeError, FacadeResult, SignedTransaction};

/// Encode a signed transaction for broadcast.
pub fn encode_transaction(tx: &SignedTransaction) -> Vec<u8> {
    tx.envelope().encoded_2718()
}

/// Decode broadcast bytes back into a signed transaction.
///
/// Input must contain exactly one transaction; truncated input and trailing
/// bytes are both rejected.
pub fn decode_transaction(raw: &[u8]) -> FacadeResult<SignedTransaction> {
    if raw.is_empty() {
        return Err(FacadeError::MalformedData("empty transaction bytes".into()));
    }

    let mut buf = raw;
    let envelope = TxEnvelope::decode_2718(&mut buf)
        .map_err(|e| FacadeError::MalformedData(format!("invalid transaction encoding: {}", e)))?;

    if !buf.is_empty() {
        return Err(FacadeError::MalformedData(format!(
            "{} trailing bytes after transaction",
            buf.len()
        )));
    }

    Ok(SignedTransaction::new(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{FeeFields, TransactionRequest};
    use crate::chain::wallet::Wallet;
    use alloy::primitives::{Address, Bytes, U256};

    fn signed(fees: FeeFields) -> (Wallet, SignedTransaction) {
        let wallet = Wallet::random();
        let request = TransactionRequest {
            chain_id: 5,
            from: wallet.address(),
            to: Some(Address::repeat_byte(0xaa)),
            nonce: 3,
            gas_limit: 60_000,
            fees,
            value: U256::from(12_345u64),
            payload: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        };
        let tx = wallet.sign_transaction(&request).unwrap();
        (wallet, tx)
    }

    #[test]
    fn test_dynamic_fee_round_trip() {
        let (wallet, tx) = signed(FeeFields::Dynamic {
            tip_cap: 2,
            fee_cap: 100,
        });
        let raw = encode_transaction(&tx);
        assert_eq!(raw[0], 0x02);

        let decoded = decode_transaction(&raw).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
        assert_eq!(decoded.recover_sender().unwrap(), wallet.address());
        assert_eq!(decoded.input().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_legacy_round_trip() {
        let (_, tx) = signed(FeeFields::Legacy { gas_price: 7 });
        let raw = encode_transaction(&tx);
        // RLP list prefix, no type byte
        assert!(raw[0] >= 0xc0);

        let decoded = decode_transaction(&raw).unwrap();
        assert_eq!(decoded.hash(), tx.hash());
        assert_eq!(decoded.value(), U256::from(12_345u64));
    }

    #[test]
    fn test_truncated_input() {
        let (_, tx) = signed(FeeFields::Legacy { gas_price: 7 });
        let raw = encode_transaction(&tx);

        let result = decode_transaction(&raw[..raw.len() - 10]);
        assert!(matches!(result, Err(FacadeError::MalformedData(_))));
    }

    #[test]
    fn test_trailing_bytes() {
        let (_, tx) = signed(FeeFields::Dynamic {
            tip_cap: 1,
            fee_cap: 1,
        });
        let mut raw = encode_transaction(&tx);
        raw.push(0x00);

        let result = decode_transaction(&raw);
        assert!(matches!(result, Err(FacadeError::MalformedData(_))));
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(matches!(
            decode_transaction(&[]),
            Err(FacadeError::MalformedData(_))
        ));
        assert!(matches!(
            decode_transaction(&[0x7f, 0x01, 0x02]),
            Err(FacadeError::MalformedData(_))
        ));
    }
}
