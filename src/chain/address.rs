//! Address validation and parsing.

use alloy::primitives::Address;

use crate::chain::types::{FacadeError, FacadeResult};

/// Syntactic check: `0x` followed by exactly 40 hex digits, any case.
///
/// No checksum validation is performed; mixed-case input with a wrong
/// checksum is still accepted.
pub fn is_valid_address(text: &str) -> bool {
    match text.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Parse a textual address, rejecting anything [`is_valid_address`] rejects.
pub fn parse_address(text: &str) -> FacadeResult<Address> {
    if !is_valid_address(text) {
        return Err(FacadeError::Decode(format!(
            "'{}' is not a 0x-prefixed 40 hex digit address",
            text
        )));
    }
    text.parse::<Address>()
        .map_err(|e| FacadeError::Decode(format!("invalid address '{}': {}", text, e)))
}
