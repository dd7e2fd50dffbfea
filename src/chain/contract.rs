//! Read-only contract calls described by human-readable signatures.

use alloy::primitives::Bytes;
use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Function;

use crate::chain::types::{FacadeError, FacadeResult};

/// ERC-20 read methods used by the token helpers.
pub mod erc20 {
    pub const NAME: &str = "name() returns (string)";
    pub const SYMBOL: &str = "symbol() returns (string)";
    pub const DECIMALS: &str = "decimals() returns (uint8)";
    pub const BALANCE_OF: &str = "balanceOf(address) returns (uint256)";
}

/// A parsed function signature with resolved input and output types.
#[derive(Debug, Clone)]
pub struct ContractMethod {
    function: Function,
    inputs: Vec<DynSolType>,
    outputs: Vec<DynSolType>,
}

impl ContractMethod {
    /// Parse e.g. `"balanceOf(address owner) returns (uint256)"`.
    pub fn parse(signature: &str) -> FacadeResult<Self> {
        let function = Function::parse(signature).map_err(|e| {
            FacadeError::InvalidArgument(format!("bad function signature '{}': {}", signature, e))
        })?;

        let resolve = |params: &[alloy_json_abi::Param]| -> FacadeResult<Vec<DynSolType>> {
            params
                .iter()
                .map(|p| {
                    p.resolve().map_err(|e| {
                        FacadeError::InvalidArgument(format!("bad type '{}': {}", p.ty, e))
                    })
                })
                .collect()
        };
        let inputs = resolve(function.inputs.as_slice())?;
        let outputs = resolve(function.outputs.as_slice())?;

        Ok(Self {
            function,
            inputs,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Canonical signature, e.g. `balanceOf(address)`.
    pub fn signature(&self) -> String {
        self.function.signature()
    }

    pub fn selector(&self) -> [u8; 4] {
        self.function.selector().0
    }

    /// Parse textual arguments into values of the declared input types.
    pub fn coerce_args<S: AsRef<str>>(&self, raw: &[S]) -> FacadeResult<Vec<DynSolValue>> {
        if raw.len() != self.inputs.len() {
            return Err(FacadeError::InvalidArgument(format!(
                "{} takes {} arguments, got {}",
                self.name(),
                self.inputs.len(),
                raw.len()
            )));
        }
        self.inputs
            .iter()
            .zip(raw)
            .map(|(ty, text)| {
                ty.coerce_str(text.as_ref()).map_err(|e| {
                    FacadeError::InvalidArgument(format!(
                        "'{}' is not a valid {}: {}",
                        text.as_ref(),
                        ty,
                        e
                    ))
                })
            })
            .collect()
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn encode_call(&self, args: &[DynSolValue]) -> FacadeResult<Bytes> {
        if args.len() != self.inputs.len() {
            return Err(FacadeError::InvalidArgument(format!(
                "{} takes {} arguments, got {}",
                self.name(),
                self.inputs.len(),
                args.len()
            )));
        }
        for (i, (ty, value)) in self.inputs.iter().zip(args).enumerate() {
            if !ty.matches(value) {
                return Err(FacadeError::InvalidArgument(format!(
                    "argument {} of {} must be {}",
                    i,
                    self.name(),
                    ty
                )));
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        Ok(Bytes::from(data))
    }

    /// Decode `eth_call` return bytes into the declared outputs.
    pub fn decode_output(&self, data: &[u8]) -> FacadeResult<Vec<DynSolValue>> {
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        let decoded = DynSolType::Tuple(self.outputs.clone())
            .abi_decode_sequence(data)
            .map_err(|e| {
                FacadeError::Decode(format!(
                    "{} returned {} bytes that do not match its outputs: {}",
                    self.name(),
                    data.len(),
                    e
                ))
            })?;
        match decoded {
            DynSolValue::Tuple(values) => Ok(values),
            other => Ok(vec![other]),
        }
    }
}

/// Render a decoded value for display.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Bytes(b) => format!("0x{}", alloy::primitives::hex::encode(b)),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", alloy::primitives::hex::encode(&word[..(*size).min(32)]))
        }
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        other => format!("{:?}", other),
    }
}
