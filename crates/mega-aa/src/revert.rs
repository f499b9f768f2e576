//! Failure of a call into contract code.

use alloy_primitives::Bytes;
use alloy_sol_types::{decode_revert_reason, Revert as SolRevert, SolError};

/// The reason a call into contract code did not complete.
///
/// A revert unwinds every state change of the reverting frame. The caller decides what a revert
/// means: the entry point turns validation reverts into [`FailedOp`](crate::FailedOp)s and
/// execution reverts into unsuccessful outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Revert {
    /// The callee reverted with the given return data.
    #[error("execution reverted: {}", display_revert_data(.0))]
    Reverted(Bytes),
    /// The callee ran out of gas. All gas given to the frame is consumed.
    #[error("out of gas")]
    OutOfGas,
}

impl Revert {
    /// Creates a revert carrying a Solidity `Error(string)` payload.
    pub fn reason(message: impl Into<String>) -> Self {
        Self::Reverted(SolRevert { reason: message.into() }.abi_encode().into())
    }

    /// Creates a revert with empty return data.
    pub const fn empty() -> Self {
        Self::Reverted(Bytes::new())
    }

    /// Returns the raw revert data. Out-of-gas has none.
    pub fn data(&self) -> Bytes {
        match self {
            Self::Reverted(data) => data.clone(),
            Self::OutOfGas => Bytes::new(),
        }
    }

    /// Decodes a human readable reason from the revert data, if there is one.
    pub fn reason_string(&self) -> Option<String> {
        match self {
            Self::Reverted(data) if !data.is_empty() => decode_reason(data),
            _ => None,
        }
    }

    /// Whether the revert was caused by running out of gas.
    pub const fn is_out_of_gas(&self) -> bool {
        matches!(self, Self::OutOfGas)
    }
}

/// `Error(string)` payloads yield the bare message; anything else goes through the generic decoder.
fn decode_reason(data: &[u8]) -> Option<String> {
    SolRevert::abi_decode(data)
        .map(|revert| revert.reason)
        .ok()
        .or_else(|| decode_revert_reason(data))
}

fn display_revert_data(data: &Bytes) -> String {
    decode_reason(data).unwrap_or_else(|| data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_roundtrip() {
        let revert = Revert::reason("account: wrong signature");
        assert_eq!(revert.reason_string().as_deref(), Some("account: wrong signature"));
        assert_eq!(revert.to_string(), "execution reverted: account: wrong signature");
    }

    #[test]
    fn test_empty_and_out_of_gas_have_no_reason() {
        assert_eq!(Revert::empty().reason_string(), None);
        assert_eq!(Revert::OutOfGas.reason_string(), None);
        assert!(Revert::OutOfGas.data().is_empty());
        assert!(Revert::OutOfGas.is_out_of_gas());
    }

    #[test]
    fn test_reason_uses_solidity_error_encoding() {
        let data = Revert::reason("boom").data();
        assert_eq!(&data[..4], hex::decode("08c379a0").unwrap().as_slice());
        assert_eq!(data.len(), 4 + 32 * 3);
    }

    #[test]
    fn test_custom_error_data_is_displayed_raw() {
        let revert = Revert::Reverted(Bytes::from(hex::decode("ffffffff").unwrap()));
        assert_eq!(revert.reason_string(), None);
        assert_eq!(revert.to_string(), "execution reverted: 0xffffffff");
    }
}
