//! Validation data returned by accounts and paymasters.
//!
//! Validation data is passed around typed, but it also has a packed 256-bit form that off-chain
//! tooling and simulation results use:
//!
//! ```text
//! bits   0..160  authorizer: 0 = valid, 1 = signature failed, otherwise the aggregator address
//! bits 160..208  validUntil (0 = no expiry)
//! bits 208..256  validAfter
//! ```

use alloy_primitives::{Address, U256};

use crate::constants::limits::MAX_TIMESTAMP;

/// Who vouches for the signature of a user operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Authorizer {
    /// The signature was verified by the callee.
    #[default]
    Valid,
    /// The signature did not verify. The callee did not revert so simulation stays cheap.
    SignatureFailed,
    /// The signature is verified in bulk by this aggregator.
    Aggregator(Address),
}

/// Result of an account or paymaster validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ValidationData {
    /// Who vouches for the signature.
    pub authorizer: Authorizer,
    /// Timestamp after which the operation is no longer valid. Zero means no expiry.
    pub valid_until: u64,
    /// Timestamp from which the operation is valid.
    pub valid_after: u64,
}

impl ValidationData {
    const SIG_FAILED: Address = Address::with_last_byte(1);

    /// Valid signature, no time restriction.
    pub const fn valid() -> Self {
        Self { authorizer: Authorizer::Valid, valid_until: 0, valid_after: 0 }
    }

    /// Failed signature, no time restriction.
    pub const fn signature_failed() -> Self {
        Self { authorizer: Authorizer::SignatureFailed, valid_until: 0, valid_after: 0 }
    }

    /// Signature checked by `aggregator`, no time restriction.
    pub const fn aggregated(aggregator: Address) -> Self {
        Self { authorizer: Authorizer::Aggregator(aggregator), valid_until: 0, valid_after: 0 }
    }

    /// Restricts the validity window to `[valid_after, valid_until]`.
    pub const fn with_window(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.valid_after = valid_after;
        self.valid_until = valid_until;
        self
    }

    /// Whether `timestamp` falls inside the validity window.
    pub const fn is_valid_at(&self, timestamp: u64) -> bool {
        let until = if self.valid_until == 0 { u64::MAX } else { self.valid_until };
        timestamp >= self.valid_after && timestamp <= until
    }

    /// Packs into the 256-bit word layout.
    pub fn pack(&self) -> U256 {
        let authorizer = match self.authorizer {
            Authorizer::Valid => Address::ZERO,
            Authorizer::SignatureFailed => Self::SIG_FAILED,
            Authorizer::Aggregator(aggregator) => aggregator,
        };
        let until = U256::from(self.valid_until & MAX_TIMESTAMP);
        let after = U256::from(self.valid_after & MAX_TIMESTAMP);
        U256::from_be_slice(authorizer.as_slice()) | (until << 160) | (after << 208)
    }

    /// Unpacks from the 256-bit word layout.
    pub fn parse(packed: U256) -> Self {
        let bytes = packed.to_be_bytes::<32>();
        let address = Address::from_slice(&bytes[12..]);
        let authorizer = if address.is_zero() {
            Authorizer::Valid
        } else if address == Self::SIG_FAILED {
            Authorizer::SignatureFailed
        } else {
            Authorizer::Aggregator(address)
        };
        let mask = U256::from(MAX_TIMESTAMP);
        let valid_until = ((packed >> 160usize) & mask).to::<u64>();
        let valid_after = ((packed >> 208usize) & mask).to::<u64>();
        Self { authorizer, valid_until, valid_after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_pack_parse_keeps_every_field() {
        let aggregator = address!("0x5555555555555555555555555555555555555555");
        for data in [
            ValidationData::valid(),
            ValidationData::signature_failed().with_window(10, 20),
            ValidationData::aggregated(aggregator).with_window(0, MAX_TIMESTAMP),
        ] {
            assert_eq!(ValidationData::parse(data.pack()), data);
        }
    }

    #[test]
    fn test_signature_failed_packs_to_one() {
        assert_eq!(ValidationData::signature_failed().pack(), U256::from(1));
        assert_eq!(ValidationData::valid().pack(), U256::ZERO);
    }

    #[test]
    fn test_window() {
        let data = ValidationData::valid().with_window(100, 200);
        assert!(!data.is_valid_at(99));
        assert!(data.is_valid_at(100));
        assert!(data.is_valid_at(200));
        assert!(!data.is_valid_at(201));
        assert!(ValidationData::valid().is_valid_at(u64::MAX));
    }
}
