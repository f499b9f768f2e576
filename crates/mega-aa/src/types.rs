use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        limits::{MAX_FEE_VALUE, MAX_GAS_VALUE},
        pipeline::SPONSORED_VERIFICATION_GAS_MULTIPLIER,
    },
    effective_gas_price, gas_cost,
};

pub use mega_aa_contracts::{MembershipProof, ProofGatedSignature, UserOperation};

/// Block environment the entry point executes in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEnv {
    /// Block number.
    pub number: u64,
    /// Block timestamp, in seconds.
    pub timestamp: u64,
    /// Base fee per gas.
    pub basefee: u64,
}

/// The outcome handed to a paymaster's `post_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostOpMode {
    /// The call payload succeeded.
    OpSucceeded,
    /// The call payload reverted. The paymaster still pays.
    OpReverted,
    /// The first `post_op` call reverted; its effects and the payload's were rolled back.
    PostOpReverted,
}

/// Who pays for a user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMode {
    /// The sender pays from its own deposit.
    SelfFunded,
    /// The paymaster pays from its deposit.
    Sponsored(Address),
}

impl PaymentMode {
    /// The paymaster, if sponsored.
    pub const fn paymaster(&self) -> Option<Address> {
        match self {
            Self::SelfFunded => None,
            Self::Sponsored(paymaster) => Some(*paymaster),
        }
    }
}

/// Derived values of a [`UserOperation`].
pub trait UserOperationExt {
    /// ABI-encodes every field except the signature. Dynamic fields are replaced by their hash.
    fn pack(&self) -> Vec<u8>;

    /// Hash of [`Self::pack`].
    fn hash(&self) -> B256 {
        keccak256(self.pack())
    }

    /// The request identifier, binding the operation to one entry point on one chain.
    fn request_id(&self, entry_point: Address, chain_id: u64) -> B256 {
        keccak256((self.hash(), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// The paymaster sponsoring the operation, if any.
    fn sponsor(&self) -> Option<Address>;

    /// The payment mode of the operation.
    fn payment_mode(&self) -> PaymentMode {
        self.sponsor().map_or(PaymentMode::SelfFunded, PaymentMode::Sponsored)
    }

    /// Whether every gas budget and fee field fits its fixed-width range.
    fn has_valid_gas_values(&self) -> bool;

    /// Call gas limit. Only meaningful after [`Self::has_valid_gas_values`].
    fn call_gas_limit(&self) -> u64;

    /// Verification gas limit. Only meaningful after [`Self::has_valid_gas_values`].
    fn verification_gas_limit(&self) -> u64;

    /// Pre-verification gas. Only meaningful after [`Self::has_valid_gas_values`].
    fn pre_verification_gas(&self) -> u64;

    /// The gas price paid at the given base fee.
    fn gas_price(&self, basefee: u64) -> U256;

    /// The total gas budget the prefund must cover.
    fn required_gas(&self) -> u64 {
        let multiplier =
            if self.sponsor().is_some() { SPONSORED_VERIFICATION_GAS_MULTIPLIER } else { 1 };
        self.call_gas_limit()
            .saturating_add(self.verification_gas_limit().saturating_mul(multiplier))
            .saturating_add(self.pre_verification_gas())
    }

    /// The amount reserved before execution, bounding the worst-case cost.
    fn required_prefund(&self, basefee: u64) -> U256 {
        gas_cost(self.required_gas(), self.gas_price(basefee))
    }
}

impl UserOperationExt for UserOperation {
    fn pack(&self) -> Vec<u8> {
        (
            self.sender,
            self.nonce,
            keccak256(&self.initCode),
            keccak256(&self.callData),
            self.callGas,
            self.verificationGas,
            self.preVerificationGas,
            self.maxFeePerGas,
            self.maxPriorityFeePerGas,
            self.paymaster,
            keccak256(&self.paymasterData),
        )
            .abi_encode()
    }

    fn sponsor(&self) -> Option<Address> {
        (!self.paymaster.is_zero()).then_some(self.paymaster)
    }

    fn has_valid_gas_values(&self) -> bool {
        self.callGas <= MAX_GAS_VALUE &&
            self.verificationGas <= MAX_GAS_VALUE &&
            self.preVerificationGas <= MAX_GAS_VALUE &&
            self.maxFeePerGas <= MAX_FEE_VALUE &&
            self.maxPriorityFeePerGas <= MAX_FEE_VALUE
    }

    fn call_gas_limit(&self) -> u64 {
        self.callGas.saturating_to()
    }

    fn verification_gas_limit(&self) -> u64 {
        self.verificationGas.saturating_to()
    }

    fn pre_verification_gas(&self) -> u64 {
        self.preVerificationGas.saturating_to()
    }

    fn gas_price(&self, basefee: u64) -> U256 {
        effective_gas_price(self.maxFeePerGas, self.maxPriorityFeePerGas, basefee)
    }
}

/// Splits init code into the factory address and the factory call data.
pub fn split_init_code(init_code: &Bytes) -> Option<(Address, Bytes)> {
    if init_code.len() < Address::len_bytes() {
        return None;
    }
    let factory = Address::from_slice(&init_code[..Address::len_bytes()]);
    Some((factory, init_code.slice(Address::len_bytes()..)))
}

/// Stores an address right-aligned in a storage word.
pub fn address_to_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// Reads an address stored right-aligned in a storage word.
pub fn word_to_address(word: U256) -> Address {
    Address::from_word(B256::from(word.to_be_bytes::<32>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    fn op() -> UserOperation {
        UserOperation {
            sender: address!("0x1111111111111111111111111111111111111111"),
            nonce: U256::from(1),
            callGas: U256::from(200_000),
            verificationGas: U256::from(100_000),
            preVerificationGas: U256::from(21_000),
            maxFeePerGas: U256::from(1_000_000_000u64),
            maxPriorityFeePerGas: U256::from(1_000_000_000u64),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_id_excludes_signature() {
        let mut signed = op();
        signed.signature = bytes!("deadbeef");
        let entry_point = address!("0x6342000000000000000000000000000000004337");
        assert_eq!(signed.request_id(entry_point, 1), op().request_id(entry_point, 1));
    }

    #[test]
    fn test_request_id_binds_entry_point_and_chain() {
        let entry_point = address!("0x6342000000000000000000000000000000004337");
        let other = address!("0x6342000000000000000000000000000000004338");
        let id = op().request_id(entry_point, 1);
        assert_ne!(id, op().request_id(other, 1));
        assert_ne!(id, op().request_id(entry_point, 2));
    }

    #[test]
    fn test_required_prefund_self_funded_and_sponsored() {
        let self_funded = op();
        assert_eq!(self_funded.required_gas(), 321_000);
        assert_eq!(self_funded.required_prefund(0), U256::from(321_000u64 * 1_000_000_000));

        let mut sponsored = op();
        sponsored.paymaster = address!("0x2222222222222222222222222222222222222222");
        assert_eq!(sponsored.required_gas(), 200_000 + 3 * 100_000 + 21_000);
        assert_eq!(sponsored.payment_mode(), PaymentMode::Sponsored(sponsored.paymaster));
    }

    #[test]
    fn test_gas_value_bounds() {
        let mut gas_overflow = op();
        assert!(gas_overflow.has_valid_gas_values());
        gas_overflow.callGas = MAX_GAS_VALUE + U256::from(1);
        assert!(!gas_overflow.has_valid_gas_values());

        let mut fee_overflow = op();
        fee_overflow.maxFeePerGas = MAX_FEE_VALUE;
        assert!(fee_overflow.has_valid_gas_values());
        fee_overflow.maxPriorityFeePerGas = U256::MAX;
        assert!(!fee_overflow.has_valid_gas_values());
    }

    #[test]
    fn test_split_init_code() {
        let factory = address!("0x3333333333333333333333333333333333333333");
        let mut init_code = factory.to_vec();
        init_code.extend_from_slice(&[1, 2, 3]);
        let (parsed, data) = split_init_code(&init_code.into()).unwrap();
        assert_eq!(parsed, factory);
        assert_eq!(data, bytes!("010203"));
        assert_eq!(split_init_code(&bytes!("0102")), None);
    }
}
