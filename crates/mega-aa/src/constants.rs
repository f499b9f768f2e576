//! Constants for the entry point.
//!
//! It groups the constants by the component that consumes them.

use alloy_primitives::{address, Address, U256};

/// The default address the entry point is deployed at.
pub const DEFAULT_ENTRY_POINT_ADDRESS: Address =
    address!("0x6342000000000000000000000000000000004337");

/// The default chain id.
pub const DEFAULT_CHAIN_ID: u64 = 6342;

/// The caller that is allowed to run simulations. Simulations are only meaningful off-chain, where
/// the caller can be spoofed to the zero address.
pub const SIMULATION_SENDER: Address = Address::ZERO;

/// The maximum depth of nested calls between contracts.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Gas schedule charged by [`CallContext`](crate::CallContext) primitives.
///
/// Opcode equivalents are taken from the revm schedule (cold access costs, since every frame
/// starts cold). The remaining entries price the native precompile-like operations.
pub mod gas {
    use revm::interpreter::gas as schedule;

    /// Cost of reading a storage slot.
    pub const SLOAD: u64 = schedule::COLD_SLOAD_COST;
    /// Cost of setting a zero storage slot to a non-zero value.
    pub const SSTORE_SET: u64 = schedule::SSTORE_SET;
    /// Cost of changing a non-zero storage slot.
    pub const SSTORE_RESET: u64 = schedule::WARM_SSTORE_RESET;
    /// Cost of reading a balance or a deposit.
    pub const BALANCE: u64 = schedule::COLD_ACCOUNT_ACCESS_COST;
    /// Base cost of a call into another contract.
    pub const CALL: u64 = schedule::COLD_ACCOUNT_ACCESS_COST;
    /// Additional cost of a call that transfers value.
    pub const CALLVALUE: u64 = schedule::CALLVALUE;
    /// Cost of deploying a new contract with `CREATE2`.
    pub const CREATE2: u64 = schedule::CREATE;
    /// Cost per 32-byte word hashed.
    pub const KECCAK256_WORD: u64 = schedule::KECCAK256WORD;
    /// Base cost of a log.
    pub const LOG: u64 = schedule::LOG;
    /// Cost per log topic.
    pub const LOG_TOPIC: u64 = schedule::LOGTOPIC;
    /// Cost per byte of log data.
    pub const LOG_DATA: u64 = schedule::LOGDATA;
    /// Cost of the `ecrecover` precompile.
    pub const ECRECOVER: u64 = 3_000;
    /// Cost of verifying a pairing-based signature, per pairing.
    pub const PAIRING: u64 = 34_000;
    /// Base cost of verifying a pairing-based signature.
    pub const PAIRING_BASE: u64 = 45_000;
    /// Cost of a proof verification by the external verifier oracle.
    pub const PROOF_VERIFICATION: u64 = 250_000;
}

/// Limits of the numeric fields of a user operation.
pub mod limits {
    use super::U256;

    /// The largest accepted value of a gas budget (`callGas`, `verificationGas`,
    /// `preVerificationGas`).
    pub const MAX_GAS_VALUE: U256 = U256::from_limbs([u64::MAX, 0, 0, 0]);

    /// The largest accepted value of a fee field (`maxFeePerGas`, `maxPriorityFeePerGas`).
    pub const MAX_FEE_VALUE: U256 = U256::from_limbs([u64::MAX, u64::MAX, 0, 0]);

    /// The maximum value of a 48-bit timestamp in validation data.
    pub const MAX_TIMESTAMP: u64 = (1 << 48) - 1;
}

/// Constants of the deposit ledger.
pub mod stake {
    use super::U256;

    /// Default minimum stake a paymaster must lock: 1 ether.
    pub const DEFAULT_MIN_PAYMASTER_STAKE: U256 =
        U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

    /// Default minimum unstake delay, in seconds.
    pub const DEFAULT_MIN_UNSTAKE_DELAY: u64 = 86_400;
}

/// Constants of the pipeline's gas accounting.
pub mod pipeline {
    /// Verification gas is counted this many times toward the prefund of a sponsored operation:
    /// once for validation and once for each of the two possible `post_op` calls.
    pub const SPONSORED_VERIFICATION_GAS_MULTIPLIER: u64 = 3;
}
