//! Error types of the entry point.
//!
//! Failures come in two tiers: [`FailedOp`] rejects a single user operation and lets the rest of
//! the batch proceed, while [`EntryPointError`] aborts the whole submission and leaves the world
//! state untouched.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolError;
use mega_aa_contracts::IEntryPoint;

/// A user operation was rejected. Op-local: the rest of the batch proceeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("FailedOp(index: {index}, paymaster: {paymaster:?}, reason: {reason})")]
pub struct FailedOp {
    /// Index of the operation in the batch.
    pub index: usize,
    /// The paymaster that caused the failure, if any.
    pub paymaster: Option<Address>,
    /// Human readable diagnostic.
    pub reason: String,
}

impl FailedOp {
    /// Creates a failure caused by the operation's sender or the operation itself.
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self { index, paymaster: None, reason: reason.into() }
    }

    /// Creates a failure caused by the operation's paymaster.
    pub fn paymaster(index: usize, paymaster: Address, reason: impl Into<String>) -> Self {
        Self { index, paymaster: Some(paymaster), reason: reason.into() }
    }

    /// ABI-encodes the failure as the `FailedOp` Solidity error.
    pub fn abi_encode(&self) -> Bytes {
        IEntryPoint::FailedOp {
            opIndex: U256::from(self.index),
            paymaster: self.paymaster.unwrap_or_default(),
            reason: self.reason.clone(),
        }
        .abi_encode()
        .into()
    }
}

/// Batch-fatal errors. The whole submission is rejected with no state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryPointError {
    /// A gas or fee field does not fit its fixed-width range.
    #[error("gas values overflow in user operation {index}")]
    GasValuesOverflow {
        /// Index of the offending operation.
        index: usize,
    },
    /// The aggregated signature of a group did not verify, or its proofs are malformed.
    #[error("signature validation failed for aggregator {aggregator}: {reason}")]
    SignatureValidationFailed {
        /// The aggregator of the group.
        aggregator: Address,
        /// Diagnostic reported by the aggregator.
        reason: String,
    },
    /// The aggregator of a group has no aggregator code.
    #[error("invalid aggregator {0}")]
    InvalidAggregator(Address),
    /// A failure that cannot be isolated to its operation, e.g. `post_op` reverting twice.
    #[error(transparent)]
    FailedOp(#[from] FailedOp),
    /// The actual cost of an operation exceeded its reserved prefund.
    #[error("prefund {prefund} below actual gas cost {actual_gas_cost} of user operation {index}")]
    PrefundBelowActualCost {
        /// Index of the offending operation.
        index: usize,
        /// The reserved prefund.
        prefund: U256,
        /// The computed actual cost.
        actual_gas_cost: U256,
    },
    /// The beneficiary could not be compensated.
    #[error("failed to send {amount} to beneficiary {beneficiary}")]
    CompensationFailed {
        /// The beneficiary.
        beneficiary: Address,
        /// The collected amount.
        amount: U256,
    },
    /// A simulation entry point was called outside of simulation.
    #[error("simulation must be called by {expected}, got {caller}")]
    NotSimulationCaller {
        /// The configured simulation sender.
        expected: Address,
        /// The actual caller.
        caller: Address,
    },
}

/// Errors of the deposit ledger administration entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StakeError {
    /// The requested amount exceeds the available deposit or balance.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// The requested amount.
        requested: U256,
        /// The available amount.
        available: U256,
    },
    /// The unstake delay is below the configured minimum.
    #[error("unstake delay {delay} below minimum {minimum}")]
    UnstakeDelayTooLow {
        /// The requested delay.
        delay: u64,
        /// The configured minimum.
        minimum: u64,
    },
    /// The unstake delay would decrease from a previously set value.
    #[error("cannot decrease unstake delay from {current} to {requested}")]
    CannotDecreaseUnstakeDelay {
        /// The current delay.
        current: u64,
        /// The requested delay.
        requested: u64,
    },
    /// Staking would leave a zero stake.
    #[error("no stake specified")]
    ZeroStake,
    /// The account is not staked.
    #[error("not staked")]
    NotStaked,
    /// The stake is already unlocking.
    #[error("already unstaking")]
    AlreadyUnstaking,
    /// There is no stake to withdraw.
    #[error("no stake to withdraw")]
    NoStake,
    /// Withdrawal was attempted without unlocking first.
    #[error("must call unlock_stake() first")]
    StakeNotUnlocked,
    /// The unstake delay has not elapsed.
    #[error("stake withdrawal is not due until {withdraw_time}")]
    StakeLocked {
        /// When the stake becomes withdrawable.
        withdraw_time: u64,
    },
}

/// Errors of the simulation entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// The operation was rejected during validation.
    #[error(transparent)]
    FailedOp(FailedOp),
    /// The simulation hit a batch-fatal error.
    #[error(transparent)]
    EntryPoint(#[from] EntryPointError),
}

impl From<FailedOp> for SimulationError {
    fn from(value: FailedOp) -> Self {
        Self::FailedOp(value)
    }
}
