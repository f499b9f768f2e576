use alloy_primitives::{Address, Bytes, Log, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{FailedOp, StakeInfo, UserOperation};

/// Operations that share one aggregated signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOpsPerAggregator {
    /// The operations of the group, in batch order.
    pub ops: Vec<UserOperation>,
    /// The aggregator contract that verifies the combined signature.
    pub aggregator: Address,
    /// The combined signature of the group.
    pub signature: Bytes,
}

/// Settlement record of one executed user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpReceipt {
    /// Index of the operation in the batch.
    pub index: usize,
    /// Request id of the operation.
    pub request_id: B256,
    /// The account that sent the operation.
    pub sender: Address,
    /// The paymaster that paid, if sponsored.
    pub paymaster: Option<Address>,
    /// Nonce of the operation.
    pub nonce: U256,
    /// Whether the payload succeeded and, if called, `post_op` did not need a retry.
    pub success: bool,
    /// Gas charged, including the pre-verification allowance.
    pub actual_gas_used: u64,
    /// Cost charged to the payer.
    pub actual_gas_cost: U256,
    /// Effective gas price.
    pub gas_price: U256,
    /// Revert data of the payload, if it reverted.
    pub revert_data: Option<Bytes>,
}

/// Outcome of a `handle_ops` submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleOpsOutcome {
    /// One receipt per settled operation, in batch order.
    pub receipts: Vec<UserOpReceipt>,
    /// Operations rejected during validation. They had no effect.
    pub failed_ops: Vec<FailedOp>,
    /// Total paid to the beneficiary.
    pub collected: U256,
    /// Logs emitted during the batch.
    pub logs: Vec<Log>,
}

impl HandleOpsOutcome {
    /// The receipt of the operation at `index`, if it was settled.
    pub fn receipt(&self, index: usize) -> Option<&UserOpReceipt> {
        self.receipts.iter().find(|receipt| receipt.index == index)
    }

    /// The rejection of the operation at `index`, if it was rejected.
    pub fn failure(&self, index: usize) -> Option<&FailedOp> {
        self.failed_ops.iter().find(|failed| failed.index == index)
    }
}

/// Result of validation-only simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Validation gas used plus the pre-verification allowance.
    pub pre_op_gas: u64,
    /// The prefund that would be reserved.
    pub prefund: U256,
    /// Packed validation data returned by the account.
    pub account_validation_data: U256,
    /// Packed validation data returned by the paymaster. Zero if self-funded.
    pub paymaster_validation_data: U256,
    /// Context returned by the paymaster.
    pub paymaster_context: Bytes,
    /// Stake of the sender.
    pub sender_info: StakeInfo,
    /// Stake of the paymaster. Zero if self-funded.
    pub paymaster_info: StakeInfo,
    /// The aggregator the account delegated its signature check to, with its stake.
    pub aggregator_info: Option<(Address, StakeInfo)>,
}

/// Result of full single-operation simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Validation gas used plus the pre-verification allowance.
    pub pre_op_gas: u64,
    /// The actual cost that would be charged.
    pub paid: U256,
    /// Whether the payload succeeded.
    pub success: bool,
    /// Return or revert data of the payload.
    pub result: Bytes,
}
