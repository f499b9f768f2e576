//! The entry point: batch validation, execution and settlement of user operations.
//!
//! A batch is processed in two phases. Phase 1 validates every operation on its own: it deploys
//! the sender if needed, asks the account (and the paymaster, if any) to authorize the operation
//! and reserves the prefund. An operation that fails phase 1 is dropped with a [`FailedOp`] and
//! leaves no trace. Phase 2 runs the payload of every validated operation in an isolated
//! checkpoint, then settles its actual cost, refunds the rest of the prefund and pays the
//! collected total to the beneficiary.
//!
//! The whole batch runs inside one checkpoint: any [`EntryPointError`] rolls back everything.

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{debug, info, warn};

use crate::{
    context::Frame, EntryPointConfig, EntryPointError, FailedOp, UserOperation, UserOperationExt,
    WorldState,
};

mod execution;
mod result;
mod sender;
mod simulation;
mod stake;
mod validation;

pub use result::*;
pub(crate) use validation::{SignatureMode, UserOpInfo};

/// The entry point together with the world state it owns.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    config: EntryPointConfig,
    state: WorldState,
}

/// One group of a batch after signature extraction, with the global index of its first operation.
#[derive(Debug)]
struct BatchGroup<'a> {
    ops: &'a [UserOperation],
    aggregator: Option<(Address, &'a Bytes)>,
    offset: usize,
}

impl EntryPoint {
    /// Creates an entry point over `state`.
    pub fn new(config: EntryPointConfig, state: WorldState) -> Self {
        Self { config, state }
    }

    /// The configuration.
    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// The address of the entry point.
    pub const fn address(&self) -> Address {
        self.config.address
    }

    /// The world state.
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Mutable access to the world state, e.g. to deploy contracts or fund addresses.
    pub fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// Consumes the entry point, returning its world state.
    pub fn into_state(self) -> WorldState {
        self.state
    }

    /// The request id of `op` for this entry point and chain.
    pub fn get_request_id(&self, op: &UserOperation) -> B256 {
        op.request_id(self.config.address, self.config.chain_id)
    }

    /// Executes a batch of operations that carry their own signatures.
    pub fn handle_ops(
        &mut self,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<HandleOpsOutcome, EntryPointError> {
        let groups = [BatchGroup { ops, aggregator: None, offset: 0 }];
        self.execute_batch(&groups, beneficiary)
    }

    /// Executes a batch made of groups of operations, each verified by one aggregated signature.
    pub fn handle_aggregated_ops(
        &mut self,
        groups: &[UserOpsPerAggregator],
        beneficiary: Address,
    ) -> Result<HandleOpsOutcome, EntryPointError> {
        let mut offset = 0;
        let groups = groups
            .iter()
            .map(|group| {
                let batch_group = BatchGroup {
                    ops: &group.ops,
                    aggregator: Some((group.aggregator, &group.signature)),
                    offset,
                };
                offset += group.ops.len();
                batch_group
            })
            .collect::<Vec<_>>();
        self.execute_batch(&groups, beneficiary)
    }

    fn execute_batch(
        &mut self,
        groups: &[BatchGroup<'_>],
        beneficiary: Address,
    ) -> Result<HandleOpsOutcome, EntryPointError> {
        for group in groups {
            for (i, op) in group.ops.iter().enumerate() {
                if !op.has_valid_gas_values() {
                    return Err(EntryPointError::GasValuesOverflow { index: group.offset + i });
                }
            }
        }

        let log_start = self.state.logs().len();
        let checkpoint = self.state.checkpoint();
        match self.run_batch(groups, beneficiary) {
            Ok(mut outcome) => {
                self.state.checkpoint_commit();
                outcome.logs = self.state.take_logs_from(log_start);
                info!(
                    settled = outcome.receipts.len(),
                    rejected = outcome.failed_ops.len(),
                    collected = %outcome.collected,
                    %beneficiary,
                    "Batch handled"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.state.checkpoint_revert(checkpoint);
                warn!(%err, "Batch rejected");
                Err(err)
            }
        }
    }

    fn run_batch(
        &mut self,
        groups: &[BatchGroup<'_>],
        beneficiary: Address,
    ) -> Result<HandleOpsOutcome, EntryPointError> {
        let mut outcome = HandleOpsOutcome::default();
        let mut validated = Vec::new();

        for group in groups {
            if let Some((aggregator, _)) = group.aggregator {
                self.ensure_aggregator(aggregator)?;
            }
            let mut infos = Vec::with_capacity(group.ops.len());
            for (i, op) in group.ops.iter().enumerate() {
                let index = group.offset + i;
                let op = match group.aggregator {
                    Some((aggregator, signature)) => {
                        match self.extract_signature(aggregator, signature, group.ops, i, index) {
                            Ok(op) => op,
                            Err(failed) => {
                                warn!(index, reason = %failed.reason, "User operation rejected");
                                outcome.failed_ops.push(failed);
                                continue;
                            }
                        }
                    }
                    None => op.clone(),
                };
                let mode = match group.aggregator {
                    Some((aggregator, combined)) => {
                        SignatureMode::Aggregated { aggregator, combined, group_index: i }
                    }
                    None => SignatureMode::Direct,
                };
                match self.validate_prepayment(index, &op, mode) {
                    Ok(info) => infos.push((op, info)),
                    Err(failed) => {
                        warn!(
                            index,
                            paymaster = ?failed.paymaster,
                            reason = %failed.reason,
                            "User operation rejected"
                        );
                        outcome.failed_ops.push(failed);
                    }
                }
            }
            if let Some((aggregator, signature)) = group.aggregator {
                self.validate_aggregated_signature(aggregator, group.ops, signature)?;
            }
            validated.extend(infos);
        }

        for (op, info) in &validated {
            let (receipt, _) = self.execute_user_op(op, info)?;
            outcome.collected += receipt.actual_gas_cost;
            outcome.receipts.push(receipt);
        }

        self.compensate(beneficiary, outcome.collected)?;
        Ok(outcome)
    }

    fn extract_signature(
        &self,
        aggregator: Address,
        combined: &Bytes,
        ops: &[UserOperation],
        group_index: usize,
        index: usize,
    ) -> Result<UserOperation, FailedOp> {
        let code = self.state.code(aggregator);
        let Some(agg) = code.as_deref().and_then(|code| code.as_aggregator()) else {
            return Err(FailedOp::new(index, "AA24 signature error"));
        };
        let signature = agg.extract_signature(combined, ops, group_index).map_err(|revert| {
            FailedOp::new(
                index,
                revert.reason_string().unwrap_or_else(|| "AA24 signature error".to_string()),
            )
        })?;
        let mut op = ops[group_index].clone();
        op.signature = signature;
        Ok(op)
    }

    /// A top-level frame called by the entry point.
    fn frame(&self, address: Address, gas_limit: u64) -> Frame {
        Frame {
            entry_point: self.config.address,
            chain_id: self.config.chain_id,
            caller: self.config.address,
            address,
            gas_limit,
            is_static: false,
            depth: 0,
        }
    }

    fn compensate(&mut self, beneficiary: Address, amount: U256) -> Result<(), EntryPointError> {
        debug!(%beneficiary, %amount, "Compensating beneficiary");
        self.state
            .transfer(self.config.address, beneficiary, amount)
            .map_err(|_| EntryPointError::CompensationFailed { beneficiary, amount })
    }
}
