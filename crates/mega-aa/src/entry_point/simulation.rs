//! Off-chain simulation entry points. Every simulation is rolled back.

use alloy_primitives::Address;
use tracing::debug;

use super::{EntryPoint, ExecutionResult, SignatureMode, UserOpInfo, ValidationResult};
use crate::{
    Authorizer, EntryPointError, SimulationError, StakeInfo, UserOperation, UserOperationExt,
};

impl EntryPoint {
    /// Runs phase 1 for `op` and reports what it would reserve, without changing any state.
    ///
    /// Only the configured simulation sender may call this.
    pub fn simulate_validation(
        &mut self,
        caller: Address,
        op: &UserOperation,
    ) -> Result<ValidationResult, SimulationError> {
        self.ensure_simulation(caller, op)?;
        let checkpoint = self.state.checkpoint();
        let result = self
            .validate_prepayment(0, op, SignatureMode::Simulated)
            .map(|info| self.validation_result(op, &info));
        self.state.checkpoint_revert(checkpoint);
        debug!(sender = %op.sender, ok = result.is_ok(), "Simulated validation");
        Ok(result?)
    }

    /// Runs `op` from validation to settlement and reports the outcome, without changing any
    /// state.
    ///
    /// Only the configured simulation sender may call this.
    pub fn simulate_handle_op(
        &mut self,
        caller: Address,
        op: &UserOperation,
    ) -> Result<ExecutionResult, SimulationError> {
        self.ensure_simulation(caller, op)?;
        let checkpoint = self.state.checkpoint();
        let result = self.simulate_handle_op_inner(op);
        self.state.checkpoint_revert(checkpoint);
        debug!(sender = %op.sender, ok = result.is_ok(), "Simulated user operation");
        result
    }

    fn simulate_handle_op_inner(
        &mut self,
        op: &UserOperation,
    ) -> Result<ExecutionResult, SimulationError> {
        let info = self.validate_prepayment(0, op, SignatureMode::Simulated)?;
        let (receipt, result) = self.execute_user_op(op, &info)?;
        Ok(ExecutionResult {
            pre_op_gas: info.pre_op_gas,
            paid: receipt.actual_gas_cost,
            success: receipt.success,
            result,
        })
    }

    fn ensure_simulation(
        &self,
        caller: Address,
        op: &UserOperation,
    ) -> Result<(), EntryPointError> {
        if caller != self.config.simulation_sender {
            return Err(EntryPointError::NotSimulationCaller {
                expected: self.config.simulation_sender,
                caller,
            });
        }
        if !op.has_valid_gas_values() {
            return Err(EntryPointError::GasValuesOverflow { index: 0 });
        }
        Ok(())
    }

    fn validation_result(&self, op: &UserOperation, info: &UserOpInfo) -> ValidationResult {
        let ledger = self.state.ledger(self.config.address);
        let stake_info = |address: Address| StakeInfo::from(ledger.deposit_info(address));
        let aggregator_info = match info.account_validation.authorizer {
            Authorizer::Aggregator(aggregator) => Some((aggregator, stake_info(aggregator))),
            Authorizer::Valid | Authorizer::SignatureFailed => None,
        };
        ValidationResult {
            pre_op_gas: info.pre_op_gas,
            prefund: info.prefund,
            account_validation_data: info.account_validation.pack(),
            paymaster_validation_data: info.paymaster_validation.pack(),
            paymaster_context: info.context.clone(),
            sender_info: stake_info(op.sender),
            paymaster_info: info.payment.paymaster().map(stake_info).unwrap_or_default(),
            aggregator_info,
        }
    }
}
