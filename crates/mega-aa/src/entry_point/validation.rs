//! Phase 1: per-operation authorization and prefund reservation.

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::{debug, trace};

use super::EntryPoint;
use crate::{
    context::CallContext, Authorizer, EntryPointError, FailedOp, PaymasterValidation, PaymentMode,
    Revert, UserOperation, UserOperationExt, ValidationData,
};

/// How the signature of an operation is vouched for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SignatureMode<'a> {
    /// The account verifies the signature itself.
    Direct,
    /// The operation belongs to a group verified by `aggregator`.
    Aggregated { aggregator: Address, combined: &'a Bytes, group_index: usize },
    /// Simulation: the account may name any aggregator, which is then reported.
    Simulated,
}

impl SignatureMode<'_> {
    /// Whether the authorizer returned by the account is acceptable.
    fn accepts(&self, authorizer: Authorizer) -> bool {
        match (self, authorizer) {
            (_, Authorizer::SignatureFailed) => false,
            (Self::Direct, Authorizer::Valid) | (Self::Simulated, _) => true,
            (Self::Aggregated { aggregator, .. }, Authorizer::Aggregator(returned)) => {
                *aggregator == returned
            }
            _ => false,
        }
    }
}

/// Working state of a validated operation, carried from phase 1 into settlement.
#[derive(Debug, Clone)]
pub(crate) struct UserOpInfo {
    pub(crate) index: usize,
    pub(crate) request_id: B256,
    pub(crate) prefund: U256,
    pub(crate) payment: PaymentMode,
    pub(crate) context: Bytes,
    /// Validation gas used plus the pre-verification allowance.
    pub(crate) pre_op_gas: u64,
    pub(crate) gas_price: U256,
    pub(crate) account_validation: ValidationData,
    pub(crate) paymaster_validation: ValidationData,
}

fn reason_or(revert: &Revert, fallback: &str) -> String {
    revert.reason_string().unwrap_or_else(|| fallback.to_string())
}

impl EntryPoint {
    /// Validates `op` and reserves its prefund. On rejection every effect of the validation is
    /// rolled back.
    pub(crate) fn validate_prepayment(
        &mut self,
        index: usize,
        op: &UserOperation,
        mode: SignatureMode<'_>,
    ) -> Result<UserOpInfo, FailedOp> {
        let checkpoint = self.state.checkpoint();
        let result = self.validate_prepayment_inner(index, op, mode);
        match &result {
            Ok(_) => self.state.checkpoint_commit(),
            Err(_) => self.state.checkpoint_revert(checkpoint),
        }
        result
    }

    fn validate_prepayment_inner(
        &mut self,
        index: usize,
        op: &UserOperation,
        mode: SignatureMode<'_>,
    ) -> Result<UserOpInfo, FailedOp> {
        let request_id = self.get_request_id(op);
        let basefee = self.state.block().basefee;
        let gas_price = op.gas_price(basefee);
        let prefund = op.required_prefund(basefee);
        let payment = op.payment_mode();
        let verification_gas = op.verification_gas_limit();
        debug!(
            index,
            sender = %op.sender,
            %request_id,
            ?payment,
            %prefund,
            "Validating user operation"
        );

        // Deployment, aggregator and account validation each get the whole verification gas;
        // their sum is checked against it afterwards. The paymaster gets what is left.
        let mut gas_used = self.create_sender_if_needed(index, op, request_id, verification_gas)?;

        if let SignatureMode::Aggregated { aggregator, combined, group_index } = mode {
            gas_used += self.validate_with_aggregator(
                index,
                op,
                aggregator,
                combined,
                group_index,
                verification_gas,
            )?;
        }

        let (account_validation, account_gas) =
            self.validate_account(index, op, request_id, prefund, payment, verification_gas)?;
        gas_used += account_gas;
        if gas_used > verification_gas {
            return Err(FailedOp::new(index, "AA40 over verificationGasLimit"));
        }
        if !mode.accepts(account_validation.authorizer) {
            return Err(FailedOp::new(index, "AA24 signature error"));
        }
        if !account_validation.is_valid_at(self.state.block().timestamp) {
            return Err(FailedOp::new(index, "AA22 expired or not due"));
        }

        let entry_point = self.config.address;
        let (context, paymaster_validation) = match payment {
            PaymentMode::SelfFunded => {
                self.state
                    .ledger_mut(entry_point)
                    .internal_decrement_deposit(op.sender, prefund)
                    .map_err(|_| FailedOp::new(index, "AA21 didn't pay prefund"))?;
                (Bytes::new(), ValidationData::valid())
            }
            PaymentMode::Sponsored(paymaster) => {
                let (validation, paymaster_gas) = self.validate_paymaster(
                    index,
                    op,
                    paymaster,
                    request_id,
                    prefund,
                    verification_gas - gas_used,
                )?;
                gas_used += paymaster_gas;
                (validation.context, validation.validation_data)
            }
        };

        let pre_op_gas = gas_used.saturating_add(op.pre_verification_gas());
        trace!(index, gas_used, pre_op_gas, %gas_price, "User operation validated");
        Ok(UserOpInfo {
            index,
            request_id,
            prefund,
            payment,
            context,
            pre_op_gas,
            gas_price,
            account_validation,
            paymaster_validation,
        })
    }

    fn validate_with_aggregator(
        &mut self,
        index: usize,
        op: &UserOperation,
        aggregator: Address,
        combined: &Bytes,
        group_index: usize,
        gas_limit: u64,
    ) -> Result<u64, FailedOp> {
        let code = self.state.code(aggregator);
        let Some(agg) = code.as_deref().and_then(|code| code.as_aggregator()) else {
            return Err(FailedOp::new(index, "AA24 signature error"));
        };
        let frame = self.frame(aggregator, gas_limit);
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            agg.validate_user_op(ctx, group_index, op, combined)
        });
        outcome.result.map_err(|revert| {
            FailedOp::new(index, reason_or(&revert, "aggregator rejected user operation"))
        })?;
        Ok(outcome.gas_used)
    }

    fn validate_account(
        &mut self,
        index: usize,
        op: &UserOperation,
        request_id: B256,
        prefund: U256,
        payment: PaymentMode,
        gas_limit: u64,
    ) -> Result<(ValidationData, u64), FailedOp> {
        let code = self.state.code(op.sender);
        let Some(account) = code.as_deref().and_then(|code| code.as_account()) else {
            return Err(FailedOp::new(index, "AA20 account not deployed"));
        };
        let deposit = self.state.ledger(self.config.address).balance_of(op.sender);
        let missing_account_funds = match payment {
            PaymentMode::SelfFunded => prefund.saturating_sub(deposit),
            PaymentMode::Sponsored(_) => U256::ZERO,
        };
        trace!(index, %missing_account_funds, gas_limit, "Calling account validation");

        let frame = self.frame(op.sender, gas_limit);
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            account.validate_user_op(ctx, op, request_id, missing_account_funds)
        });
        let validation = outcome
            .result
            .map_err(|revert| FailedOp::new(index, reason_or(&revert, "AA23 reverted (or OOG)")))?;
        Ok((validation, outcome.gas_used))
    }

    fn validate_paymaster(
        &mut self,
        index: usize,
        op: &UserOperation,
        paymaster: Address,
        request_id: B256,
        prefund: U256,
        gas_limit: u64,
    ) -> Result<(PaymasterValidation, u64), FailedOp> {
        let code = self.state.code(paymaster);
        let Some(pm) = code.as_deref().and_then(|code| code.as_paymaster()) else {
            return Err(FailedOp::paymaster(index, paymaster, "AA30 paymaster not deployed"));
        };
        if !self.state.ledger(self.config.address).is_staked(
            paymaster,
            self.config.min_paymaster_stake,
            self.config.min_unstake_delay,
        ) {
            return Err(FailedOp::paymaster(index, paymaster, "AA31 paymaster not staked"));
        }
        self.state
            .ledger_mut(self.config.address)
            .internal_decrement_deposit(paymaster, prefund)
            .map_err(|_| FailedOp::paymaster(index, paymaster, "AA31 paymaster deposit too low"))?;

        let frame = self.frame(paymaster, gas_limit);
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            pm.validate_paymaster_user_op(ctx, op, request_id, prefund)
        });
        let validation = outcome.result.map_err(|revert| {
            FailedOp::paymaster(index, paymaster, reason_or(&revert, "AA33 reverted (or OOG)"))
        })?;

        match validation.validation_data.authorizer {
            Authorizer::Valid => {}
            Authorizer::SignatureFailed | Authorizer::Aggregator(_) => {
                return Err(FailedOp::paymaster(index, paymaster, "AA34 signature error"));
            }
        }
        if !validation.validation_data.is_valid_at(self.state.block().timestamp) {
            return Err(FailedOp::paymaster(index, paymaster, "AA32 paymaster expired or not due"));
        }
        debug!(index, %paymaster, context_len = validation.context.len(), "Paymaster sponsored");
        Ok((validation, outcome.gas_used))
    }

    /// Fails unless `aggregator` has aggregator code.
    pub(super) fn ensure_aggregator(&self, aggregator: Address) -> Result<(), EntryPointError> {
        let code = self.state.code(aggregator);
        if code.as_deref().and_then(|code| code.as_aggregator()).is_none() {
            return Err(EntryPointError::InvalidAggregator(aggregator));
        }
        Ok(())
    }

    /// Runs the batch-level signature check of one aggregated group.
    pub(super) fn validate_aggregated_signature(
        &mut self,
        aggregator: Address,
        ops: &[UserOperation],
        combined: &Bytes,
    ) -> Result<(), EntryPointError> {
        let code = self.state.code(aggregator);
        let Some(agg) = code.as_deref().and_then(|code| code.as_aggregator()) else {
            return Err(EntryPointError::InvalidAggregator(aggregator));
        };
        let frame = self.frame(aggregator, u64::MAX);
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            agg.validate_signatures(ctx, ops, combined)
        });
        debug!(
            %aggregator,
            ops = ops.len(),
            gas_used = outcome.gas_used,
            "Validated aggregated signature"
        );
        outcome.result.map_err(|revert| EntryPointError::SignatureValidationFailed {
            aggregator,
            reason: revert.to_string(),
        })
    }
}
