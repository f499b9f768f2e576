//! Phase 2: payload execution and settlement.

use alloy_primitives::{Address, Bytes, U256};
use mega_aa_contracts::IEntryPoint;
use revm::context_interface::journaled_state::JournalCheckpoint;
use tracing::{debug, trace, warn};

use super::{EntryPoint, UserOpInfo, UserOpReceipt};
use crate::{
    context::{CallContext, FrameResult},
    gas_cost, EntryPointError, FailedOp, PaymentMode, PostOpMode, Revert, UserOperation,
    UserOperationExt,
};

impl EntryPoint {
    /// Executes the payload of a validated operation and settles it. Returns the receipt and the
    /// return (or revert) data of the payload.
    ///
    /// Every reverted payload gets a `UserOperationRevertReason` event, with empty revert data when
    /// the payload ran out of gas.
    pub(super) fn execute_user_op(
        &mut self,
        op: &UserOperation,
        info: &UserOpInfo,
    ) -> Result<(UserOpReceipt, Bytes), EntryPointError> {
        let checkpoint = self.state.checkpoint();

        let code = self.state.code(op.sender);
        let frame = self.frame(op.sender, op.call_gas_limit());
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            if op.callData.is_empty() {
                return Ok(Bytes::new());
            }
            match code.as_deref().and_then(|code| code.as_account()) {
                Some(account) => account.execute(ctx, &op.callData),
                None => Err(Revert::reason("account not deployed")),
            }
        });

        let (mode, output, revert_data) = match outcome.result {
            Ok(output) => (PostOpMode::OpSucceeded, output, None),
            Err(revert) => {
                let data = revert.data();
                debug!(index = info.index, %revert, "User operation payload reverted");
                (PostOpMode::OpReverted, data.clone(), Some(data))
            }
        };
        trace!(index = info.index, gas_used = outcome.gas_used, "Executed payload");

        let (mode, actual_gas_used) =
            self.post_execution(op, info, checkpoint, mode, outcome.gas_used)?;
        let actual_gas_cost = self.settle(op, info, actual_gas_used)?;

        if let Some(data) = &revert_data {
            self.state.emit_event(
                self.config.address,
                &IEntryPoint::UserOperationRevertReason {
                    requestId: info.request_id,
                    sender: op.sender,
                    nonce: op.nonce,
                    revertReason: data.clone(),
                },
            );
        }
        let success = mode == PostOpMode::OpSucceeded;
        self.state.emit_event(
            self.config.address,
            &IEntryPoint::UserOperationEvent {
                requestId: info.request_id,
                sender: op.sender,
                paymaster: op.paymaster,
                nonce: op.nonce,
                actualGasCost: actual_gas_cost,
                actualGasPrice: info.gas_price,
                success,
            },
        );

        let receipt = UserOpReceipt {
            index: info.index,
            request_id: info.request_id,
            sender: op.sender,
            paymaster: info.payment.paymaster(),
            nonce: op.nonce,
            success,
            actual_gas_used,
            actual_gas_cost,
            gas_price: info.gas_price,
            revert_data,
        };
        Ok((receipt, output))
    }

    /// Runs the paymaster callback, if any, and closes the execution checkpoint. Returns the final
    /// mode and the gas used so far.
    ///
    /// A reverting `post_op` rolls back the payload and its own effects, then is called again with
    /// [`PostOpMode::PostOpReverted`]. The gas of both calls is charged. A second revert fails the
    /// batch.
    fn post_execution(
        &mut self,
        op: &UserOperation,
        info: &UserOpInfo,
        checkpoint: JournalCheckpoint,
        mode: PostOpMode,
        execution_gas: u64,
    ) -> Result<(PostOpMode, u64), EntryPointError> {
        let mut actual_gas = info.pre_op_gas.saturating_add(execution_gas);
        let paymaster = match info.payment {
            PaymentMode::Sponsored(paymaster) if !info.context.is_empty() => paymaster,
            _ => {
                self.state.checkpoint_commit();
                return Ok((mode, actual_gas));
            }
        };

        let verification_gas = op.verification_gas_limit();
        let first = self.call_post_op(
            paymaster,
            verification_gas,
            mode,
            &info.context,
            gas_cost(actual_gas, info.gas_price),
        );
        actual_gas = actual_gas.saturating_add(first.gas_used);
        let Err(revert) = first.result else {
            self.state.checkpoint_commit();
            return Ok((mode, actual_gas));
        };

        self.state.checkpoint_revert(checkpoint);
        warn!(index = info.index, %paymaster, %revert, "post_op reverted, retrying");

        let mode = PostOpMode::PostOpReverted;
        let second = self.call_post_op(
            paymaster,
            verification_gas,
            mode,
            &info.context,
            gas_cost(actual_gas, info.gas_price),
        );
        actual_gas = actual_gas.saturating_add(second.gas_used);
        if let Err(revert) = second.result {
            let reason = revert.reason_string().unwrap_or_default();
            return Err(FailedOp::paymaster(
                info.index,
                paymaster,
                format!("AA50 postOp reverted: {reason}"),
            )
            .into());
        }
        Ok((mode, actual_gas))
    }

    fn call_post_op(
        &mut self,
        paymaster: Address,
        gas_limit: u64,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
    ) -> FrameResult<()> {
        let code = self.state.code(paymaster);
        let frame = self.frame(paymaster, gas_limit);
        CallContext::enter(&mut self.state, frame, |ctx| {
            match code.as_deref().and_then(|code| code.as_paymaster()) {
                Some(pm) => pm.post_op(ctx, mode, context, actual_gas_cost),
                None => Err(Revert::reason("AA30 paymaster not deployed")),
            }
        })
    }

    /// Charges the actual cost against the prefund and refunds the rest to the payer. Returns the
    /// actual cost.
    fn settle(
        &mut self,
        op: &UserOperation,
        info: &UserOpInfo,
        actual_gas_used: u64,
    ) -> Result<U256, EntryPointError> {
        let actual_gas_cost = gas_cost(actual_gas_used, info.gas_price);
        let refund = info.prefund.checked_sub(actual_gas_cost).ok_or(
            EntryPointError::PrefundBelowActualCost {
                index: info.index,
                prefund: info.prefund,
                actual_gas_cost,
            },
        )?;
        let payer = info.payment.paymaster().unwrap_or(op.sender);
        self.state.ledger_mut(self.config.address).internal_increment_deposit(payer, refund);
        debug!(
            index = info.index,
            %payer,
            actual_gas_used,
            %actual_gas_cost,
            %refund,
            "Settled user operation"
        );
        Ok(actual_gas_cost)
    }
}
