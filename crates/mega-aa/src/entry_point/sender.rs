//! Deployment of senders from their init code.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use mega_aa_contracts::IEntryPoint;
use tracing::debug;

use super::EntryPoint;
use crate::{context::CallContext, split_init_code, FailedOp, UserOperation};

impl EntryPoint {
    /// Returns the address the factory named by `init_code` deploys to with `salt`, without
    /// deploying it. `None` if `init_code` is shorter than an address.
    pub fn get_sender_address(&self, init_code: &Bytes, salt: B256) -> Option<Address> {
        let (factory, data) = split_init_code(init_code)?;
        Some(factory.create2(salt, keccak256(&data)))
    }

    /// Deploys the sender of `op` through its factory if it has no code yet. The nonce of the
    /// operation is the salt. Returns the gas used.
    pub(super) fn create_sender_if_needed(
        &mut self,
        index: usize,
        op: &UserOperation,
        request_id: B256,
        gas_limit: u64,
    ) -> Result<u64, FailedOp> {
        if self.state.is_deployed(op.sender) {
            if !op.initCode.is_empty() {
                return Err(FailedOp::new(index, "AA10 sender already constructed"));
            }
            return Ok(0);
        }
        if op.initCode.is_empty() {
            return Err(FailedOp::new(index, "AA20 account not deployed"));
        }

        let Some((factory, data)) = split_init_code(&op.initCode) else {
            return Err(FailedOp::new(index, "AA13 initCode failed or OOG"));
        };
        let code = self.state.code(factory);
        let Some(account_factory) = code.as_deref().and_then(|code| code.as_factory()) else {
            return Err(FailedOp::new(index, "AA13 initCode failed or OOG"));
        };

        let salt = B256::from(op.nonce.to_be_bytes::<32>());
        let frame = self.frame(factory, gas_limit);
        let outcome = CallContext::enter(&mut self.state, frame, |ctx| {
            account_factory.create_account(ctx, &data, salt)
        });
        let sender =
            outcome.result.map_err(|_| FailedOp::new(index, "AA13 initCode failed or OOG"))?;
        if sender != op.sender {
            return Err(FailedOp::new(index, "AA14 initCode must return sender"));
        }
        if !self.state.is_deployed(sender) {
            return Err(FailedOp::new(index, "AA15 initCode must create sender"));
        }

        self.state.emit_event(
            self.config.address,
            &IEntryPoint::AccountDeployed {
                requestId: request_id,
                sender,
                factory,
                paymaster: op.paymaster,
            },
        );
        debug!(index, %sender, %factory, gas_used = outcome.gas_used, "Deployed sender");
        Ok(outcome.gas_used)
    }
}
