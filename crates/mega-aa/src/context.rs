//! The call frame handed to contract code.

use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, Log, LogData, B256, U256};
use alloy_sol_types::SolCall;
use revm::interpreter::Gas;
use tracing::trace;

use crate::{
    constants::{gas, MAX_CALL_DEPTH},
    recover_signer, BlockEnv, Contract, Revert, WorldState,
};

/// Static description of a call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) entry_point: Address,
    pub(crate) chain_id: u64,
    pub(crate) caller: Address,
    pub(crate) address: Address,
    pub(crate) gas_limit: u64,
    pub(crate) is_static: bool,
    pub(crate) depth: usize,
}

/// The outcome of running a frame: its result and the gas it consumed.
#[derive(Debug)]
pub(crate) struct FrameResult<T> {
    pub(crate) result: Result<T, Revert>,
    pub(crate) gas_used: u64,
}

/// The execution frame of one contract invocation.
///
/// A frame is metered by its own [`Gas`] and runs inside its own journal checkpoint: when the
/// closure that runs it returns a [`Revert`], every state change it made, including those of
/// nested calls, is rolled back. Running out of gas consumes the whole frame limit.
#[derive(Debug)]
pub struct CallContext<'a> {
    state: &'a mut WorldState,
    frame: Frame,
    gas: Gas,
}

impl<'a> CallContext<'a> {
    /// Runs `f` in a new frame described by `frame`.
    pub(crate) fn enter<T>(
        state: &'a mut WorldState,
        frame: Frame,
        f: impl FnOnce(&mut CallContext<'_>) -> Result<T, Revert>,
    ) -> FrameResult<T> {
        let checkpoint = state.checkpoint();
        let mut ctx = CallContext { state, frame, gas: Gas::new(frame.gas_limit) };
        let result = f(&mut ctx);
        let gas_used = ctx.gas.spent();
        match &result {
            Ok(_) => ctx.state.checkpoint_commit(),
            Err(_) => ctx.state.checkpoint_revert(checkpoint),
        }
        FrameResult { result, gas_used }
    }

    /// The address whose code is running.
    pub const fn address(&self) -> Address {
        self.frame.address
    }

    /// The address that called into this frame.
    pub const fn caller(&self) -> Address {
        self.frame.caller
    }

    /// The address of the entry point.
    pub const fn entry_point(&self) -> Address {
        self.frame.entry_point
    }

    /// The chain id.
    pub const fn chain_id(&self) -> u64 {
        self.frame.chain_id
    }

    /// The block environment.
    pub fn block(&self) -> BlockEnv {
        *self.state.block()
    }

    /// The block timestamp.
    pub fn timestamp(&self) -> u64 {
        self.state.block().timestamp
    }

    /// Whether the frame may not change state.
    pub const fn is_static(&self) -> bool {
        self.frame.is_static
    }

    /// The gas of the frame.
    pub const fn gas(&self) -> &Gas {
        &self.gas
    }

    /// Charges `amount` gas to the frame.
    pub fn charge(&mut self, amount: u64) -> Result<(), Revert> {
        if !self.gas.record_cost(amount) {
            self.gas.spend_all();
            return Err(Revert::OutOfGas);
        }
        Ok(())
    }

    /// Reads a storage slot of the running contract.
    pub fn sload(&mut self, key: U256) -> Result<U256, Revert> {
        self.charge(gas::SLOAD)?;
        Ok(self.state.storage(self.address(), key))
    }

    /// Writes a storage slot of the running contract.
    pub fn sstore(&mut self, key: U256, value: U256) -> Result<(), Revert> {
        self.ensure_mutable()?;
        let current = self.state.storage(self.address(), key);
        self.charge(if current.is_zero() && !value.is_zero() {
            gas::SSTORE_SET
        } else {
            gas::SSTORE_RESET
        })?;
        self.state.set_storage(self.address(), key, value);
        Ok(())
    }

    /// Native balance of `address`.
    pub fn balance(&mut self, address: Address) -> Result<U256, Revert> {
        self.charge(gas::BALANCE)?;
        Ok(self.state.balance(address))
    }

    /// Sends `value` of the running contract's native balance to `to`, without calling it.
    pub fn transfer(&mut self, to: Address, value: U256) -> Result<(), Revert> {
        self.ensure_mutable()?;
        self.charge(gas::CALLVALUE)?;
        self.state
            .transfer(self.address(), to, value)
            .map_err(|_| Revert::reason("insufficient balance for transfer"))
    }

    /// Pays `value` of the running contract's native balance into the entry point's ledger,
    /// credited to `account`. Returns the new deposit of `account`.
    pub fn deposit_to(&mut self, account: Address, value: U256) -> Result<U256, Revert> {
        self.ensure_mutable()?;
        self.charge(gas::CALL + gas::CALLVALUE)?;
        let entry_point = self.entry_point();
        self.state
            .deposit_to(entry_point, self.address(), account, value)
            .map_err(|_| Revert::reason("insufficient balance for deposit"))
    }

    /// The ledger deposit of `account`.
    pub fn deposit_of(&mut self, account: Address) -> Result<U256, Revert> {
        self.charge(gas::BALANCE)?;
        Ok(self.state.ledger(self.entry_point()).balance_of(account))
    }

    /// Whether there is code at `address`.
    pub fn is_deployed(&mut self, address: Address) -> Result<bool, Revert> {
        self.charge(gas::BALANCE)?;
        Ok(self.state.is_deployed(address))
    }

    /// Calls `to` with `value` and `data` in a nested frame.
    ///
    /// The callee gets all but one 64th of the remaining gas. Calling an address without code only
    /// transfers the value. Calls back into the entry point are rejected.
    pub fn call(&mut self, to: Address, value: U256, data: &Bytes) -> Result<Bytes, Revert> {
        if !value.is_zero() {
            self.ensure_mutable()?;
        }
        self.nested_call(to, value, data, self.is_static())
    }

    /// Calls `to` with `data` in a nested frame that may not change state.
    pub fn static_call(&mut self, to: Address, data: &Bytes) -> Result<Bytes, Revert> {
        self.nested_call(to, U256::ZERO, data, true)
    }

    /// Calls `to` with a typed Solidity call and decodes the return value.
    pub fn call_sol<C: SolCall>(
        &mut self,
        to: Address,
        value: U256,
        call: &C,
    ) -> Result<C::Return, Revert> {
        let output = self.call(to, value, &call.abi_encode().into())?;
        C::abi_decode_returns(&output).map_err(|_| Revert::reason("invalid return data"))
    }

    /// Static variant of [`Self::call_sol`].
    pub fn static_call_sol<C: SolCall>(
        &mut self,
        to: Address,
        call: &C,
    ) -> Result<C::Return, Revert> {
        let output = self.static_call(to, &call.abi_encode().into())?;
        C::abi_decode_returns(&output).map_err(|_| Revert::reason("invalid return data"))
    }

    fn nested_call(
        &mut self,
        to: Address,
        value: U256,
        data: &Bytes,
        is_static: bool,
    ) -> Result<Bytes, Revert> {
        self.charge(gas::CALL)?;
        if !value.is_zero() {
            self.charge(gas::CALLVALUE)?;
        }
        if to == self.entry_point() {
            return Err(Revert::reason("reentrant call"));
        }
        if self.frame.depth + 1 >= MAX_CALL_DEPTH {
            return Err(Revert::reason("call depth exceeded"));
        }

        let remaining = self.gas.remaining();
        let frame = Frame {
            caller: self.address(),
            address: to,
            gas_limit: remaining - remaining / 64,
            is_static,
            depth: self.frame.depth + 1,
            ..self.frame
        };
        trace!(caller = %frame.caller, target = %to, gas_limit = frame.gas_limit, "Nested call");

        let code = self.state.code(to);
        let outcome = CallContext::enter(&mut *self.state, frame, |ctx| {
            ctx.state
                .transfer(frame.caller, to, value)
                .map_err(|_| Revert::reason("insufficient balance for call"))?;
            match &code {
                Some(contract) => contract.call(ctx, data),
                None => Ok(Bytes::new()),
            }
        });
        self.charge(outcome.gas_used)?;
        outcome.result
    }

    /// Deploys `contract` at `self.create2(salt, init_code_hash)` and runs its constructor with
    /// `input` in a nested frame. Returns the new address.
    pub fn create2(
        &mut self,
        salt: B256,
        init_code_hash: B256,
        contract: Arc<dyn Contract>,
        input: &Bytes,
    ) -> Result<Address, Revert> {
        self.ensure_mutable()?;
        self.charge(gas::CREATE2)?;
        let address = self.address().create2(salt, init_code_hash);
        if self.frame.depth + 1 >= MAX_CALL_DEPTH {
            return Err(Revert::reason("call depth exceeded"));
        }

        let remaining = self.gas.remaining();
        let frame = Frame {
            caller: self.address(),
            address,
            gas_limit: remaining - remaining / 64,
            is_static: false,
            depth: self.frame.depth + 1,
            ..self.frame
        };
        let outcome = CallContext::enter(&mut *self.state, frame, |ctx| {
            if !ctx.state.deploy(address, contract.clone()) {
                return Err(Revert::reason("create2 collision"));
            }
            contract.construct(ctx, input)
        });
        self.charge(outcome.gas_used)?;
        outcome.result.map(|()| address)
    }

    /// Hashes `data` with keccak-256, charging per 32-byte word.
    pub fn keccak256(&mut self, data: &[u8]) -> Result<B256, Revert> {
        self.charge(gas::KECCAK256_WORD * (data.len() as u64).div_ceil(32))?;
        Ok(keccak256(data))
    }

    /// Recovers the signer of `hash`. Returns `None` if the signature is malformed.
    pub fn ecrecover(&mut self, hash: B256, signature: &[u8]) -> Result<Option<Address>, Revert> {
        self.charge(gas::ECRECOVER)?;
        Ok(recover_signer(hash, signature))
    }

    /// Emits a log from the running contract.
    pub fn emit_log(&mut self, topics: Vec<B256>, data: Bytes) -> Result<(), Revert> {
        self.ensure_mutable()?;
        self.charge(
            gas::LOG + gas::LOG_TOPIC * topics.len() as u64 + gas::LOG_DATA * data.len() as u64,
        )?;
        let data = LogData::new(topics, data).ok_or_else(|| Revert::reason("too many topics"))?;
        self.state.emit_log(Log { address: self.address(), data });
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), Revert> {
        if self.is_static() {
            return Err(Revert::reason("state change during static call"));
        }
        Ok(())
    }
}
