use std::sync::Arc;

use alloy_primitives::{eip191_hash_message, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface};
use mega_aa_contracts::{
    IBlsAccount, ISimpleAccount::{self, ISimpleAccountCalls}, ISimpleAccountFactory,
};

use crate::{
    address_to_word, word_to_address, Account, AccountFactory, CallContext, Contract, Revert,
    UserOperation, ValidationData, WorldState,
};

const OWNER_SLOT: U256 = U256::ZERO;
const NONCE_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Checks the caller is the entry point and consumes the sequential nonce of the account.
fn use_nonce(ctx: &mut CallContext<'_>, op: &UserOperation) -> Result<(), Revert> {
    if ctx.caller() != ctx.entry_point() {
        return Err(Revert::reason("account: not from entry point"));
    }
    let nonce = ctx.sload(NONCE_SLOT)?;
    if op.nonce != nonce {
        return Err(Revert::reason("account: invalid nonce"));
    }
    ctx.sstore(NONCE_SLOT, nonce + U256::from(1))
}

/// Tops up the deposit of the account. A failed payment is left for the entry point to reject.
fn pay_prefund(ctx: &mut CallContext<'_>, missing_account_funds: U256) -> Result<(), Revert> {
    if missing_account_funds.is_zero() {
        return Ok(());
    }
    let account = ctx.address();
    match ctx.deposit_to(account, missing_account_funds) {
        Err(Revert::OutOfGas) => Err(Revert::OutOfGas),
        _ => Ok(()),
    }
}

fn nonce_return(ctx: &mut CallContext<'_>) -> Result<Bytes, Revert> {
    let nonce = ctx.sload(NONCE_SLOT)?;
    Ok(ISimpleAccount::nonceCall::abi_encode_returns(&nonce).into())
}

/// The sample wallet: an owner key and a sequential nonce. The owner signs the EIP-191 hash of the
/// request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAccount;

impl SimpleAccount {
    /// Deploys an account owned by `owner` at `address`.
    pub fn deploy(state: &mut WorldState, address: Address, owner: Address) {
        state.deploy(address, Arc::new(Self));
        state.set_storage(address, OWNER_SLOT, address_to_word(owner));
    }

    /// The current nonce of the account at `address`.
    pub fn nonce(state: &WorldState, address: Address) -> U256 {
        state.storage(address, NONCE_SLOT)
    }

    /// Call data executing a call to `dest` through the account.
    pub fn execute_call(dest: Address, value: U256, func: Bytes) -> Bytes {
        ISimpleAccount::executeCall { dest, value, func }.abi_encode().into()
    }
}

impl Contract for SimpleAccount {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, Revert> {
        match ISimpleAccountCalls::abi_decode(data) {
            Ok(ISimpleAccountCalls::nonce(_)) => nonce_return(ctx),
            Ok(ISimpleAccountCalls::execute(_)) => self.execute(ctx, data),
            Err(_) => Ok(Bytes::new()),
        }
    }

    fn construct(&self, ctx: &mut CallContext<'_>, input: &Bytes) -> Result<(), Revert> {
        let call = ISimpleAccountFactory::createAccountCall::abi_decode(input)
            .map_err(|_| Revert::reason("account: invalid constructor input"))?;
        ctx.sstore(OWNER_SLOT, address_to_word(call.owner))
    }

    fn as_account(&self) -> Option<&dyn Account> {
        Some(self)
    }
}

impl Account for SimpleAccount {
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        request_id: B256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, Revert> {
        use_nonce(ctx, op)?;
        let owner = word_to_address(ctx.sload(OWNER_SLOT)?);
        let signer = ctx.ecrecover(eip191_hash_message(request_id), &op.signature)?;
        if signer != Some(owner) {
            return Err(Revert::reason("account: wrong signature"));
        }
        pay_prefund(ctx, missing_account_funds)?;
        Ok(ValidationData::valid())
    }

    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> Result<Bytes, Revert> {
        let call = ISimpleAccount::executeCall::abi_decode(call_data)
            .map_err(|_| Revert::reason("account: unknown call"))?;
        let owner = word_to_address(ctx.sload(OWNER_SLOT)?);
        if ctx.caller() != ctx.entry_point() && ctx.caller() != owner {
            return Err(Revert::reason("account: not owner or entry point"));
        }
        ctx.call(call.dest, call.value, &call.func)
    }
}

/// Deploys [`SimpleAccount`]s with `CREATE2`, salted by the operation nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAccountFactory;

impl SimpleAccountFactory {
    /// Init code deploying an account owned by `owner` through the factory at `factory`.
    pub fn init_code(factory: Address, owner: Address) -> Bytes {
        let mut init_code = factory.to_vec();
        init_code.extend(ISimpleAccountFactory::createAccountCall { owner }.abi_encode());
        init_code.into()
    }
}

impl Contract for SimpleAccountFactory {
    fn as_factory(&self) -> Option<&dyn AccountFactory> {
        Some(self)
    }
}

impl AccountFactory for SimpleAccountFactory {
    fn create_account(
        &self,
        ctx: &mut CallContext<'_>,
        data: &Bytes,
        salt: B256,
    ) -> Result<Address, Revert> {
        ctx.create2(salt, keccak256(data), Arc::new(SimpleAccount), data)
    }
}

/// An account whose signature is verified by a BLS aggregator. The public key is immutable code
/// data; the nonce lives in storage.
#[derive(Debug, Clone)]
pub struct BlsAccount {
    aggregator: Address,
    public_key: Bytes,
}

impl BlsAccount {
    /// Creates an account that defers to `aggregator` and verifies with `public_key`.
    pub const fn new(aggregator: Address, public_key: Bytes) -> Self {
        Self { aggregator, public_key }
    }

    /// Deploys the account at `address`.
    pub fn deploy(self, state: &mut WorldState, address: Address) {
        state.deploy(address, Arc::new(self));
    }
}

impl Contract for BlsAccount {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, Revert> {
        if data.starts_with(&IBlsAccount::getBlsPublicKeyCall::SELECTOR) {
            let public_key = IBlsAccount::getBlsPublicKeyCall::abi_encode_returns(&self.public_key);
            return Ok(public_key.into());
        }
        match ISimpleAccountCalls::abi_decode(data) {
            Ok(ISimpleAccountCalls::nonce(_)) => nonce_return(ctx),
            _ => Ok(Bytes::new()),
        }
    }

    fn as_account(&self) -> Option<&dyn Account> {
        Some(self)
    }
}

impl Account for BlsAccount {
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        _request_id: B256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, Revert> {
        use_nonce(ctx, op)?;
        pay_prefund(ctx, missing_account_funds)?;
        Ok(ValidationData::aggregated(self.aggregator))
    }

    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> Result<Bytes, Revert> {
        let call = ISimpleAccount::executeCall::abi_decode(call_data)
            .map_err(|_| Revert::reason("account: unknown call"))?;
        if ctx.caller() != ctx.entry_point() {
            return Err(Revert::reason("account: not from entry point"));
        }
        ctx.call(call.dest, call.value, &call.func)
    }
}
