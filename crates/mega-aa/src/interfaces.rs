//! Traits implemented by the collaborators of the entry point.
//!
//! Everything the entry point calls into is a [`Contract`] deployed in the
//! [`WorldState`](crate::WorldState). A contract advertises the roles it can play through the
//! `as_*` accessors; the entry point never downcasts.

use core::fmt::Debug;

use alloy_primitives::{Address, Bytes, B256, U256};
use auto_impl::auto_impl;

use crate::{CallContext, PostOpMode, Revert, UserOperation, ValidationData};

/// Code deployed at an address.
///
/// Contracts are stateless: their mutable state lives in the storage of their address and is
/// reached through the [`CallContext`].
pub trait Contract: Debug + Send + Sync {
    /// Handles a plain call. The default rejects every call with empty revert data.
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, Revert> {
        let _ = (ctx, data);
        Err(Revert::empty())
    }

    /// Runs once when the contract is deployed through [`CallContext::create2`].
    fn construct(&self, ctx: &mut CallContext<'_>, input: &Bytes) -> Result<(), Revert> {
        let _ = (ctx, input);
        Ok(())
    }

    /// The account role of the contract, if it is a smart account.
    fn as_account(&self) -> Option<&dyn Account> {
        None
    }

    /// The paymaster role of the contract, if it sponsors operations.
    fn as_paymaster(&self) -> Option<&dyn Paymaster> {
        None
    }

    /// The factory role of the contract, if it deploys accounts.
    fn as_factory(&self) -> Option<&dyn AccountFactory> {
        None
    }

    /// The aggregator role of the contract, if it verifies signatures in bulk.
    fn as_aggregator(&self) -> Option<&dyn Aggregator> {
        None
    }
}

/// A smart account.
#[auto_impl(&, Box, Arc)]
pub trait Account {
    /// Validates the signature and nonce of `op` and pays `missing_account_funds` into the
    /// account's deposit.
    ///
    /// Returning [`ValidationData`] with [`Authorizer::SignatureFailed`](crate::Authorizer) rejects
    /// the operation without a revert. Any revert rejects it too, with the revert reason surfaced
    /// in the [`FailedOp`](crate::FailedOp).
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        request_id: B256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, Revert>;

    /// Executes the call payload of a validated operation.
    fn execute(&self, ctx: &mut CallContext<'_>, call_data: &Bytes) -> Result<Bytes, Revert>;
}

/// Result of a paymaster agreeing to sponsor an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymasterValidation {
    /// Opaque data handed back unmodified to [`Paymaster::post_op`]. Empty means no callback.
    pub context: Bytes,
    /// Signature and time-window verdict.
    pub validation_data: ValidationData,
}

/// A contract that pays for other accounts' operations.
#[auto_impl(&, Box, Arc)]
pub trait Paymaster {
    /// Decides whether to sponsor `op`, which can cost up to `max_cost`.
    fn validate_paymaster_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        request_id: B256,
        max_cost: U256,
    ) -> Result<PaymasterValidation, Revert>;

    /// Called after execution with the outcome and the actual cost, if validation returned a
    /// non-empty context.
    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        context: &Bytes,
        actual_gas_cost: U256,
    ) -> Result<(), Revert>;
}

/// A contract that deploys accounts at deterministic addresses.
#[auto_impl(&, Box, Arc)]
pub trait AccountFactory {
    /// Deploys an account described by `data` with `salt`. Returns the new account address, which
    /// must be `factory.create2(salt, keccak256(data))`.
    fn create_account(
        &self,
        ctx: &mut CallContext<'_>,
        data: &Bytes,
        salt: B256,
    ) -> Result<Address, Revert>;
}

/// A contract that verifies the signatures of a group of operations at once.
#[auto_impl(&, Box, Arc)]
pub trait Aggregator {
    /// Combines the signature shares held in each operation's signature field into one blob.
    fn aggregate_signatures(&self, ops: &[UserOperation]) -> Result<Bytes, Revert>;

    /// Extracts the component of `combined` that belongs to `ops[index]`. The entry point places it
    /// in the operation's signature field before the account validates it.
    fn extract_signature(
        &self,
        combined: &Bytes,
        ops: &[UserOperation],
        index: usize,
    ) -> Result<Bytes, Revert>;

    /// Verifies the combined signature of the whole group. A failure rejects the whole batch.
    fn validate_signatures(
        &self,
        ctx: &mut CallContext<'_>,
        ops: &[UserOperation],
        combined: &Bytes,
    ) -> Result<(), Revert>;

    /// Per-operation check run before the account validates. A revert rejects only `op`.
    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        index: usize,
        op: &UserOperation,
        combined: &Bytes,
    ) -> Result<(), Revert> {
        let _ = (ctx, index, op, combined);
        Ok(())
    }
}
