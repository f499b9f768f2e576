use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

use crate::{
    hash_to_field, CallContext, Contract, Paymaster, PaymasterValidation, PostOpMode,
    ProofVerifier, Revert, UserOperation, ValidationData, WorldState,
};

/// Increments storage slot 0 on every call and returns the new value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterTarget;

impl CounterTarget {
    /// The counter of the target at `address`.
    pub fn count(state: &WorldState, address: Address) -> U256 {
        state.storage(address, U256::ZERO)
    }
}

impl Contract for CounterTarget {
    fn call(&self, ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, Revert> {
        let count = ctx.sload(U256::ZERO)? + U256::from(1);
        ctx.sstore(U256::ZERO, count)?;
        Ok(count.abi_encode().into())
    }
}

/// Reverts every call with `"target: reverted"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertingTarget;

impl Contract for RevertingTarget {
    fn call(&self, _ctx: &mut CallContext<'_>, _data: &Bytes) -> Result<Bytes, Revert> {
        Err(Revert::reason("target: reverted"))
    }
}

/// Tries to call back into the entry point with the call data it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReentrantTarget;

impl Contract for ReentrantTarget {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, Revert> {
        let entry_point = ctx.entry_point();
        ctx.call(entry_point, U256::ZERO, data)
    }
}

/// When a [`MockPaymaster`] reverts its `post_op`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostOpBehavior {
    /// Never.
    #[default]
    Succeed,
    /// Only in the first call, so the retry with [`PostOpMode::PostOpReverted`] succeeds.
    RevertFirst,
    /// Always.
    RevertAlways,
}

/// A paymaster that sponsors every operation.
///
/// `post_op` records the number of calls, the last mode and the last actual cost in storage slots
/// 0, 1 and 2.
#[derive(Debug, Clone, Default)]
pub struct MockPaymaster {
    /// Context returned from validation. Empty means no `post_op`.
    pub context: Bytes,
    /// How `post_op` behaves.
    pub post_op: PostOpBehavior,
    /// Validation result returned to the entry point.
    pub validation_data: ValidationData,
    /// Reverts validation with this reason, if set.
    pub reject: Option<&'static str>,
}

impl MockPaymaster {
    /// Storage slot of the `post_op` call counter.
    pub const CALLS_SLOT: U256 = U256::ZERO;
    /// Storage slot of the last mode: 1 succeeded, 2 reverted, 3 post-op reverted.
    pub const MODE_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);
    /// Storage slot of the last actual cost.
    pub const COST_SLOT: U256 = U256::from_limbs([2, 0, 0, 0]);

    /// Deploys the paymaster at `address`.
    pub fn deploy(self, state: &mut WorldState, address: Address) {
        state.deploy(address, Arc::new(self));
    }

    /// The mode recorded by the last successful `post_op` of the paymaster at `address`.
    pub fn last_mode(state: &WorldState, address: Address) -> Option<PostOpMode> {
        match state.storage(address, Self::MODE_SLOT).saturating_to::<u8>() {
            1 => Some(PostOpMode::OpSucceeded),
            2 => Some(PostOpMode::OpReverted),
            3 => Some(PostOpMode::PostOpReverted),
            _ => None,
        }
    }
}

impl Contract for MockPaymaster {
    fn as_paymaster(&self) -> Option<&dyn Paymaster> {
        Some(self)
    }
}

impl Paymaster for MockPaymaster {
    fn validate_paymaster_user_op(
        &self,
        _ctx: &mut CallContext<'_>,
        _op: &UserOperation,
        _request_id: B256,
        _max_cost: U256,
    ) -> Result<PaymasterValidation, Revert> {
        if let Some(reason) = self.reject {
            return Err(Revert::reason(reason));
        }
        Ok(PaymasterValidation {
            context: self.context.clone(),
            validation_data: self.validation_data,
        })
    }

    fn post_op(
        &self,
        ctx: &mut CallContext<'_>,
        mode: PostOpMode,
        _context: &Bytes,
        actual_gas_cost: U256,
    ) -> Result<(), Revert> {
        let calls = ctx.sload(Self::CALLS_SLOT)? + U256::from(1);
        ctx.sstore(Self::CALLS_SLOT, calls)?;
        let code = match mode {
            PostOpMode::OpSucceeded => 1u8,
            PostOpMode::OpReverted => 2,
            PostOpMode::PostOpReverted => 3,
        };
        ctx.sstore(Self::MODE_SLOT, U256::from(code))?;
        ctx.sstore(Self::COST_SLOT, actual_gas_cost)?;
        match (self.post_op, mode) {
            (PostOpBehavior::RevertAlways, _) => Err(Revert::reason("paymaster: post_op failed")),
            (PostOpBehavior::RevertFirst, PostOpMode::OpSucceeded | PostOpMode::OpReverted) => {
                Err(Revert::reason("paymaster: post_op failed"))
            }
            _ => Ok(()),
        }
    }
}

/// A proof verifier whose proofs are a hash of the public inputs, optionally restricted to one
/// membership root.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProofVerifier {
    /// The only accepted root, if set.
    pub root: Option<U256>,
}

impl MockProofVerifier {
    /// The proof the verifier accepts for the given public inputs.
    pub fn prove(
        root: U256,
        signal_hash: U256,
        nullifier_hash: U256,
        external_nullifier: U256,
    ) -> [U256; 8] {
        let digest = hash_to_field(
            &(root, signal_hash, nullifier_hash, external_nullifier).abi_encode(),
        );
        let mut proof = [U256::ZERO; 8];
        proof[0] = digest;
        proof[7] = U256::from_be_bytes(keccak256(digest.to_be_bytes::<32>()).0);
        proof
    }
}

impl ProofVerifier for MockProofVerifier {
    fn verify_proof(
        &self,
        root: U256,
        signal_hash: U256,
        nullifier_hash: U256,
        external_nullifier: U256,
        proof: &[U256; 8],
    ) -> bool {
        self.root.is_none_or(|accepted| accepted == root) &&
            *proof == Self::prove(root, signal_hash, nullifier_hash, external_nullifier)
    }
}
