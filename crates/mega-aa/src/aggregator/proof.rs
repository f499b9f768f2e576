//! An aggregator that gates every operation on a zero-knowledge membership proof.
//!
//! The combined signature is an ABI-encoded [`ProofGatedSignature`]: the inner aggregator's
//! signature plus one [`MembershipProof`] per operation, in group order. Each operation must prove
//! membership with a fresh nullifier before the inner signature check runs.

use core::fmt::Debug;

use alloy_primitives::{keccak256, Bytes, U256};
use alloy_sol_types::{SolType, SolValue};
use auto_impl::auto_impl;
use tracing::{debug, trace};

use crate::{
    constants::gas, Aggregator, CallContext, Contract, MembershipProof, ProofGatedSignature,
    Revert, UserOperation,
};

/// Storage slot of the spent nullifier mapping.
const NULLIFIERS_SLOT: U256 = U256::ZERO;

/// External verifier of membership proofs.
#[auto_impl(&, Box, Arc)]
pub trait ProofVerifier {
    /// Whether `proof` shows membership in the set committed to by `root`, bound to `signal_hash`,
    /// `nullifier_hash` and `external_nullifier`.
    fn verify_proof(
        &self,
        root: U256,
        signal_hash: U256,
        nullifier_hash: U256,
        external_nullifier: U256,
        proof: &[U256; 8],
    ) -> bool;
}

/// Maps bytes into the scalar field of the proof system: the keccak hash shifted right by 8 bits.
pub fn hash_to_field(data: &[u8]) -> U256 {
    U256::from_be_bytes(keccak256(data).0) >> 8
}

/// The signal an operation's proof is bound to: `hash_to_field(abi.encodePacked(sender, nonce,
/// callData))`.
pub fn signal_hash(op: &UserOperation) -> U256 {
    hash_to_field(&(op.sender, op.nonce, op.callData.clone()).abi_encode_packed())
}

fn nullifier_slot(nullifier_hash: U256) -> U256 {
    U256::from_be_bytes(keccak256((nullifier_hash, NULLIFIERS_SLOT).abi_encode()).0)
}

fn decode(combined: &Bytes) -> Result<ProofGatedSignature, Revert> {
    <ProofGatedSignature as SolType>::abi_decode(combined)
        .map_err(|_| Revert::reason("ProofGatedAggregator: invalid signature encoding"))
}

/// Wraps an inner aggregator and requires a valid, unspent membership proof per operation.
#[derive(Debug, Clone)]
pub struct ProofGatedAggregator<A, V> {
    inner: A,
    verifier: V,
}

impl<A, V> ProofGatedAggregator<A, V> {
    /// Creates a proof-gated aggregator around `inner` that checks proofs with `verifier`.
    pub const fn new(inner: A, verifier: V) -> Self {
        Self { inner, verifier }
    }

    /// Encodes an inner signature and the proofs of a group into a combined signature.
    pub fn combine(aggregated_signature: Bytes, proofs: Vec<MembershipProof>) -> Bytes {
        ProofGatedSignature { aggregatedSignature: aggregated_signature, proofs }
            .abi_encode()
            .into()
    }

    /// Whether the nullifier has been spent by the aggregator deployed in `ctx`.
    pub fn is_spent(ctx: &mut CallContext<'_>, nullifier_hash: U256) -> Result<bool, Revert> {
        Ok(!ctx.sload(nullifier_slot(nullifier_hash))?.is_zero())
    }
}

impl<A, V> ProofGatedAggregator<A, V>
where
    A: Aggregator,
{
    /// Aggregates the shares of `ops` with the inner aggregator and attaches `proofs`.
    pub fn aggregate_with_proofs(
        &self,
        ops: &[UserOperation],
        proofs: Vec<MembershipProof>,
    ) -> Result<Bytes, Revert> {
        Ok(Self::combine(self.inner.aggregate_signatures(ops)?, proofs))
    }
}

impl<A, V> Contract for ProofGatedAggregator<A, V>
where
    A: Aggregator + Debug + Send + Sync,
    V: ProofVerifier + Debug + Send + Sync,
{
    fn as_aggregator(&self) -> Option<&dyn Aggregator> {
        Some(self)
    }
}

impl<A, V> Aggregator for ProofGatedAggregator<A, V>
where
    A: Aggregator,
    V: ProofVerifier,
{
    /// Aggregates with the inner aggregator. The result carries no proofs; use
    /// [`ProofGatedAggregator::aggregate_with_proofs`] to attach them.
    fn aggregate_signatures(&self, ops: &[UserOperation]) -> Result<Bytes, Revert> {
        self.aggregate_with_proofs(ops, Vec::new())
    }

    fn extract_signature(
        &self,
        combined: &Bytes,
        ops: &[UserOperation],
        index: usize,
    ) -> Result<Bytes, Revert> {
        let signature = decode(combined)?;
        self.inner.extract_signature(&signature.aggregatedSignature, ops, index)
    }

    fn validate_signatures(
        &self,
        ctx: &mut CallContext<'_>,
        ops: &[UserOperation],
        combined: &Bytes,
    ) -> Result<(), Revert> {
        let signature = decode(combined)?;
        if signature.proofs.len() != ops.len() {
            return Err(Revert::reason(format!(
                "ProofGatedAggregator: {} proofs for {} operations",
                signature.proofs.len(),
                ops.len()
            )));
        }
        self.inner.validate_signatures(ctx, ops, &signature.aggregatedSignature)
    }

    fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        index: usize,
        op: &UserOperation,
        combined: &Bytes,
    ) -> Result<(), Revert> {
        let signature = decode(combined)?;
        let Some(proof) = signature.proofs.get(index) else {
            return Err(Revert::reason("ProofGatedAggregator: missing proof"));
        };
        if Self::is_spent(ctx, proof.nullifierHash)? {
            return Err(Revert::reason("ProofGatedAggregator: nullifier already spent"));
        }

        ctx.charge(gas::PROOF_VERIFICATION)?;
        let signal = signal_hash(op);
        let valid = self.verifier.verify_proof(
            proof.root,
            signal,
            proof.nullifierHash,
            proof.externalNullifier,
            &proof.proof,
        );
        trace!(index, sender = %op.sender, %signal, valid, "Checked membership proof");
        if !valid {
            return Err(Revert::reason("ProofGatedAggregator: invalid proof"));
        }

        ctx.sstore(nullifier_slot(proof.nullifierHash), U256::from(1))?;
        debug!(index, nullifier = %proof.nullifierHash, "Nullifier spent");
        self.inner.validate_user_op(ctx, index, op, &signature.aggregatedSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_hash_to_field_clears_top_byte() {
        let field = hash_to_field(b"signal");
        assert_eq!(field.to_be_bytes::<32>()[0], 0);
        assert_eq!(field, U256::from_be_bytes(keccak256(b"signal").0) >> 8);
    }

    #[test]
    fn test_signal_binds_sender_nonce_and_call_data() {
        let op = UserOperation {
            sender: address!("0x1111111111111111111111111111111111111111"),
            nonce: U256::from(1),
            callData: Bytes::from_static(&[1, 2, 3]),
            ..Default::default()
        };
        let mut packed = op.sender.to_vec();
        packed.extend_from_slice(&op.nonce.to_be_bytes::<32>());
        packed.extend_from_slice(&op.callData);
        assert_eq!(signal_hash(&op), hash_to_field(&packed));

        let other = UserOperation { nonce: U256::from(2), ..op.clone() };
        assert_ne!(signal_hash(&other), signal_hash(&op));
        let resigned = UserOperation { signature: Bytes::from_static(&[9]), ..op.clone() };
        assert_eq!(signal_hash(&resigned), signal_hash(&op));
    }

    #[test]
    fn test_nullifier_slots_are_distinct() {
        assert_ne!(nullifier_slot(U256::from(1)), nullifier_slot(U256::from(2)));
        assert_ne!(nullifier_slot(U256::ZERO), NULLIFIERS_SLOT);
    }
}
