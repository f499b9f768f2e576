//! BLS12-381 signature aggregation.
//!
//! Public keys are compressed G1 points (48 bytes) and signatures compressed G2 points (96 bytes).
//! Every account signs its own request id, hashed onto G2 with the SSWU map. A group is valid if
//!
//! ```text
//! e(g1, Σ σᵢ) == Π e(pkᵢ, H(requestIdᵢ))
//! ```

use alloy_primitives::{keccak256, Address, Bytes, B256};
use ark_bls12_381::{g2, Bls12_381, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{
    hashing::{curve_maps::wb::WBMap, map_to_curve_hasher::MapToCurveBasedHasher, HashToCurve},
    pairing::Pairing,
    AffineRepr, CurveGroup, Group,
};
use ark_ff::{field_hashers::DefaultFieldHasher, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use mega_aa_contracts::IBlsAccount;
use sha2::Sha256;
use tracing::trace;

use crate::{
    constants::gas, Aggregator, CallContext, Contract, Revert, UserOperation, UserOperationExt,
};

/// Domain separation tag of the hash onto G2.
pub const BLS_DOMAIN: &[u8] = b"MEGA_AA_BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_";

/// Length of a compressed public key.
pub const BLS_PUBLIC_KEY_LENGTH: usize = 48;

/// Length of a compressed signature.
pub const BLS_SIGNATURE_LENGTH: usize = 96;

type G2Hasher =
    MapToCurveBasedHasher<G2Projective, DefaultFieldHasher<Sha256, 128>, WBMap<g2::Config>>;

/// Hashes a request id onto G2.
pub fn hash_request_id(request_id: B256) -> Result<G2Affine, Revert> {
    G2Hasher::new(BLS_DOMAIN)
        .and_then(|hasher| hasher.hash(request_id.as_slice()))
        .map_err(|_| Revert::reason("BLS: hash to curve failed"))
}

/// A BLS secret key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsSecretKey(Fr);

impl BlsSecretKey {
    /// Derives a secret key from arbitrary seed material.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(keccak256(seed).as_slice()))
    }

    /// The compressed public key.
    pub fn public_key(&self) -> Result<Bytes, Revert> {
        compress((G1Projective::generator() * self.0).into_affine())
    }

    /// Signs `request_id`. Returns the compressed signature.
    pub fn sign(&self, request_id: B256) -> Result<Bytes, Revert> {
        compress((hash_request_id(request_id)? * self.0).into_affine())
    }
}

fn compress(point: impl CanonicalSerialize) -> Result<Bytes, Revert> {
    let mut out = Vec::with_capacity(point.compressed_size());
    point
        .serialize_compressed(&mut out)
        .map_err(|_| Revert::reason("BLS: point serialization failed"))?;
    Ok(out.into())
}

fn decompress_signature(data: &[u8]) -> Result<G2Affine, Revert> {
    if data.len() != BLS_SIGNATURE_LENGTH {
        return Err(Revert::reason("BLS: invalid signature length"));
    }
    G2Affine::deserialize_compressed(data).map_err(|_| Revert::reason("BLS: invalid signature"))
}

fn decompress_public_key(data: &[u8]) -> Result<G1Affine, Revert> {
    if data.len() != BLS_PUBLIC_KEY_LENGTH {
        return Err(Revert::reason("BLS: invalid public key length"));
    }
    let key = G1Affine::deserialize_compressed(data)
        .map_err(|_| Revert::reason("BLS: invalid public key"))?;
    if key.is_zero() {
        return Err(Revert::reason("BLS: invalid public key"));
    }
    Ok(key)
}

/// Aggregates compressed signatures by adding their points.
pub fn aggregate<'a>(signatures: impl IntoIterator<Item = &'a [u8]>) -> Result<Bytes, Revert> {
    let mut sum = G2Projective::default();
    for signature in signatures {
        sum += decompress_signature(signature)?;
    }
    compress(sum.into_affine())
}

/// The BLS aggregator. Each operation's signature field holds its share; accounts read their
/// public key from [`IBlsAccount::getBlsPublicKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BlsAggregator;

impl Contract for BlsAggregator {
    fn as_aggregator(&self) -> Option<&dyn Aggregator> {
        Some(self)
    }
}

impl Aggregator for BlsAggregator {
    fn aggregate_signatures(&self, ops: &[UserOperation]) -> Result<Bytes, Revert> {
        aggregate(ops.iter().map(|op| op.signature.as_ref()))
    }

    /// The combined signature covers every operation, so accounts receive an empty share.
    fn extract_signature(
        &self,
        _combined: &Bytes,
        _ops: &[UserOperation],
        _index: usize,
    ) -> Result<Bytes, Revert> {
        Ok(Bytes::new())
    }

    fn validate_signatures(
        &self,
        ctx: &mut CallContext<'_>,
        ops: &[UserOperation],
        combined: &Bytes,
    ) -> Result<(), Revert> {
        let signature = decompress_signature(combined)?;
        if ops.is_empty() {
            return if signature.is_zero() {
                Ok(())
            } else {
                Err(Revert::reason("BLS: signature over empty group"))
            };
        }
        if signature.is_zero() {
            return Err(Revert::reason("BLS: identity signature"));
        }
        ctx.charge(gas::PAIRING_BASE + gas::PAIRING * (ops.len() as u64 + 1))?;

        let (entry_point, chain_id) = (ctx.entry_point(), ctx.chain_id());
        let mut public_keys = Vec::with_capacity(ops.len());
        let mut messages = Vec::with_capacity(ops.len());
        for op in ops {
            let key = bls_public_key(ctx, op.sender)?;
            public_keys.push(key);
            messages.push(hash_request_id(op.request_id(entry_point, chain_id))?);
        }

        let lhs = Bls12_381::pairing(G1Affine::generator(), signature);
        let rhs = Bls12_381::multi_pairing(public_keys, messages);
        trace!(ops = ops.len(), valid = lhs == rhs, "Checked BLS pairing");
        if lhs != rhs {
            return Err(Revert::reason("BLS: signature verification failed"));
        }
        Ok(())
    }
}

fn bls_public_key(ctx: &mut CallContext<'_>, account: Address) -> Result<G1Affine, Revert> {
    let key = ctx.static_call_sol(account, &IBlsAccount::getBlsPublicKeyCall {})?;
    decompress_public_key(&key)
}
