//! A paymaster that sponsors operations approved by an off-chain signer.
//!
//! The paymaster data of a sponsored operation is
//!
//! ```text
//! abi.encode(uint48 validUntil, uint48 validAfter) || signature
//! ```
//!
//! where `signature` is a 64 or 65 byte ECDSA signature of the EIP-191 message hash of
//! [`VerifyingPaymaster::get_hash`]. The paymaster data itself is not part of the hash.

use std::sync::Arc;

use alloy_primitives::{eip191_hash_message, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol_data, SolCall, SolInterface, SolType, SolValue};
use mega_aa_contracts::IVerifyingPaymaster::{self, IVerifyingPaymasterCalls};
use tracing::trace;

use crate::{
    address_to_word, word_to_address, CallContext, Contract, Paymaster, PaymasterValidation,
    PostOpMode, Revert, UserOperation, ValidationData, WorldState,
};

/// Storage slot of the owner.
const OWNER_SLOT: U256 = U256::ZERO;
/// Storage slot of the verifying signer.
const SIGNER_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Length of the encoded validity window at the start of the paymaster data.
const WINDOW_LENGTH: usize = 64;

type ValidityWindow = (sol_data::Uint<48>, sol_data::Uint<48>);

/// Paymaster data decoded into its window and signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyingPaymasterData<'a> {
    /// Expiry of the sponsorship. Zero means no expiry.
    pub valid_until: u64,
    /// Start of the sponsorship.
    pub valid_after: u64,
    /// Signature of the verifying signer.
    pub signature: &'a [u8],
}

impl<'a> VerifyingPaymasterData<'a> {
    /// Decodes paymaster data. Fails unless the signature is 64 or 65 bytes long.
    pub fn decode(data: &'a [u8]) -> Result<Self, Revert> {
        if !matches!(data.len().checked_sub(WINDOW_LENGTH), Some(64 | 65)) {
            return Err(Revert::reason(
                "VerifyingPaymaster: invalid signature length in paymasterData",
            ));
        }
        let (valid_until, valid_after) =
            ValidityWindow::abi_decode_params(&data[..WINDOW_LENGTH])
                .map_err(|_| Revert::reason("VerifyingPaymaster: invalid validity window"))?;
        Ok(Self {
            valid_until: valid_until.to::<u64>(),
            valid_after: valid_after.to::<u64>(),
            signature: &data[WINDOW_LENGTH..] })
    }

    /// Encodes a window and a signature into paymaster data.
    pub fn encode(valid_until: u64, valid_after: u64, signature: &[u8]) -> Bytes {
        let mut data = ValidityWindow::abi_encode_params(&(
            alloy_primitives::aliases::U48::from(valid_until),
            alloy_primitives::aliases::U48::from(valid_after),
        ));
        data.extend_from_slice(signature);
        data.into()
    }
}

/// The verifying paymaster. Its owner and signer live in its storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyingPaymaster;

impl VerifyingPaymaster {
    /// Deploys a verifying paymaster at `address` with the given owner and signer.
    pub fn deploy(state: &mut WorldState, address: Address, owner: Address, signer: Address) {
        state.deploy(address, Arc::new(Self));
        state.set_storage(address, OWNER_SLOT, address_to_word(owner));
        state.set_storage(address, SIGNER_SLOT, address_to_word(signer));
    }

    /// The hash the verifying signer approves for `op`. It covers every field of the operation
    /// except the paymaster data and the signature, plus the chain, the paymaster and the window.
    pub fn get_hash(
        op: &UserOperation,
        chain_id: u64,
        paymaster: Address,
        valid_until: u64,
        valid_after: u64,
    ) -> B256 {
        keccak256(
            (
                op.sender,
                op.nonce,
                keccak256(&op.initCode),
                keccak256(&op.callData),
                op.callGas,
                op.verificationGas,
                op.preVerificationGas,
                op.maxFeePerGas,
                op.maxPriorityFeePerGas,
                U256::from(chain_id),
                paymaster,
                valid_until,
                valid_after,
            )
                .abi_encode(),
        )
    }

    /// The current verifying signer of the paymaster at `address`.
    pub fn verifying_signer(state: &WorldState, address: Address) -> Address {
        word_to_address(state.storage(address, SIGNER_SLOT))
    }
}

impl Contract for VerifyingPaymaster {
    fn call(&self, ctx: &mut CallContext<'_>, data: &Bytes) -> Result<Bytes, Revert> {
        let call = IVerifyingPaymasterCalls::abi_decode(data)
            .map_err(|_| Revert::reason("VerifyingPaymaster: unknown call"))?;
        match call {
            IVerifyingPaymasterCalls::verifyingSigner(_) => {
                let signer = word_to_address(ctx.sload(SIGNER_SLOT)?);
                Ok(IVerifyingPaymaster::verifyingSignerCall::abi_encode_returns(&signer).into())
            }
            IVerifyingPaymasterCalls::setVerifyingSigner(call) => {
                let owner = word_to_address(ctx.sload(OWNER_SLOT)?);
                if ctx.caller() != owner {
                    return Err(Revert::reason("VerifyingPaymaster: caller is not the owner"));
                }
                ctx.sstore(SIGNER_SLOT, address_to_word(call.signer))?;
                Ok(Bytes::new())
            }
        }
    }

    fn construct(&self, ctx: &mut CallContext<'_>, input: &Bytes) -> Result<(), Revert> {
        let (owner, signer) = <(Address, Address)>::abi_decode_params(input)
            .map_err(|_| Revert::reason("VerifyingPaymaster: invalid constructor input"))?;
        ctx.sstore(OWNER_SLOT, address_to_word(owner))?;
        ctx.sstore(SIGNER_SLOT, address_to_word(signer))
    }

    fn as_paymaster(&self) -> Option<&dyn Paymaster> {
        Some(self)
    }
}

impl Paymaster for VerifyingPaymaster {
    fn validate_paymaster_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        _request_id: B256,
        _max_cost: U256,
    ) -> Result<PaymasterValidation, Revert> {
        let data = VerifyingPaymasterData::decode(&op.paymasterData)?;
        let hash =
            Self::get_hash(op, ctx.chain_id(), ctx.address(), data.valid_until, data.valid_after);
        let signer = word_to_address(ctx.sload(SIGNER_SLOT)?);
        let recovered = ctx.ecrecover(eip191_hash_message(hash), data.signature)?;
        trace!(paymaster = %ctx.address(), %signer, ?recovered, "Checked sponsorship signature");

        let validation_data = if recovered == Some(signer) {
            ValidationData::valid()
        } else {
            ValidationData::signature_failed()
        };
        Ok(PaymasterValidation {
            context: Bytes::new(),
            validation_data: validation_data.with_window(data.valid_after, data.valid_until),
        })
    }

    fn post_op(
        &self,
        _ctx: &mut CallContext<'_>,
        _mode: PostOpMode,
        _context: &Bytes,
        _actual_gas_cost: U256,
    ) -> Result<(), Revert> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Frame;
    use alloy_primitives::address;

    const PAYMASTER: Address = address!("0x000000000000000000000000000000000000b001");
    const OWNER: Address = address!("0x000000000000000000000000000000000000b0ff");
    const SIGNER: Address = address!("0x000000000000000000000000000000000000b0b1");

    fn call_from(state: &mut WorldState, caller: Address, data: Bytes) -> Result<Bytes, Revert> {
        let frame = Frame {
            entry_point: Address::ZERO,
            chain_id: 1,
            caller,
            address: PAYMASTER,
            gas_limit: 100_000,
            is_static: false,
            depth: 0,
        };
        CallContext::enter(state, frame, |ctx| VerifyingPaymaster.call(ctx, &data)).result
    }

    #[test]
    fn test_only_owner_rotates_signer() {
        let mut state = WorldState::default();
        VerifyingPaymaster::deploy(&mut state, PAYMASTER, OWNER, SIGNER);
        let rotate: Bytes =
            IVerifyingPaymaster::setVerifyingSignerCall { signer: OWNER }.abi_encode().into();

        let err = call_from(&mut state, SIGNER, rotate.clone()).unwrap_err();
        assert_eq!(
            err.reason_string().as_deref(),
            Some("VerifyingPaymaster: caller is not the owner")
        );
        assert_eq!(VerifyingPaymaster::verifying_signer(&state, PAYMASTER), SIGNER);

        call_from(&mut state, OWNER, rotate).unwrap();
        assert_eq!(VerifyingPaymaster::verifying_signer(&state, PAYMASTER), OWNER);

        let output = call_from(
            &mut state,
            SIGNER,
            IVerifyingPaymaster::verifyingSignerCall {}.abi_encode().into(),
        )
        .unwrap();
        let signer = IVerifyingPaymaster::verifyingSignerCall::abi_decode_returns(&output).unwrap();
        assert_eq!(signer, OWNER);
    }

    #[test]
    fn test_paymaster_data_roundtrip() {
        let signature = [7u8; 65];
        let data = VerifyingPaymasterData::encode(200, 100, &signature);
        assert_eq!(data.len(), 129);
        let decoded = VerifyingPaymasterData::decode(&data).unwrap();
        assert_eq!(decoded.valid_until, 200);
        assert_eq!(decoded.valid_after, 100);
        assert_eq!(decoded.signature, &signature[..]);
    }

    #[test]
    fn test_paymaster_data_rejects_bad_lengths() {
        for length in [0, 63, 64, 100, 127, 130] {
            let data = vec![0u8; length];
            assert!(VerifyingPaymasterData::decode(&data).is_err(), "length {length}");
        }
        assert!(VerifyingPaymasterData::decode(&[0u8; 128]).is_ok());
    }

    #[test]
    fn test_hash_ignores_paymaster_data_but_binds_window() {
        let paymaster = Address::with_last_byte(9);
        let mut op = UserOperation { nonce: U256::from(1), ..Default::default() };
        let hash = VerifyingPaymaster::get_hash(&op, 1, paymaster, 10, 0);
        op.paymasterData = VerifyingPaymasterData::encode(10, 0, &[1u8; 65]);
        assert_eq!(VerifyingPaymaster::get_hash(&op, 1, paymaster, 10, 0), hash);
        assert_ne!(VerifyingPaymaster::get_hash(&op, 1, paymaster, 11, 0), hash);
        assert_ne!(VerifyingPaymaster::get_hash(&op, 2, paymaster, 10, 0), hash);
    }
}
