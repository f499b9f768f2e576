//! Signature recovery.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

/// Recovers the address that signed `hash`.
///
/// Accepts a 65-byte `r || s || v` signature, with `v` either `0/1` or `27/28`, or a 64-byte
/// EIP-2098 compact signature `r || vs`, where the top bit of `vs` carries the y parity. Returns
/// `None` for any other length or an invalid signature.
pub fn recover_signer(hash: B256, signature: &[u8]) -> Option<Address> {
    let (sig_bytes, parity) = match signature.len() {
        65 => {
            let v = signature[64];
            let parity = match v {
                0 | 1 => v,
                27 | 28 => v - 27,
                _ => return None,
            };
            let mut sig_bytes = [0u8; 64];
            sig_bytes.copy_from_slice(&signature[..64]);
            (sig_bytes, parity)
        }
        64 => {
            let mut sig_bytes = [0u8; 64];
            sig_bytes.copy_from_slice(signature);
            let parity = sig_bytes[32] >> 7;
            sig_bytes[32] &= 0x7f;
            (sig_bytes, parity)
        }
        _ => return None,
    };

    let recovery_id = RecoveryId::try_from(parity).ok()?;
    let signature = Signature::from_slice(&sig_bytes).ok()?;
    let recovered_key =
        VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id).ok()?;

    // The uncompressed point is 0x04 || x || y; the address is the last 20 bytes of keccak(x || y).
    let pubkey_point = recovered_key.to_encoded_point(false);
    let pubkey_hash = keccak256(&pubkey_point.as_bytes()[1..]);
    Some(Address::from_slice(&pubkey_hash[12..]))
}
