use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::SigningKey;

/// A secp256k1 key derived deterministically from a seed.
#[derive(Debug, Clone)]
pub struct TestKey {
    signing_key: SigningKey,
}

impl TestKey {
    /// Derives the key `keccak256(seed)`.
    pub fn from_seed(seed: u64) -> Self {
        let secret = keccak256(seed.to_be_bytes());
        let signing_key = SigningKey::from_slice(secret.as_slice()).expect("valid secret key");
        Self { signing_key }
    }

    /// The address of the key.
    pub fn address(&self) -> Address {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
    }

    /// Signs a prehashed message. Returns `r || s || v` with `v` in `{27, 28}`.
    pub fn sign_hash(&self, hash: B256) -> Vec<u8> {
        let (signature, recovery_id) =
            self.signing_key.sign_prehash_recoverable(hash.as_slice()).expect("signing succeeds");
        let mut out = signature.to_bytes().to_vec();
        out.push(27 + recovery_id.to_byte());
        out
    }
}
