use alloy_primitives::{address, eip191_hash_message, Address, Bytes, U256};

use super::{SimpleAccount, SimpleAccountFactory, TestKey};
use crate::{BlockEnv, EntryPoint, EntryPointConfig, UserOperation, WorldState};

/// The entry point address used in tests.
pub const ENTRY_POINT: Address = address!("0x6342000000000000000000000000000000004337");
/// The bundler submitting batches.
pub const BUNDLER: Address = address!("0x00000000000000000000000000000000000b0b00");
/// The beneficiary of every test batch.
pub const BENEFICIARY: Address = address!("0x00000000000000000000000000000000000bee00");
/// Address of the [`SimpleAccountFactory`] in [`TestEnv::new`].
pub const FACTORY: Address = address!("0x000000000000000000000000000000000000fac0");

/// One gwei.
pub const GWEI: u64 = 1_000_000_000;
/// One ether.
pub const ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Timestamp of the block in [`TestEnv::new`].
pub const TEST_TIMESTAMP: u64 = 1_700_000_000;

/// An entry point over a fresh world with a deployed account factory.
#[derive(Debug, Clone, derive_more::Deref, derive_more::DerefMut)]
pub struct TestEnv {
    #[deref]
    #[deref_mut]
    entry_point: EntryPoint,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Creates an entry point at [`ENTRY_POINT`] on chain 1 with a one ether paymaster stake
    /// requirement and a one day unstake delay.
    pub fn new() -> Self {
        Self::with_config(EntryPointConfig::default().with_address(ENTRY_POINT).with_chain_id(1))
    }

    /// Creates an entry point with `config`.
    pub fn with_config(config: EntryPointConfig) -> Self {
        let mut state = WorldState::new(BlockEnv {
            number: 1,
            timestamp: TEST_TIMESTAMP,
            basefee: 0,
        });
        state.deploy(FACTORY, std::sync::Arc::new(SimpleAccountFactory));
        Self { entry_point: EntryPoint::new(config, state) }
    }

    /// Consumes the environment, returning the entry point.
    pub fn into_inner(self) -> EntryPoint {
        self.entry_point
    }

    /// Adds `amount` to the native balance of `address`.
    pub fn fund(&mut self, address: Address, amount: U256) {
        self.state_mut().mint(address, amount);
    }

    /// Deploys a [`SimpleAccount`] owned by `owner` at `address` and deposits `deposit` for it.
    pub fn deploy_account(&mut self, address: Address, owner: &TestKey, deposit: U256) {
        SimpleAccount::deploy(self.state_mut(), address, owner.address());
        if !deposit.is_zero() {
            self.fund(address, deposit);
            self.deposit_to(address, address, deposit).expect("deposit succeeds");
        }
    }

    /// Deposits and stakes `stake` for `paymaster`, on top of a `deposit` for gas.
    pub fn stake_paymaster(&mut self, paymaster: Address, deposit: U256, stake: U256) {
        self.fund(paymaster, deposit + stake);
        self.deposit_to(paymaster, paymaster, deposit + stake).expect("deposit succeeds");
        let delay = self.config().min_unstake_delay;
        self.add_stake(paymaster, stake, delay).expect("stake succeeds");
    }

    /// Signs `op` with `key` the way [`SimpleAccount`] expects.
    pub fn sign(&self, op: &mut UserOperation, key: &TestKey) {
        let request_id = self.get_request_id(op);
        op.signature = key.sign_hash(eip191_hash_message(request_id)).into();
    }
}

/// Builds a self-funded operation for `sender` paying one gwei per gas, with 100k call gas, 150k
/// verification gas and 50k pre-verification gas.
pub fn user_op(sender: Address, nonce: u64, call_data: Bytes) -> UserOperation {
    UserOperation {
        sender,
        nonce: U256::from(nonce),
        callData: call_data,
        callGas: U256::from(100_000),
        verificationGas: U256::from(150_000),
        preVerificationGas: U256::from(50_000),
        maxFeePerGas: U256::from(GWEI),
        maxPriorityFeePerGas: U256::from(GWEI),
        ..Default::default()
    }
}
