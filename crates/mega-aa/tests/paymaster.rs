//! Tests for sponsored operations: the verifying paymaster and the `post_op` callback.

use std::sync::Arc;

use alloy_primitives::{address, bytes, eip191_hash_message, Address, Bytes, U256};
use mega_aa::{
    test_utils::{
        user_op, CounterTarget, MockPaymaster, PostOpBehavior, RevertingTarget, SimpleAccount,
        TestEnv, TestKey, BENEFICIARY, ENTRY_POINT, ETHER, GWEI, TEST_TIMESTAMP,
    },
    EntryPointConfig, EntryPointError, PostOpMode, UserOperation, UserOperationExt,
    ValidationData, VerifyingPaymaster, VerifyingPaymasterData,
};

const ACCOUNT: Address = address!("0x000000000000000000000000000000000000a001");
const PAYMASTER: Address = address!("0x000000000000000000000000000000000000b001");
const PAYMASTER_OWNER: Address = address!("0x000000000000000000000000000000000000b0ff");
const COUNTER: Address = address!("0x000000000000000000000000000000000000c001");
const REVERTER: Address = address!("0x000000000000000000000000000000000000c002");

struct Fixture {
    env: TestEnv,
    owner: TestKey,
    signer: TestKey,
}

impl Fixture {
    fn new() -> Self {
        Self::with_env(TestEnv::new())
    }

    fn with_env(mut env: TestEnv) -> Self {
        let owner = TestKey::from_seed(1);
        let signer = TestKey::from_seed(42);
        env.deploy_account(ACCOUNT, &owner, U256::ZERO);
        env.state_mut().deploy(COUNTER, Arc::new(CounterTarget));
        env.state_mut().deploy(REVERTER, Arc::new(RevertingTarget));
        Self { env, owner, signer }
    }

    fn with_verifying_paymaster() -> Self {
        let mut fixture = Self::new();
        VerifyingPaymaster::deploy(
            fixture.env.state_mut(),
            PAYMASTER,
            PAYMASTER_OWNER,
            fixture.signer.address(),
        );
        fixture.env.stake_paymaster(PAYMASTER, ETHER, ETHER);
        fixture
    }

    fn with_mock_paymaster(paymaster: MockPaymaster) -> Self {
        let mut fixture = Self::new();
        paymaster.deploy(fixture.env.state_mut(), PAYMASTER);
        fixture.env.stake_paymaster(PAYMASTER, ETHER, ETHER);
        fixture
    }

    /// An operation sponsored by the verifying paymaster, approved by `approver` for the window.
    fn sponsored_op(
        &self,
        target: Address,
        approver: &TestKey,
        valid_until: u64,
        valid_after: u64,
    ) -> UserOperation {
        let mut op = self.unsigned_op(target);
        let hash = VerifyingPaymaster::get_hash(&op, 1, PAYMASTER, valid_until, valid_after);
        let signature = approver.sign_hash(eip191_hash_message(hash));
        op.paymasterData = VerifyingPaymasterData::encode(valid_until, valid_after, &signature);
        self.env.sign(&mut op, &self.owner);
        op
    }

    fn unsigned_op(&self, target: Address) -> UserOperation {
        let mut op =
            user_op(ACCOUNT, 0, SimpleAccount::execute_call(target, U256::ZERO, Bytes::new()));
        op.paymaster = PAYMASTER;
        op
    }

    fn signed_op(&self, target: Address) -> UserOperation {
        let mut op = self.unsigned_op(target);
        self.env.sign(&mut op, &self.owner);
        op
    }
}

#[test]
fn test_verifying_paymaster_sponsors_approved_op() {
    let mut fixture = Fixture::with_verifying_paymaster();
    let op = fixture.sponsored_op(COUNTER, &fixture.signer, 0, 0);
    assert_eq!(op.required_prefund(0), U256::from(600_000u64 * GWEI));

    let env = &mut fixture.env;
    let outcome = env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert!(outcome.failed_ops.is_empty(), "{:?}", outcome.failed_ops);
    let receipt = outcome.receipt(0).unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.paymaster, Some(PAYMASTER));

    // The paymaster pays the actual cost; the sender is never charged.
    assert_eq!(env.balance_of(ACCOUNT), U256::ZERO);
    assert_eq!(env.balance_of(PAYMASTER), ETHER - receipt.actual_gas_cost);
    assert_eq!(env.deposit_info(PAYMASTER).stake, ETHER);
    assert_eq!(env.state().balance(BENEFICIARY), receipt.actual_gas_cost);
    assert_eq!(
        env.state().balance(ENTRY_POINT),
        env.state().ledger(ENTRY_POINT).total_value()
    );
    assert_eq!(CounterTarget::count(env.state(), COUNTER), U256::from(1));
}

#[test]
fn test_verifying_paymaster_rejects_wrong_signer() {
    let mut fixture = Fixture::with_verifying_paymaster();
    let impostor = TestKey::from_seed(7);
    let op = fixture.sponsored_op(COUNTER, &impostor, 0, 0);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    let failure = outcome.failure(0).unwrap();
    assert_eq!(failure.reason, "AA34 signature error");
    assert_eq!(failure.paymaster, Some(PAYMASTER));
    assert_eq!(fixture.env.balance_of(PAYMASTER), ETHER);
    assert_eq!(SimpleAccount::nonce(fixture.env.state(), ACCOUNT), U256::ZERO);
}

#[test]
fn test_verifying_paymaster_window() {
    let mut fixture = Fixture::with_verifying_paymaster();

    let expired = fixture.sponsored_op(COUNTER, &fixture.signer, TEST_TIMESTAMP - 1, 0);
    let outcome = fixture.env.handle_ops(&[expired], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA32 paymaster expired or not due");

    let not_due = fixture.sponsored_op(COUNTER, &fixture.signer, 0, TEST_TIMESTAMP + 60);
    let outcome = fixture.env.handle_ops(&[not_due.clone()], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA32 paymaster expired or not due");

    fixture.env.state_mut().set_timestamp(TEST_TIMESTAMP + 60);
    let outcome = fixture.env.handle_ops(&[not_due], BENEFICIARY).unwrap();
    assert!(outcome.receipt(0).unwrap().success);
}

#[test]
fn test_verifying_paymaster_rejects_malformed_data() {
    let mut fixture = Fixture::with_verifying_paymaster();
    let mut op = fixture.unsigned_op(COUNTER);
    op.paymasterData = bytes!("0102");
    fixture.env.sign(&mut op, &fixture.owner);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    let failure = outcome.failure(0).unwrap();
    assert_eq!(failure.reason, "VerifyingPaymaster: invalid signature length in paymasterData");
    assert_eq!(failure.paymaster, Some(PAYMASTER));
}

#[test]
fn test_unstaked_paymaster_is_rejected() {
    let mut fixture = Fixture::new();
    VerifyingPaymaster::deploy(
        fixture.env.state_mut(),
        PAYMASTER,
        PAYMASTER_OWNER,
        fixture.signer.address(),
    );
    fixture.env.fund(PAYMASTER, ETHER);
    fixture.env.deposit_to(PAYMASTER, PAYMASTER, ETHER).unwrap();
    let op = fixture.sponsored_op(COUNTER, &fixture.signer, 0, 0);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA31 paymaster not staked");
}

#[test]
fn test_paymaster_stake_below_configured_minimum() {
    let config = EntryPointConfig::default()
        .with_address(ENTRY_POINT)
        .with_chain_id(1)
        .with_min_paymaster_stake(ETHER + ETHER);
    let mut fixture = Fixture::with_env(TestEnv::with_config(config));
    MockPaymaster::default().deploy(fixture.env.state_mut(), PAYMASTER);
    fixture.env.stake_paymaster(PAYMASTER, ETHER, ETHER);
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA31 paymaster not staked");
}

#[test]
fn test_paymaster_deposit_too_low() {
    let mut fixture = Fixture::new();
    MockPaymaster::default().deploy(fixture.env.state_mut(), PAYMASTER);
    fixture.env.stake_paymaster(PAYMASTER, U256::from(GWEI), ETHER);
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA31 paymaster deposit too low");
}

#[test]
fn test_undeployed_paymaster() {
    let mut fixture = Fixture::new();
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    let failure = outcome.failure(0).unwrap();
    assert_eq!(failure.reason, "AA30 paymaster not deployed");
    assert_eq!(failure.paymaster, Some(PAYMASTER));
}

#[test]
fn test_paymaster_validation_revert() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        reject: Some("paymaster: not today"),
        ..Default::default()
    });
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "paymaster: not today");
    assert_eq!(fixture.env.balance_of(PAYMASTER), ETHER);
}

#[test]
fn test_paymaster_signature_failure_from_mock() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        validation_data: ValidationData::signature_failed(),
        ..Default::default()
    });
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(outcome.failure(0).unwrap().reason, "AA34 signature error");
}

#[test]
fn test_post_op_receives_outcome_and_cost() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        context: bytes!("c0ffee"),
        ..Default::default()
    });
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    let receipt = outcome.receipt(0).unwrap();
    assert!(receipt.success);

    let state = fixture.env.state();
    assert_eq!(MockPaymaster::last_mode(state, PAYMASTER), Some(PostOpMode::OpSucceeded));
    assert_eq!(state.storage(PAYMASTER, MockPaymaster::CALLS_SLOT), U256::from(1));
    // The cost handed to post_op excludes the gas of post_op itself.
    assert!(state.storage(PAYMASTER, MockPaymaster::COST_SLOT) < receipt.actual_gas_cost);
    assert_eq!(fixture.env.balance_of(PAYMASTER), ETHER - receipt.actual_gas_cost);
}

#[test]
fn test_post_op_sees_reverted_payload() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        context: bytes!("c0ffee"),
        ..Default::default()
    });
    let op = fixture.signed_op(REVERTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert!(!outcome.receipt(0).unwrap().success);
    assert_eq!(
        MockPaymaster::last_mode(fixture.env.state(), PAYMASTER),
        Some(PostOpMode::OpReverted)
    );
}

#[test]
fn test_empty_context_skips_post_op() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster::default());
    let op = fixture.signed_op(COUNTER);

    fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    assert_eq!(MockPaymaster::last_mode(fixture.env.state(), PAYMASTER), None);
    assert_eq!(fixture.env.state().storage(PAYMASTER, MockPaymaster::CALLS_SLOT), U256::ZERO);
}

#[test]
fn test_reverting_post_op_rolls_back_payload_and_retries() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        context: bytes!("c0ffee"),
        post_op: PostOpBehavior::RevertFirst,
        ..Default::default()
    });
    let op = fixture.signed_op(COUNTER);

    let outcome = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap();
    let receipt = outcome.receipt(0).unwrap();
    assert!(!receipt.success);

    let state = fixture.env.state();
    assert_eq!(CounterTarget::count(state, COUNTER), U256::ZERO);
    assert_eq!(MockPaymaster::last_mode(state, PAYMASTER), Some(PostOpMode::PostOpReverted));
    // Only the retry's writes survive.
    assert_eq!(state.storage(PAYMASTER, MockPaymaster::CALLS_SLOT), U256::from(1));
    assert_eq!(fixture.env.balance_of(PAYMASTER), ETHER - receipt.actual_gas_cost);
    assert_eq!(fixture.env.balance_of(ACCOUNT), U256::ZERO);
}

#[test]
fn test_post_op_reverting_twice_fails_batch() {
    let mut fixture = Fixture::with_mock_paymaster(MockPaymaster {
        context: bytes!("c0ffee"),
        post_op: PostOpBehavior::RevertAlways,
        ..Default::default()
    });
    let op = fixture.signed_op(COUNTER);

    let err = fixture.env.handle_ops(&[op], BENEFICIARY).unwrap_err();
    let EntryPointError::FailedOp(failed) = err else { panic!("unexpected error {err:?}") };
    assert_eq!(failed.index, 0);
    assert_eq!(failed.paymaster, Some(PAYMASTER));
    assert_eq!(failed.reason, "AA50 postOp reverted: paymaster: post_op failed");

    assert_eq!(fixture.env.balance_of(PAYMASTER), ETHER);
    assert_eq!(SimpleAccount::nonce(fixture.env.state(), ACCOUNT), U256::ZERO);
    assert_eq!(fixture.env.state().balance(BENEFICIARY), U256::ZERO);
}
