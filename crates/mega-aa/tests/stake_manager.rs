//! Tests for the deposit ledger administration of the entry point.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::SolEvent;
use mega_aa::{
    test_utils::{TestEnv, ENTRY_POINT, ETHER, TEST_TIMESTAMP},
    DepositInfo, StakeError,
};
use mega_aa_contracts::IStakeManager;

const ALICE: Address = address!("0x000000000000000000000000000000000000a11c");
const BOB: Address = address!("0x0000000000000000000000000000000000000b0b");

const DAY: u64 = 86_400;

fn funded() -> TestEnv {
    let mut env = TestEnv::new();
    env.fund(ALICE, ETHER * U256::from(3));
    env
}

fn assert_backed(env: &TestEnv) {
    assert_eq!(
        env.state().balance(ENTRY_POINT),
        env.state().ledger(ENTRY_POINT).total_value()
    );
}

#[test]
fn test_deposit_credits_target_account() {
    let mut env = funded();
    assert_eq!(env.deposit_to(ALICE, BOB, ETHER), Ok(ETHER));
    assert_eq!(env.deposit_to(ALICE, BOB, ETHER), Ok(ETHER * U256::from(2)));

    assert_eq!(env.balance_of(BOB), ETHER * U256::from(2));
    assert_eq!(env.balance_of(ALICE), U256::ZERO);
    assert_eq!(env.state().balance(ALICE), ETHER);
    assert_backed(&env);

    let deposited = env
        .state()
        .logs()
        .iter()
        .filter_map(|log| IStakeManager::Deposited::decode_log(log).ok())
        .last()
        .unwrap();
    assert_eq!(deposited.address, ENTRY_POINT);
    assert_eq!(deposited.account, BOB);
    assert_eq!(deposited.totalDeposit, ETHER * U256::from(2));
}

#[test]
fn test_deposit_without_balance_fails() {
    let mut env = TestEnv::new();
    assert_eq!(
        env.deposit_to(ALICE, ALICE, U256::from(1)),
        Err(StakeError::InsufficientBalance { requested: U256::from(1), available: U256::ZERO })
    );
    assert_eq!(env.deposit_info(ALICE), DepositInfo::default());
    assert!(env.state().logs().is_empty());
}

#[test]
fn test_withdraw_pays_out_to_recipient() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER).unwrap();

    env.withdraw_to(ALICE, BOB, ETHER / U256::from(4)).unwrap();
    assert_eq!(env.balance_of(ALICE), ETHER * U256::from(3) / U256::from(4));
    assert_eq!(env.state().balance(BOB), ETHER / U256::from(4));
    assert_backed(&env);

    let withdrawn = env
        .state()
        .logs()
        .iter()
        .find_map(|log| IStakeManager::Withdrawn::decode_log(log).ok())
        .unwrap();
    assert_eq!(withdrawn.account, ALICE);
    assert_eq!(withdrawn.withdrawAddress, BOB);
    assert_eq!(withdrawn.amount, ETHER / U256::from(4));
}

#[test]
fn test_withdraw_more_than_deposit_fails() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER).unwrap();
    let logs = env.state().logs().len();

    assert_eq!(
        env.withdraw_to(ALICE, BOB, ETHER + U256::from(1)),
        Err(StakeError::InsufficientBalance { requested: ETHER + U256::from(1), available: ETHER })
    );
    assert_eq!(env.balance_of(ALICE), ETHER);
    assert_eq!(env.state().balance(BOB), U256::ZERO);
    assert_eq!(env.state().logs().len(), logs);
}

#[test]
fn test_stake_lifecycle() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER * U256::from(2)).unwrap();

    let info = env.add_stake(ALICE, ETHER, DAY).unwrap();
    assert!(info.staked);
    assert_eq!(info.stake, ETHER);
    assert_eq!(info.deposit, ETHER);
    assert_eq!(info.unstake_delay_sec, DAY);
    assert!(env.state().ledger(ENTRY_POINT).is_staked(ALICE, ETHER, DAY));

    // Staked funds cannot be withdrawn as deposit.
    assert!(env.withdraw_to(ALICE, ALICE, ETHER + U256::from(1)).is_err());
    assert_eq!(env.withdraw_stake(ALICE, BOB), Err(StakeError::StakeNotUnlocked));

    let withdraw_time = env.unlock_stake(ALICE).unwrap();
    assert_eq!(withdraw_time, TEST_TIMESTAMP + DAY);
    assert!(!env.deposit_info(ALICE).staked);
    assert_eq!(env.unlock_stake(ALICE), Err(StakeError::AlreadyUnstaking));
    assert_eq!(env.withdraw_stake(ALICE, BOB), Err(StakeError::StakeLocked { withdraw_time }));

    env.state_mut().set_timestamp(withdraw_time);
    assert_eq!(env.withdraw_stake(ALICE, BOB), Ok(ETHER));
    assert_eq!(env.state().balance(BOB), ETHER);
    assert_eq!(
        env.deposit_info(ALICE),
        DepositInfo { deposit: ETHER, ..Default::default() }
    );
    assert_backed(&env);

    let events = env.state().logs();
    let locked = events
        .iter()
        .find_map(|log| IStakeManager::StakeLocked::decode_log(log).ok())
        .unwrap();
    assert_eq!(locked.totalStaked, ETHER);
    assert_eq!(locked.unstakeDelaySec, U256::from(DAY));
    let unlocked = events
        .iter()
        .find_map(|log| IStakeManager::StakeUnlocked::decode_log(log).ok())
        .unwrap();
    assert_eq!(unlocked.withdrawTime, U256::from(withdraw_time));
    let released = events
        .iter()
        .find_map(|log| IStakeManager::StakeWithdrawn::decode_log(log).ok())
        .unwrap();
    assert_eq!(released.withdrawAddress, BOB);
    assert_eq!(released.amount, ETHER);
}

#[test]
fn test_stake_requires_minimum_delay() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER).unwrap();
    assert_eq!(
        env.add_stake(ALICE, ETHER, DAY - 1),
        Err(StakeError::UnstakeDelayTooLow { delay: DAY - 1, minimum: DAY })
    );
    assert_eq!(env.deposit_info(ALICE).stake, U256::ZERO);
}

#[test]
fn test_stake_cannot_exceed_deposit() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER).unwrap();
    assert_eq!(
        env.add_stake(ALICE, ETHER * U256::from(2), DAY),
        Err(StakeError::InsufficientBalance {
            requested: ETHER * U256::from(2),
            available: ETHER
        })
    );
    assert_eq!(env.add_stake(ALICE, U256::ZERO, DAY), Err(StakeError::ZeroStake));
}

#[test]
fn test_unlock_without_stake() {
    let mut env = funded();
    assert_eq!(env.unlock_stake(ALICE), Err(StakeError::NotStaked));
    assert_eq!(env.withdraw_stake(ALICE, ALICE), Err(StakeError::NoStake));
}

#[test]
fn test_topping_up_stake_relocks_it() {
    let mut env = funded();
    env.deposit_to(ALICE, ALICE, ETHER * U256::from(2)).unwrap();
    env.add_stake(ALICE, ETHER, DAY).unwrap();
    env.unlock_stake(ALICE).unwrap();

    let info = env.add_stake(ALICE, ETHER, 2 * DAY).unwrap();
    assert!(info.staked);
    assert_eq!(info.withdraw_time, 0);
    assert_eq!(info.stake, ETHER * U256::from(2));
    assert_eq!(
        env.add_stake(ALICE, U256::ZERO, DAY),
        Err(StakeError::CannotDecreaseUnstakeDelay { current: 2 * DAY, requested: DAY })
    );
}
