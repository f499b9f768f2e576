//! The deposit ledger.
//!
//! Every address has a spendable deposit and an optional stake locked for an unstake delay.
//! Deposits pay for user operations; stakes make paymasters accountable.
//!
//! The ledger is kept in the storage of the entry point, so the world state journal rolls it back
//! together with the native value moves that back it. Records are laid out like a Solidity
//! `mapping(address => DepositInfo)` at [`DEPOSITS_SLOT`], one field per slot, and the sum of every
//! deposit and stake is kept at [`TOTAL_VALUE_SLOT`]. Native value moves in
//! [`WorldState`], which keeps the entry point's balance equal to that sum.
//!
//! The increment/decrement primitives are crate-private so that only the pipeline can move one
//! party's funds during settlement.

use alloy_primitives::{keccak256, Address, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::{StakeError, WorldState};

/// Storage slot of the entry point holding the sum of every deposit and stake.
pub const TOTAL_VALUE_SLOT: U256 = U256::ZERO;

/// Storage slot of the entry point the deposit records are keyed under.
pub const DEPOSITS_SLOT: U256 = U256::from_limbs([1, 0, 0, 0]);

const DEPOSIT_OFFSET: u64 = 0;
const STAKED_OFFSET: u64 = 1;
const STAKE_OFFSET: u64 = 2;
const UNSTAKE_DELAY_OFFSET: u64 = 3;
const WITHDRAW_TIME_OFFSET: u64 = 4;

/// The ledger record of one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    /// Spendable balance.
    pub deposit: U256,
    /// Whether the stake is locked. Cleared once unlocking starts.
    pub staked: bool,
    /// Locked collateral.
    pub stake: U256,
    /// Delay between unlocking and being able to withdraw the stake, in seconds.
    pub unstake_delay_sec: u64,
    /// When the stake becomes withdrawable. Zero while locked.
    pub withdraw_time: u64,
}

impl DepositInfo {
    /// Deposit plus stake.
    fn value(&self) -> U256 {
        self.deposit.saturating_add(self.stake)
    }
}

/// Stake information reported by simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    /// Locked stake.
    pub stake: U256,
    /// Unstake delay, in seconds.
    pub unstake_delay_sec: u64,
}

impl From<DepositInfo> for StakeInfo {
    fn from(info: DepositInfo) -> Self {
        Self { stake: info.stake, unstake_delay_sec: info.unstake_delay_sec }
    }
}

/// The first storage slot of the record of `account`.
fn record_slot(account: Address) -> U256 {
    U256::from_be_bytes(keccak256((account, DEPOSITS_SLOT).abi_encode()).0)
}

fn read_record(state: &WorldState, entry_point: Address, account: Address) -> DepositInfo {
    let base = record_slot(account);
    let field = |offset: u64| state.storage(entry_point, base.wrapping_add(U256::from(offset)));
    DepositInfo {
        deposit: field(DEPOSIT_OFFSET),
        staked: !field(STAKED_OFFSET).is_zero(),
        stake: field(STAKE_OFFSET),
        unstake_delay_sec: field(UNSTAKE_DELAY_OFFSET).saturating_to(),
        withdraw_time: field(WITHDRAW_TIME_OFFSET).saturating_to(),
    }
}

/// Read access to the deposit ledger of one entry point.
#[derive(Debug, Clone, Copy)]
pub struct StakeManager<'a> {
    state: &'a WorldState,
    entry_point: Address,
}

impl<'a> StakeManager<'a> {
    pub(crate) const fn new(state: &'a WorldState, entry_point: Address) -> Self {
        Self { state, entry_point }
    }

    /// Returns the record of `account`. Unknown accounts have an all-zero record.
    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        read_record(self.state, self.entry_point, account)
    }

    /// Returns the spendable deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.deposit_info(account).deposit
    }

    /// Whether `account` has a locked stake of at least `min_stake` with an unstake delay of at
    /// least `min_unstake_delay`.
    pub fn is_staked(&self, account: Address, min_stake: U256, min_unstake_delay: u64) -> bool {
        let info = self.deposit_info(account);
        info.staked &&
            !info.stake.is_zero() &&
            info.stake >= min_stake &&
            info.unstake_delay_sec >= min_unstake_delay
    }

    /// Sum of every deposit and stake held by the ledger.
    pub fn total_value(&self) -> U256 {
        self.state.storage(self.entry_point, TOTAL_VALUE_SLOT)
    }
}

/// Write access to the deposit ledger of one entry point.
#[derive(Debug)]
pub(crate) struct StakeManagerMut<'a> {
    state: &'a mut WorldState,
    entry_point: Address,
}

impl<'a> StakeManagerMut<'a> {
    pub(crate) const fn new(state: &'a mut WorldState, entry_point: Address) -> Self {
        Self { state, entry_point }
    }

    fn deposit_info(&self, account: Address) -> DepositInfo {
        read_record(self.state, self.entry_point, account)
    }

    /// Credits `amount` to the deposit of `account`. Returns the new deposit.
    pub(crate) fn internal_increment_deposit(&mut self, account: Address, amount: U256) -> U256 {
        let mut info = self.deposit_info(account);
        info.deposit = info.deposit.saturating_add(amount);
        self.write(account, info);
        info.deposit
    }

    /// Debits `amount` from the deposit of `account`. Returns the new deposit.
    pub(crate) fn internal_decrement_deposit(
        &mut self,
        account: Address,
        amount: U256,
    ) -> Result<U256, StakeError> {
        let mut info = self.deposit_info(account);
        info.deposit = info
            .deposit
            .checked_sub(amount)
            .ok_or(StakeError::InsufficientBalance { requested: amount, available: info.deposit })?;
        self.write(account, info);
        Ok(info.deposit)
    }

    /// Moves `amount` from the deposit of `account` into its stake and locks it.
    pub(crate) fn add_stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u64,
        min_unstake_delay: u64,
    ) -> Result<DepositInfo, StakeError> {
        let mut info = self.deposit_info(account);
        if unstake_delay_sec < min_unstake_delay || unstake_delay_sec == 0 {
            return Err(StakeError::UnstakeDelayTooLow {
                delay: unstake_delay_sec,
                minimum: min_unstake_delay,
            });
        }
        if unstake_delay_sec < info.unstake_delay_sec {
            return Err(StakeError::CannotDecreaseUnstakeDelay {
                current: info.unstake_delay_sec,
                requested: unstake_delay_sec,
            });
        }
        info.deposit = info
            .deposit
            .checked_sub(amount)
            .ok_or(StakeError::InsufficientBalance { requested: amount, available: info.deposit })?;
        let stake = info.stake.saturating_add(amount);
        if stake.is_zero() {
            return Err(StakeError::ZeroStake);
        }
        info.stake = stake;
        info.staked = true;
        info.unstake_delay_sec = unstake_delay_sec;
        info.withdraw_time = 0;
        self.write(account, info);
        Ok(info)
    }

    /// Starts the unstake timer of `account`. Returns the withdraw time.
    pub(crate) fn unlock_stake(&mut self, account: Address, now: u64) -> Result<u64, StakeError> {
        let mut info = self.deposit_info(account);
        if info.unstake_delay_sec == 0 || info.stake.is_zero() {
            return Err(StakeError::NotStaked);
        }
        if !info.staked {
            return Err(StakeError::AlreadyUnstaking);
        }
        info.withdraw_time = now.saturating_add(info.unstake_delay_sec);
        info.staked = false;
        self.write(account, info);
        Ok(info.withdraw_time)
    }

    /// Releases the whole unlocked stake of `account`. Returns the released amount.
    pub(crate) fn withdraw_stake(
        &mut self,
        account: Address,
        now: u64,
    ) -> Result<U256, StakeError> {
        let mut info = self.deposit_info(account);
        if info.stake.is_zero() {
            return Err(StakeError::NoStake);
        }
        if info.withdraw_time == 0 {
            return Err(StakeError::StakeNotUnlocked);
        }
        if now < info.withdraw_time {
            return Err(StakeError::StakeLocked { withdraw_time: info.withdraw_time });
        }
        let amount = info.stake;
        info.stake = U256::ZERO;
        info.unstake_delay_sec = 0;
        info.withdraw_time = 0;
        self.write(account, info);
        Ok(amount)
    }

    fn write(&mut self, account: Address, info: DepositInfo) {
        let previous = self.deposit_info(account);
        let total = self.state.storage(self.entry_point, TOTAL_VALUE_SLOT);
        let total = total.saturating_sub(previous.value()).saturating_add(info.value());
        self.state.set_storage(self.entry_point, TOTAL_VALUE_SLOT, total);

        let base = record_slot(account);
        for (offset, value) in [
            (DEPOSIT_OFFSET, info.deposit),
            (STAKED_OFFSET, U256::from(u8::from(info.staked))),
            (STAKE_OFFSET, info.stake),
            (UNSTAKE_DELAY_OFFSET, U256::from(info.unstake_delay_sec)),
            (WITHDRAW_TIME_OFFSET, U256::from(info.withdraw_time)),
        ] {
            self.state.set_storage(self.entry_point, base.wrapping_add(U256::from(offset)), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ENTRY_POINT: Address = address!("0x6342000000000000000000000000000000004337");
    const PAYMASTER: Address = address!("0x2222222222222222222222222222222222222222");

    fn funded(amount: u64) -> WorldState {
        let mut state = WorldState::default();
        state.ledger_mut(ENTRY_POINT).internal_increment_deposit(PAYMASTER, U256::from(amount));
        state
    }

    #[test]
    fn test_decrement_never_underflows() {
        let mut state = funded(100);
        let mut ledger = state.ledger_mut(ENTRY_POINT);
        assert_eq!(
            ledger.internal_decrement_deposit(PAYMASTER, U256::from(101)),
            Err(StakeError::InsufficientBalance {
                requested: U256::from(101),
                available: U256::from(100)
            })
        );
        assert_eq!(ledger.deposit_info(PAYMASTER).deposit, U256::from(100));
        assert_eq!(ledger.internal_decrement_deposit(PAYMASTER, U256::from(100)), Ok(U256::ZERO));
        assert_eq!(state.ledger(ENTRY_POINT).total_value(), U256::ZERO);
    }

    #[test]
    fn test_stake_lifecycle() {
        let mut state = funded(1_000);
        let mut ledger = state.ledger_mut(ENTRY_POINT);
        ledger.add_stake(PAYMASTER, U256::from(600), 100, 10).unwrap();
        assert_eq!(ledger.withdraw_stake(PAYMASTER, 0), Err(StakeError::StakeNotUnlocked));
        assert_eq!(ledger.unlock_stake(PAYMASTER, 50), Ok(150));
        assert_eq!(ledger.unlock_stake(PAYMASTER, 60), Err(StakeError::AlreadyUnstaking));
        assert_eq!(
            ledger.withdraw_stake(PAYMASTER, 149),
            Err(StakeError::StakeLocked { withdraw_time: 150 })
        );
        assert!(!state.ledger(ENTRY_POINT).is_staked(PAYMASTER, U256::ZERO, 0));
        assert_eq!(state.ledger(ENTRY_POINT).balance_of(PAYMASTER), U256::from(400));
        assert_eq!(state.ledger(ENTRY_POINT).total_value(), U256::from(1_000));

        let mut ledger = state.ledger_mut(ENTRY_POINT);
        assert_eq!(ledger.withdraw_stake(PAYMASTER, 150), Ok(U256::from(600)));
        assert_eq!(ledger.withdraw_stake(PAYMASTER, 151), Err(StakeError::NoStake));
        assert_eq!(state.ledger(ENTRY_POINT).total_value(), U256::from(400));
    }

    #[test]
    fn test_is_staked_thresholds() {
        let mut state = funded(1_000);
        state.ledger_mut(ENTRY_POINT).add_stake(PAYMASTER, U256::from(600), 100, 10).unwrap();
        let ledger = state.ledger(ENTRY_POINT);
        assert!(ledger.is_staked(PAYMASTER, U256::from(600), 100));
        assert!(!ledger.is_staked(PAYMASTER, U256::from(601), 100));
        assert!(!ledger.is_staked(PAYMASTER, U256::from(600), 101));
    }

    #[test]
    fn test_unstake_delay_cannot_decrease() {
        let mut state = funded(1_000);
        let mut ledger = state.ledger_mut(ENTRY_POINT);
        ledger.add_stake(PAYMASTER, U256::from(100), 100, 10).unwrap();
        assert_eq!(
            ledger.add_stake(PAYMASTER, U256::from(100), 99, 10),
            Err(StakeError::CannotDecreaseUnstakeDelay { current: 100, requested: 99 })
        );
        assert_eq!(
            ledger.add_stake(PAYMASTER, U256::from(100), 5, 10),
            Err(StakeError::UnstakeDelayTooLow { delay: 5, minimum: 10 })
        );
        assert!(ledger.add_stake(PAYMASTER, U256::ZERO, 200, 10).is_ok());
    }

    #[test]
    fn test_adding_stake_relocks() {
        let mut state = funded(1_000);
        let mut ledger = state.ledger_mut(ENTRY_POINT);
        ledger.add_stake(PAYMASTER, U256::from(100), 100, 10).unwrap();
        ledger.unlock_stake(PAYMASTER, 0).unwrap();
        let info = ledger.add_stake(PAYMASTER, U256::from(1), 100, 10).unwrap();
        assert!(info.staked);
        assert_eq!(info.withdraw_time, 0);
        assert_eq!(info.stake, U256::from(101));
    }

    #[test]
    fn test_ledger_reverts_with_the_journal() {
        let mut state = funded(100);
        let checkpoint = state.checkpoint();
        let mut ledger = state.ledger_mut(ENTRY_POINT);
        ledger.internal_decrement_deposit(PAYMASTER, U256::from(40)).unwrap();
        ledger.internal_increment_deposit(Address::ZERO, U256::from(40));
        state.checkpoint_revert(checkpoint);

        let ledger = state.ledger(ENTRY_POINT);
        assert_eq!(ledger.balance_of(PAYMASTER), U256::from(100));
        assert_eq!(ledger.deposit_info(Address::ZERO), DepositInfo::default());
        assert_eq!(ledger.total_value(), U256::from(100));
    }

    #[test]
    fn test_records_are_stored_in_entry_point_storage() {
        let state = funded(7);
        assert_eq!(state.storage(ENTRY_POINT, record_slot(PAYMASTER)), U256::from(7));
        assert_eq!(state.storage(ENTRY_POINT, TOTAL_VALUE_SLOT), U256::from(7));
        assert_eq!(state.ledger(Address::ZERO).balance_of(PAYMASTER), U256::ZERO);
    }
}
