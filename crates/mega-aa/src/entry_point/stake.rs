//! Deposit ledger administration. Every call acts on the caller's own record.

use alloy_primitives::{Address, U256};
use mega_aa_contracts::IStakeManager;
use tracing::info;

use super::EntryPoint;
use crate::{DepositInfo, StakeError};

impl EntryPoint {
    /// The spendable deposit of `account`.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.state.ledger(self.config.address).balance_of(account)
    }

    /// The ledger record of `account`.
    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        self.state.ledger(self.config.address).deposit_info(account)
    }

    /// Pays `value` of the caller's native balance into the ledger, credited to `account`.
    /// Returns the new deposit of `account`.
    pub fn deposit_to(
        &mut self,
        caller: Address,
        account: Address,
        value: U256,
    ) -> Result<U256, StakeError> {
        let entry_point = self.config.address;
        let total = self.atomically(|ep| ep.state.deposit_to(entry_point, caller, account, value))?;
        info!(%caller, %account, %value, %total, "Deposited");
        Ok(total)
    }

    /// Withdraws `amount` of the caller's deposit to `to`.
    pub fn withdraw_to(
        &mut self,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        let entry_point = self.config.address;
        self.atomically(|ep| ep.state.withdraw_to(entry_point, caller, to, amount))?;
        info!(%caller, %to, %amount, "Withdrawn");
        Ok(())
    }

    /// Moves `amount` of the caller's deposit into its stake and locks it with
    /// `unstake_delay_sec`.
    pub fn add_stake(
        &mut self,
        caller: Address,
        amount: U256,
        unstake_delay_sec: u64,
    ) -> Result<DepositInfo, StakeError> {
        let min_unstake_delay = self.config.min_unstake_delay;
        let entry_point = self.config.address;
        let info = self.atomically(|ep| {
            let info = ep.state.ledger_mut(entry_point).add_stake(
                caller,
                amount,
                unstake_delay_sec,
                min_unstake_delay,
            )?;
            ep.state.emit_event(
                entry_point,
                &IStakeManager::StakeLocked {
                    account: caller,
                    totalStaked: info.stake,
                    unstakeDelaySec: U256::from(info.unstake_delay_sec),
                },
            );
            Ok(info)
        })?;
        info!(%caller, stake = %info.stake, unstake_delay_sec, "Stake locked");
        Ok(info)
    }

    /// Starts the unstake timer of the caller. Returns when the stake becomes withdrawable.
    pub fn unlock_stake(&mut self, caller: Address) -> Result<u64, StakeError> {
        let now = self.state.block().timestamp;
        let entry_point = self.config.address;
        let withdraw_time = self.atomically(|ep| {
            let withdraw_time = ep.state.ledger_mut(entry_point).unlock_stake(caller, now)?;
            ep.state.emit_event(
                entry_point,
                &IStakeManager::StakeUnlocked {
                    account: caller,
                    withdrawTime: U256::from(withdraw_time),
                },
            );
            Ok(withdraw_time)
        })?;
        info!(%caller, withdraw_time, "Stake unlocked");
        Ok(withdraw_time)
    }

    /// Pays the caller's unlocked stake out to `to`. Returns the amount paid.
    pub fn withdraw_stake(&mut self, caller: Address, to: Address) -> Result<U256, StakeError> {
        let now = self.state.block().timestamp;
        let entry_point = self.config.address;
        let amount = self.atomically(|ep| {
            let amount = ep.state.ledger_mut(entry_point).withdraw_stake(caller, now)?;
            ep.state.transfer(entry_point, to, amount)?;
            ep.state.emit_event(
                entry_point,
                &IStakeManager::StakeWithdrawn { account: caller, withdrawAddress: to, amount },
            );
            Ok(amount)
        })?;
        info!(%caller, %to, %amount, "Stake withdrawn");
        Ok(amount)
    }

    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, StakeError>,
    ) -> Result<T, StakeError> {
        let checkpoint = self.state.checkpoint();
        let result = f(self);
        match &result {
            Ok(_) => self.state.checkpoint_commit(),
            Err(_) => self.state.checkpoint_revert(checkpoint),
        }
        result
    }
}
