//! The journaled world state the entry point runs against.

use std::sync::Arc;

use alloy_primitives::{map::HashMap, Address, Bytes, Log, U256};
use alloy_sol_types::SolEvent;
use mega_aa_contracts::IStakeManager;
use revm::{
    context::JournalTr,
    context_interface::journaled_state::JournalCheckpoint,
    database::{CacheDB, EmptyDB},
    primitives::KECCAK_EMPTY,
    state::Bytecode,
    Journal,
};

use crate::{BlockEnv, Contract, StakeError, StakeManager, StakeManagerMut};

/// Code stored at the address of every native contract. The behaviour lives in the contract
/// registry; the journal only records that the address has code.
const NATIVE_CODE_MARKER: Bytes = Bytes::from_static(&[0xfe]);

/// In-process world state: a [`revm::Journal`] holding per-address native balance, code and
/// storage and the emitted logs, the registry of native contracts, and the block environment.
///
/// The deposit ledger lives in the storage of the entry point, see [`StakeManager`].
///
/// Every mutation goes through the journal. [`Self::checkpoint`] opens a revertible scope that is
/// closed with either [`Self::checkpoint_commit`] or [`Self::checkpoint_revert`]. Changes made
/// with no scope open are final.
#[derive(Debug, Clone)]
pub struct WorldState {
    journal: Journal<CacheDB<EmptyDB>>,
    contracts: HashMap<Address, Arc<dyn Contract>>,
    block: BlockEnv,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(BlockEnv::default())
    }
}

impl WorldState {
    /// Creates an empty world at the given block.
    pub fn new(block: BlockEnv) -> Self {
        Self {
            journal: Journal::new(CacheDB::<EmptyDB>::default()),
            contracts: HashMap::default(),
            block,
        }
    }

    /// The current block environment.
    pub const fn block(&self) -> &BlockEnv {
        &self.block
    }

    /// Sets the block timestamp.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.block.timestamp = timestamp;
    }

    /// Native balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.journal
            .inner
            .state
            .get(&address)
            .map(|account| account.info.balance)
            .unwrap_or_default()
    }

    /// Credits `amount` of new native balance to `address`.
    pub fn mint(&mut self, address: Address, amount: U256) {
        let Ok(()) = self.journal.balance_incr(address, amount);
        self.settle();
    }

    /// The contract deployed at `address`, if any.
    pub fn code(&self, address: Address) -> Option<Arc<dyn Contract>> {
        if !self.is_deployed(address) {
            return None;
        }
        self.contracts.get(&address).cloned()
    }

    /// Whether there is code at `address`.
    pub fn is_deployed(&self, address: Address) -> bool {
        self.journal
            .inner
            .state
            .get(&address)
            .is_some_and(|account| account.info.code_hash != KECCAK_EMPTY)
    }

    /// Deploys `contract` at `address`. Returns `false` if there is code already.
    pub fn deploy(&mut self, address: Address, contract: Arc<dyn Contract>) -> bool {
        let Ok(account) = self.journal.load_account(address);
        if account.data.info.code_hash != KECCAK_EMPTY {
            return false;
        }
        self.journal.set_code(address, Bytecode::new_raw(NATIVE_CODE_MARKER));
        self.contracts.insert(address, contract);
        self.settle();
        true
    }

    /// Reads the storage slot `key` of `address`. Unset slots are zero.
    pub fn storage(&self, address: Address, key: U256) -> U256 {
        self.journal
            .inner
            .state
            .get(&address)
            .and_then(|account| account.storage.get(&key))
            .map(|slot| slot.present_value)
            .unwrap_or_default()
    }

    /// Writes the storage slot `key` of `address`. Returns the previous value.
    pub fn set_storage(&mut self, address: Address, key: U256, value: U256) -> U256 {
        let previous = self.storage(address, key);
        let Ok(_) = self.journal.load_account(address);
        let Ok(_) = self.journal.sstore(address, key, value);
        self.settle();
        previous
    }

    /// Moves `value` of native balance from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), StakeError> {
        let available = self.balance(from);
        if available < value {
            return Err(StakeError::InsufficientBalance { requested: value, available });
        }
        let Ok(failure) = self.journal.transfer(from, to, value);
        self.settle();
        match failure {
            Some(_) => Err(StakeError::InsufficientBalance { requested: value, available }),
            None => Ok(()),
        }
    }

    /// The deposit ledger kept by the entry point at `entry_point`.
    pub const fn ledger(&self, entry_point: Address) -> StakeManager<'_> {
        StakeManager::new(self, entry_point)
    }

    pub(crate) fn ledger_mut(&mut self, entry_point: Address) -> StakeManagerMut<'_> {
        StakeManagerMut::new(self, entry_point)
    }

    /// Every log emitted and not yet taken, in order.
    pub fn logs(&self) -> &[Log] {
        &self.journal.inner.logs
    }

    /// Removes and returns the logs emitted since the first `start` ones.
    pub fn take_logs_from(&mut self, start: usize) -> Vec<Log> {
        let logs = &mut self.journal.inner.logs;
        logs.split_off(start.min(logs.len()))
    }

    /// Removes and returns every log.
    pub fn take_logs(&mut self) -> Vec<Log> {
        self.take_logs_from(0)
    }

    /// Appends a log.
    pub fn emit_log(&mut self, log: Log) {
        self.journal.log(log);
    }

    pub(crate) fn emit_event(&mut self, address: Address, event: &impl SolEvent) {
        self.emit_log(Log { address, data: event.encode_log_data() });
    }

    /// Pays `value` of the native balance of `from` into the entry point and credits it to the
    /// deposit of `account`. Returns the new deposit.
    pub(crate) fn deposit_to(
        &mut self,
        entry_point: Address,
        from: Address,
        account: Address,
        value: U256,
    ) -> Result<U256, StakeError> {
        self.transfer(from, entry_point, value)?;
        let total = self.ledger_mut(entry_point).internal_increment_deposit(account, value);
        self.emit_event(entry_point, &IStakeManager::Deposited { account, totalDeposit: total });
        Ok(total)
    }

    /// Debits `amount` from the deposit of `account` and pays it from the entry point to `to`.
    pub(crate) fn withdraw_to(
        &mut self,
        entry_point: Address,
        account: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), StakeError> {
        self.ledger_mut(entry_point).internal_decrement_deposit(account, amount)?;
        self.transfer(entry_point, to, amount)?;
        self.emit_event(
            entry_point,
            &IStakeManager::Withdrawn { account, withdrawAddress: to, amount },
        );
        Ok(())
    }

    /// Opens a revertible scope.
    pub fn checkpoint(&mut self) -> JournalCheckpoint {
        self.journal.checkpoint()
    }

    /// Closes the innermost scope, keeping its changes.
    pub fn checkpoint_commit(&mut self) {
        self.journal.checkpoint_commit();
        self.settle();
    }

    /// Closes the innermost scope, undoing every change and log made since `checkpoint`.
    pub fn checkpoint_revert(&mut self, checkpoint: JournalCheckpoint) {
        self.journal.checkpoint_revert(checkpoint);
        self.settle();
    }

    /// The number of open scopes.
    pub fn depth(&self) -> usize {
        self.journal.inner.depth
    }

    /// Drops journal entries once no scope can revert them.
    fn settle(&mut self) {
        if self.journal.inner.depth == 0 {
            self.journal.inner.journal.clear();
        }
    }

    #[cfg(test)]
    fn journal_len(&self) -> usize {
        self.journal.inner.journal.len()
    }
}
