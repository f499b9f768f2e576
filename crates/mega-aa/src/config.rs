use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::constants::{
    stake::{DEFAULT_MIN_PAYMASTER_STAKE, DEFAULT_MIN_UNSTAKE_DELAY},
    DEFAULT_CHAIN_ID, DEFAULT_ENTRY_POINT_ADDRESS, SIMULATION_SENDER,
};

/// Deployment parameters of an [`EntryPoint`](crate::EntryPoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPointConfig {
    /// Address of the entry point. It holds the native value backing the deposit ledger.
    pub address: Address,
    /// Chain id bound into every request id.
    pub chain_id: u64,
    /// Minimum stake a paymaster must lock to sponsor operations.
    pub min_paymaster_stake: U256,
    /// Minimum unstake delay of any stake, in seconds.
    pub min_unstake_delay: u64,
    /// The only caller allowed to run simulations.
    pub simulation_sender: Address,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ENTRY_POINT_ADDRESS,
            chain_id: DEFAULT_CHAIN_ID,
            min_paymaster_stake: DEFAULT_MIN_PAYMASTER_STAKE,
            min_unstake_delay: DEFAULT_MIN_UNSTAKE_DELAY,
            simulation_sender: SIMULATION_SENDER,
        }
    }
}

impl EntryPointConfig {
    /// Sets the entry point address.
    pub const fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Sets the chain id.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the minimum paymaster stake.
    pub const fn with_min_paymaster_stake(mut self, min_paymaster_stake: U256) -> Self {
        self.min_paymaster_stake = min_paymaster_stake;
        self
    }

    /// Sets the minimum unstake delay.
    pub const fn with_min_unstake_delay(mut self, min_unstake_delay: u64) -> Self {
        self.min_unstake_delay = min_unstake_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EntryPointConfig = serde_json::from_str(r#"{"chainId": 1}"#).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.address, DEFAULT_ENTRY_POINT_ADDRESS);
        assert_eq!(config.min_unstake_delay, DEFAULT_MIN_UNSTAKE_DELAY);
    }
}
