//! Fee arithmetic.
//!
//! Frames are metered with [`revm::interpreter::Gas`], see [`CallContext`](crate::CallContext).

use alloy_primitives::U256;

/// Computes the gas price a user operation pays, given the block base fee.
///
/// Legacy-style operations (both fee fields equal) pay `max_fee_per_gas`. Otherwise the price is
/// `min(max_fee_per_gas, max_priority_fee_per_gas + basefee)`.
pub fn effective_gas_price(
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
    basefee: u64,
) -> U256 {
    if max_fee_per_gas == max_priority_fee_per_gas {
        return max_fee_per_gas;
    }
    max_fee_per_gas.min(max_priority_fee_per_gas.saturating_add(U256::from(basefee)))
}

/// Computes the gas cost of `gas` units at `gas_price`.
pub fn gas_cost(gas: u64, gas_price: U256) -> U256 {
    U256::from(gas).saturating_mul(gas_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_gas_price() {
        // Legacy-style: both fields equal.
        assert_eq!(effective_gas_price(U256::from(10), U256::from(10), 100), U256::from(10));
        // Capped by the priority fee above basefee.
        assert_eq!(effective_gas_price(U256::from(100), U256::from(2), 7), U256::from(9));
        // Capped by the max fee.
        assert_eq!(effective_gas_price(U256::from(8), U256::from(2), 7), U256::from(8));
    }
}
