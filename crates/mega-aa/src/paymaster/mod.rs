//! Paymaster implementations.

mod verifying;
pub use verifying::*;
