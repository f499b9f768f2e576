//! Signature aggregators.

mod bls;
mod proof;

pub use bls::*;
pub use proof::*;
