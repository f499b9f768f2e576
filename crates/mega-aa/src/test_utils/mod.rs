//! Test utilities for the entry point: sample accounts, mock collaborators and a ready-made world.

mod account;
mod env;
mod key;
mod mocks;

pub use account::*;
pub use env::*;
pub use key::*;
pub use mocks::*;
