//! An entry point for abstracted transactions.
//!
//! User operations are submitted in batches by a bundler. The [`EntryPoint`] validates every
//! operation through the sender's smart [`Account`] (and the sponsoring [`Paymaster`], if any),
//! reserves its prefund in the deposit ledger, executes the payload and settles the actual cost.
//! Groups of operations can share one aggregated signature verified by an [`Aggregator`].
//!
//! Everything runs against an in-process, journaled [`WorldState`]. Collaborator contracts are Rust
//! implementations of [`Contract`] that reach the world through a metered [`CallContext`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod aggregator;
pub use aggregator::*;

mod config;
pub use config::*;

mod context;
pub use context::CallContext;

mod crypto;
pub use crypto::*;

mod entry_point;
pub use entry_point::*;

mod error;
pub use error::*;

mod gas;
pub use gas::*;

mod interfaces;
pub use interfaces::*;

mod paymaster;
pub use paymaster::*;

mod revert;
pub use revert::*;

mod stake_manager;
pub use stake_manager::*;

mod state;
pub use state::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;

mod validation;
pub use validation::*;
