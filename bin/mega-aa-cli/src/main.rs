//! Command line helpers for the mega-aa entry point.
//!
//! The tool computes the identifiers a bundler, wallet or paymaster service needs without running
//! a batch: request ids, verifying paymaster hashes and counterfactual sender addresses.

use clap::Parser;

mod cmd;
mod error;
mod input;
mod logging;

pub use cmd::*;
pub use error::*;
pub use input::*;
pub use logging::*;

fn main() -> std::result::Result<(), CliError> {
    set_thread_panic_hook();
    MainCmd::parse().run().inspect_err(|e| eprintln!("{e}"))
}

/// Sets thread panic hook, useful for having tests that panic.
fn set_thread_panic_hook() {
    use std::{
        backtrace::Backtrace,
        panic::{set_hook, take_hook},
        process::exit,
    };
    let orig_hook = take_hook();
    set_hook(Box::new(move |panic_info| {
        eprintln!("Custom backtrace: {}", Backtrace::capture());
        orig_hook(panic_info);
        exit(1);
    }));
}
