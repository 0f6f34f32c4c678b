#![forbid(unsafe_code)]

//! `dbweave`: check and run page manifests.

pub mod check;
pub mod cli;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod run;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{CliError, Result};
