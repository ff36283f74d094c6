//! tscribe command-line front end.
//!
//! The binary is a thin layer over `tscribe-store` and `tscribe-crypt`:
//! argument parsing, filter syntax, output rendering, logging setup, and
//! stable exit codes.

pub mod cli;
pub mod exit_codes;
pub mod filter;
pub mod logging;

pub use cli::{run, Cli, Commands, OutputFormat};
pub use exit_codes::ExitCode;
