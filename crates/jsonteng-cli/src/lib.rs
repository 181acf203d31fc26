//! jsonteng CLI library
//!
//! This module exposes the CLI main function so other binaries can bundle
//! the command.

mod cli;

pub use cli::run;
