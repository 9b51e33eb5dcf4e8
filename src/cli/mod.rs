//! CLI layer for nostr-bridge.
//!
//! Provides the command-line interface using clap, with commands for
//! running the bridge and exercising the query pipeline by hand.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, LogFormat};
