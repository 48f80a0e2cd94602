//! Subcommand implementations.

pub mod update;
pub mod watch;
