//! CLI module for heartwatch - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
