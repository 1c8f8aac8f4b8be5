//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: keep the session alive while stdin reports activity (default)
//! - config: print the resolved configuration
//! - beat: send a single heartbeat

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Heartwatch - keep a remote session alive while the user is active
#[derive(Parser, Debug)]
#[command(name = "heartwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the keep-alive loop, reading one activity signal name per stdin line
    Run {
        /// Use this token instead of the metadata endpoint
        #[arg(long)]
        token: Option<String>,

        /// Override the idle threshold in milliseconds
        #[arg(long)]
        idle_threshold_ms: Option<u64>,
    },

    /// Print the resolved configuration
    Config {
        /// Print as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Acquire a token and send one heartbeat through the retry policy
    Beat {
        /// Use this token instead of the metadata endpoint
        #[arg(long)]
        token: Option<String>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            token: None,
            idle_threshold_ms: None,
        }
    }
}
