//! Vigil CLI
//!
//! Commands:
//! - `vigil run` - Run the supervision loop in the foreground
//! - `vigil stop` - Stop the running supervisor
//! - `vigil status` - Show persisted state, optionally probe and self-test
//! - `vigil services` - List configured services

pub mod run;
pub mod runtime;
pub mod service;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vigil service supervisor
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about = "Daemon supervision and escalating remediation watchdog")]
pub struct Cli {
    /// Configuration directory
    #[arg(long, global = true, env = "VIGIL_CONFIG_DIR", default_value = "config")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise services in the foreground
    Run(run::RunArgs),

    /// Stop the running supervisor
    Stop {
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },

    /// Show supervisor and service status
    Status {
        /// Probe every service now
        #[arg(long)]
        probe: bool,

        /// Play the alert sound once
        #[arg(long)]
        test_sound: bool,

        /// Send a test email
        #[arg(long)]
        test_email: bool,
    },

    /// List configured services
    Services,
}

impl Commands {
    /// Long-running commands get full logging; the rest log warnings only
    pub fn is_long_running(&self) -> bool {
        matches!(self, Commands::Run(_))
    }
}
