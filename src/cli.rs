// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::HoldPolicy;

/// Command-line arguments for `niftibatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "niftibatch",
    version,
    about = "Submit NIfTI processing jobs to a batch service, or run their tasks locally.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Niftibatch.toml` in the current working directory, if it
    /// exists; built-in defaults otherwise.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NIFTIBATCH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Upload inputs, submit the job and monitor it until it finishes.
    Submit {
        /// Input files or globs; overrides `[job].inputs`.
        #[arg(value_name = "INPUT")]
        inputs: Vec<String>,

        /// How to treat OnHold/Cancelling jobs (fail, keep_polling).
        #[arg(long, value_name = "POLICY")]
        hold_policy: Option<HoldPolicy>,

        /// Stop monitoring after this long, e.g. `30m`.
        #[arg(long, value_name = "DURATION")]
        deadline: Option<String>,

        /// Where task outputs are downloaded to; overrides `[monitor].output_dir`.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Print the task graph the configured job would be split into.
    Plan {
        /// Input files or globs; overrides `[job].inputs`.
        #[arg(value_name = "INPUT")]
        inputs: Vec<String>,
    },

    /// Execute one task on this node and print its result as JSON.
    RunTask {
        /// Task specifier JSON file, or `-` for stdin.
        #[arg(long, value_name = "FILE", default_value = "-")]
        task: PathBuf,

        #[command(flatten)]
        node: NodeArgs,
    },

    /// Run the whole task graph of the configured job on this machine.
    RunLocal {
        /// Input files or globs; overrides `[job].inputs`.
        #[arg(value_name = "INPUT")]
        inputs: Vec<String>,

        #[command(flatten)]
        node: NodeArgs,
    },
}

/// Overrides for the `[executor]` node layout.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct NodeArgs {
    /// Directory holding task inputs and outputs.
    #[arg(long, value_name = "DIR")]
    pub local_storage: Option<PathBuf>,

    /// Directory holding the stage scripts.
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
