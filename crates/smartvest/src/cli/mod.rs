//! Command-line interface for smartvest.
//!
//! This module provides the CLI structure for the `svest` binary. Handlers
//! live in the binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExportCommand, ExportFormat, ImportCommand, ListCommand, LoginCommand,
    OpenCommand, OutputFormat, QrCommand, QrModeArg, RegisterCommand, ShowCommand,
    TelemetryCommand,
};

use crate::logging::Verbosity;

/// svest - Register vest wearers and manage their emergency profiles
///
/// Stores registration records locally, produces scannable emergency codes
/// and portable links, and follows live vest telemetry.
#[derive(Debug, Parser)]
#[command(name = "svest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new wearer
    Register(Box<RegisterCommand>),

    /// List registered wearers
    List(ListCommand),

    /// Show one record
    Show(ShowCommand),

    /// Open a scanned profile link
    Open(OpenCommand),

    /// Print the payload for a wearer's code
    Qr(QrCommand),

    /// Check a username and password
    Login(LoginCommand),

    /// Export all records
    Export(ExportCommand),

    /// Merge a JSON backup into the store
    Import(ImportCommand),

    /// Follow vest telemetry
    #[command(subcommand)]
    Telemetry(TelemetryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
