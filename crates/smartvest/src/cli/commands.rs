//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::payload::QrMode;
use crate::record::BloodType;

/// Register command arguments.
#[derive(Debug, Args)]
pub struct RegisterCommand {
    /// Full name
    #[arg(long)]
    pub name: String,

    /// National id number
    #[arg(long)]
    pub national_id: String,

    /// Age in years
    #[arg(long)]
    pub age: String,

    /// Blood type (O+, O-, A+, A-, B+, B-, AB+, AB-)
    #[arg(short, long, default_value = "O+")]
    pub blood_type: BloodType,

    /// Home address
    #[arg(long)]
    pub address: String,

    /// Emergency phone number
    #[arg(long)]
    pub phone: String,

    /// Emergency contact name
    #[arg(long)]
    pub contact_name: String,

    /// Emergency contact relationship
    #[arg(long)]
    pub relationship: String,

    /// Allergies, conditions or medication
    #[arg(long, default_value = "")]
    pub observations: String,

    /// Profile photo (png, jpg, gif, webp or bmp)
    #[arg(long, value_name = "FILE")]
    pub photo: Option<PathBuf>,

    /// Login name
    #[arg(short, long)]
    pub username: Option<String>,

    /// Login password (only its hash is stored)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Paired vest id (random if omitted)
    #[arg(long)]
    pub device_id: Option<String>,

    /// Check the address with the configured verification service
    #[arg(long)]
    pub verify_address: bool,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Record id
    pub id: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Open command arguments.
#[derive(Debug, Args)]
pub struct OpenCommand {
    /// Scanned profile link
    pub url: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// QR command arguments.
#[derive(Debug, Args)]
pub struct QrCommand {
    /// Record id
    pub id: String,

    /// What the code carries
    #[arg(short, long, value_enum, default_value = "text")]
    pub mode: QrModeArg,
}

/// Login command arguments.
#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Login name
    pub username: String,

    /// Login password
    #[arg(short, long)]
    pub password: String,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Export format
    #[arg(value_enum)]
    pub format: ExportFormat,

    /// Target directory (defaults to the configured export directory)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// JSON backup file
    pub file: PathBuf,
}

/// Telemetry commands.
#[derive(Debug, Subcommand)]
pub enum TelemetryCommand {
    /// Run the simulated vest and print each update
    Simulate {
        /// Number of movement ticks
        #[arg(short, long, default_value = "10")]
        ticks: u32,

        /// Raise SOS at this tick
        #[arg(long, value_name = "TICK")]
        sos_at: Option<u32>,

        /// Output each update as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Publish device payloads, one JSON object per line
    Ingest {
        /// File of payloads (stdin if omitted)
        file: Option<PathBuf>,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Code payload argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QrModeArg {
    /// Offline emergency card
    Text,
    /// Portable link with the full record
    Link,
}

impl From<QrModeArg> for QrMode {
    fn from(arg: QrModeArg) -> Self {
        match arg {
            QrModeArg::Text => Self::Text,
            QrModeArg::Link => Self::Link,
        }
    }
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Spreadsheet export
    Csv,
    /// Full backup, re-importable
    Json,
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
