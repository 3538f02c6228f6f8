//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// coopsync - cooperative coordination primitives
#[derive(Parser)]
#[command(
    name = "coopsync",
    about = "Exercise broadcast channels, named wait gates and timers",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Schedule a one-shot timer and report how it woke
    After {
        /// Delay before the callback fires
        #[arg(short, long, default_value = "1000")]
        delay_ms: u64,

        /// Resume the identifier early, after this many milliseconds
        #[arg(short, long)]
        resume_after_ms: Option<u64>,

        /// Identifier to wait on (defaults to the configured one)
        #[arg(short, long)]
        identifier: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a repeating timer for a number of rounds (Ctrl-C resumes the identifier)
    Tick {
        /// Interval between rounds
        #[arg(short = 'n', long, default_value = "500")]
        interval_ms: u64,

        /// Invocations before the callback returns STOP
        #[arg(short, long, default_value = "3")]
        rounds: u64,

        /// Identifier to wait on (defaults to the configured one)
        #[arg(short, long)]
        identifier: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coopsync")
        .join("logs")
        .join("coopsync.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
