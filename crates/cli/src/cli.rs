//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Depth Capture - color + depth frame capture from a Kinect-class camera
#[derive(Parser, Debug)]
#[command(
    name = "depth-capture",
    author,
    version,
    about = "Depth camera color + depth capture",
    long_about = "Captures paired 640x480 color and depth frames from a Kinect-class camera.\n\n\
                  Opens the device from configuration, drives its event loop on a \n\
                  background thread and pulls coherent frame snapshots."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DEPTH_CAPTURE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DEPTH_CAPTURE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter used when `RUST_LOG` is unset
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the device and pull frames
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "capture.toml",
        env = "DEPTH_CAPTURE_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the device backend from configuration
    #[arg(long, value_enum, env = "DEPTH_CAPTURE_BACKEND")]
    pub backend: Option<BackendArg>,

    /// Number of frame pairs to pull (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "DEPTH_CAPTURE_FRAMES")]
    pub frames: u64,

    /// Override the pull timeout in milliseconds (0 = wait forever)
    #[arg(long, env = "DEPTH_CAPTURE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Validate configuration and exit without opening the device
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DEPTH_CAPTURE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Device backend selectable from the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    /// Synthetic frames, no hardware
    Mock,
    /// Kinect through libfreenect
    Freenect,
}

impl From<BackendArg> for contracts::BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Mock => Self::Mock,
            BackendArg::Freenect => Self::Freenect,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
