// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the gateway (default)
//! - `validate`: Validate configuration file
//! - `version`: Show version information

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

/// Configuration file looked up in the working directory when `-c` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "neasmart.yaml";

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Neasmart gateway
///
/// Bridges a Rehau Neasmart 2.0 heating controller to a REST API, with
/// persisted Modbus registers and circuit-broken bus access.
#[derive(Parser, Debug)]
#[command(
    name = "neasmart",
    author = "Sylvex <contact@sylvex.io>",
    version = neasmart_core::VERSION,
    about = "Resilient Modbus gateway for the Rehau Neasmart 2.0",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "NEASMART_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without opening the database
    /// or the bus.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Skip the startup batch sync even if the config enables it
    #[arg(long)]
    pub skip_sync: bool,

    /// Do not start the REST API
    #[arg(long)]
    pub no_api: bool,

    /// Do not start the Modbus server
    #[arg(long)]
    pub no_server: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<neasmart_config::LogFormat> for LogFormat {
    fn from(format: neasmart_config::LogFormat) -> Self {
        match format {
            neasmart_config::LogFormat::Text => LogFormat::Text,
            neasmart_config::LogFormat::Compact => LogFormat::Compact,
            neasmart_config::LogFormat::Json => LogFormat::Json,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Configuration file to load: `-c`, else `neasmart.yaml` if present,
    /// else none (defaults plus environment).
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                default.exists().then(|| default.to_path_buf())
            }
        }
    }

    /// Effective log level: quiet/verbose flags, then `-l`, then `configured`.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }

    /// Effective log format: `--log-format`, then `configured`.
    pub fn effective_log_format(&self, configured: neasmart_config::LogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| configured.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["neasmart"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["neasmart", "run", "--skip-sync", "--no-api"]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.skip_sync);
        assert!(args.no_api);
        assert!(!args.no_server);
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["neasmart", "validate", "--show-config", "-f", "json"]);
        let Some(Commands::Validate(args)) = cli.command else {
            panic!("Expected Validate command");
        };
        assert!(args.show_config);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["neasmart", "-c", "/etc/neasmart/config.toml"]);
        assert_eq!(
            cli.config_path(),
            Some(PathBuf::from("/etc/neasmart/config.toml"))
        );
    }

    #[test]
    fn test_log_level_precedence() {
        let cli = Cli::parse_from(["neasmart"]);
        assert_eq!(cli.effective_log_level("info"), "info");

        let cli = Cli::parse_from(["neasmart", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("info"), "trace");

        let cli = Cli::parse_from(["neasmart", "-q", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("info"), "warn");

        let cli = Cli::parse_from(["neasmart", "-v"]);
        assert_eq!(cli.effective_log_level("info"), "debug");
    }

    #[test]
    fn test_log_format_precedence() {
        let cli = Cli::parse_from(["neasmart"]);
        assert_eq!(
            cli.effective_log_format(neasmart_config::LogFormat::Json),
            LogFormat::Json
        );

        let cli = Cli::parse_from(["neasmart", "--log-format", "compact"]);
        assert_eq!(
            cli.effective_log_format(neasmart_config::LogFormat::Json),
            LogFormat::Compact
        );
    }
}
