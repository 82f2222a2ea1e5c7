// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Portway CLI - issue requests through the client registry and inspect
//! its persisted state.
//!
//! # Examples
//!
//! ```bash
//! # GET a URL through the registry pipeline
//! portway get https://api.example.com/users/1
//!
//! # Unwrap a {code, msg, data} envelope, with request logging
//! portway -v get https://api.example.com/users/1 --envelope --log
//!
//! # Persist cookies between runs
//! portway get https://api.example.com/login --cookie-mode persistent
//!
//! # Inspect and clear persisted cookies
//! portway cookies list
//! portway cookies clear --backend db
//!
//! # Show the resolved configuration for an endpoint
//! portway config show --base-url https://api.example.com/ --format json --pretty
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use portway_core::ErrorKind;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, cookies, get};

// ============================================================================
// CLI Definition
// ============================================================================

/// Portway CLI - HTTP client registry from the command line.
#[derive(Parser)]
#[command(name = "portway")]
#[command(about = "Per-endpoint HTTP client registry CLI")]
#[command(long_about = r"
Portway sends requests through a per-endpoint client registry: configured
headers and query parameters, cookie persistence, an offline response cache
and a uniform error taxonomy.

Endpoint configuration is read from the settings file (see `portway config
path`); endpoints without one use the global configuration or defaults.

Examples:
  portway get https://api.example.com/users/1
  portway get https://api.example.com/login --cookie-mode persistent
  portway cookies list --domain api.example.com
  portway config show --base-url https://api.example.com/
")]
#[command(version)]
#[command(author = "Portway Contributors")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Returns the settings file in effect.
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(portway_client::RegistrySettings::default_path)
    }
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Send a GET request through the registry.
    #[command(visible_alias = "g")]
    Get(get::GetArgs),

    /// Inspect or clear persisted cookies.
    #[command(visible_alias = "c")]
    Cookies(cookies::CookiesArgs),

    /// Inspect configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Configuration error.
    Config = 2,
    /// Parse error.
    ParseError = 3,
    /// Connect, timeout or TLS failure.
    Network = 4,
    /// The server answered with a failure.
    Server = 5,
}

impl ExitCode {
    /// Maps a failure class onto an exit code.
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::HttpStatus | ErrorKind::Business => Self::Server,
            ErrorKind::Parse => Self::ParseError,
            ErrorKind::Connect | ErrorKind::Tls => Self::Network,
            ErrorKind::Unknown => Self::Error,
        }
    }
}

/// A failure that maps onto a specific exit code.
#[derive(Debug)]
pub struct CommandFailure {
    /// Exit code to use.
    pub code: ExitCode,
    /// Message printed to stderr.
    pub message: String,
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandFailure {}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, http_log: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let mut filter = if verbose {
        EnvFilter::new("portway=debug,info")
    } else {
        EnvFilter::new("portway=warn")
    };
    if http_log && !verbose {
        if let Ok(directive) = "portway::http=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(verbose)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let http_log = matches!(&cli.command, Commands::Get(args) if args.log);
    setup_logging(cli.verbose, cli.quiet, http_log);

    let result = match &cli.command {
        Commands::Get(args) => get::run(args, &cli).await,
        Commands::Cookies(args) => cookies::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli).await,
    };

    if let Err(e) = result {
        let code = e
            .downcast_ref::<CommandFailure>()
            .map_or(ExitCode::Error, |f| f.code);
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(code as i32);
    }

    Ok(())
}
