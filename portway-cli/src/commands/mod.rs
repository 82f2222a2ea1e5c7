//! CLI command implementations.

pub mod config;
pub mod cookies;
pub mod get;

use anyhow::Result;
use portway_client::{ClientRegistry, ConfigError, RegistrySettings};
use portway_core::ClassifiedError;
use tracing::debug;

use crate::output::JsonFormatter;
use crate::{Cli, CommandFailure, ExitCode, OutputFormat};

/// Builds a registry with the settings file applied.
pub(crate) async fn load_registry(cli: &Cli) -> Result<ClientRegistry> {
    let path = cli.settings_path();
    let settings = RegistrySettings::load_or_default(&path).await;
    debug!(path = %path.display(), empty = settings.is_empty(), "Loaded settings");

    let registry = ClientRegistry::new();
    settings.apply(&registry).map_err(config_failure)?;
    Ok(registry)
}

/// Wraps a configuration error with the configuration exit code.
pub(crate) fn config_failure(error: ConfigError) -> anyhow::Error {
    CommandFailure {
        code: ExitCode::Config,
        message: error.to_string(),
    }
    .into()
}

/// Reports a classified failure and returns the matching command failure.
///
/// In JSON mode the failure is also written to stdout so scripts always
/// receive a document.
pub(crate) fn request_failure(cli: &Cli, error: &ClassifiedError) -> anyhow::Error {
    if cli.format == OutputFormat::Json {
        match JsonFormatter::new(cli.pretty).format_error(error) {
            Ok(json) => println!("{json}"),
            Err(e) => debug!(error = %e, "Failed to format error"),
        }
    }
    CommandFailure {
        code: ExitCode::for_kind(error.kind()),
        message: format!("[{} {}] {}", error.kind(), error.code(), error.message()),
    }
    .into()
}
