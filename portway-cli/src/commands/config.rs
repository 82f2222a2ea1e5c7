//! Config command - inspect configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use portway_client::{ClientRegistry, ConfigSource, NetworkConfig, parse_base_url};
use portway_store::{default_config_dir, default_cookie_db_path, default_cookie_path};
use tracing::info;

use super::{config_failure, load_registry};
use crate::output::{ConfigOutput, JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show effective configuration.
    Show {
        /// Resolve the configuration for this endpoint only.
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show configuration paths.
    Path,

    /// Reset to defaults.
    Reset,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show { base_url } => show_config(base_url.as_deref(), cli).await,
        ConfigAction::Path => show_paths(cli),
        ConfigAction::Reset => reset_config(cli).await,
    }
}

async fn show_config(base_url: Option<&str>, cli: &Cli) -> Result<()> {
    let registry = load_registry(cli).await?;
    let outputs = match base_url {
        Some(base_url) => vec![describe_endpoint(&registry, base_url)?],
        None => describe_all(&registry),
    };

    match cli.format {
        OutputFormat::Text => {
            if outputs.is_empty() {
                println!("No configuration registered; requests use defaults");
                return Ok(());
            }
            let formatter = TextFormatter::new(!cli.no_color);
            let blocks: Vec<String> = outputs.iter().map(|o| formatter.format_config(o)).collect();
            println!("{}", blocks.join("\n\n"));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            match outputs.as_slice() {
                [single] if base_url.is_some() => println!("{}", formatter.format_config(single)?),
                all => println!("{}", formatter.format(&all)?),
            }
        }
    }

    Ok(())
}

/// Resolves one endpoint; unregistered endpoints show the defaults.
pub(crate) fn describe_endpoint(registry: &ClientRegistry, base_url: &str) -> Result<ConfigOutput> {
    let key = parse_base_url(base_url).map_err(config_failure)?;
    let resolver = registry.resolver();
    let output = match resolver.source_for(key.as_str(), None) {
        Some(source) => {
            let config = resolver.resolve(key.as_str(), None).map_err(config_failure)?;
            ConfigOutput::new(key.as_str(), source.as_str(), &config)
        }
        None => ConfigOutput::new(key.as_str(), "default", &NetworkConfig::new(key.as_str())),
    };
    Ok(output)
}

/// Describes the global configuration followed by every endpoint.
pub(crate) fn describe_all(registry: &ClientRegistry) -> Vec<ConfigOutput> {
    let resolver = registry.resolver();
    let mut outputs = Vec::new();

    // Any unregistered URL resolves to the global entry.
    if resolver.has_global() {
        if let Ok(global) = resolver.resolve("", None) {
            outputs.push(ConfigOutput::new("*", ConfigSource::Global.as_str(), &global));
        }
    }
    for base_url in resolver.registered_endpoints() {
        if let Ok(config) = resolver.resolve(&base_url, None) {
            outputs.push(ConfigOutput::new(&base_url, ConfigSource::Endpoint.as_str(), &config));
        }
    }
    outputs
}

fn show_paths(cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let settings_path = cli.settings_path();
    let cookie_path = default_cookie_path();
    let cookie_db_path = default_cookie_db_path();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", settings_path.display());
            println!("Cookie file:   {}", cookie_path.display());
            println!("Cookie db:     {}", cookie_db_path.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "configDir": config_dir.display().to_string(),
                "settingsFile": settings_path.display().to_string(),
                "cookieFile": cookie_path.display().to_string(),
                "cookieDb": cookie_db_path.display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

async fn reset_config(cli: &Cli) -> Result<()> {
    let path = cli.settings_path();

    if path.exists() {
        tokio::fs::remove_file(&path).await?;
        info!(path = %path.display(), "Settings reset");
        println!("Configuration reset to defaults");
    } else {
        println!("No configuration file to reset");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_unregistered_endpoint_uses_defaults() {
        let registry = ClientRegistry::new();
        let output = describe_endpoint(&registry, "https://api.example.com").unwrap();
        assert_eq!(output.base_url, "https://api.example.com/");
        assert_eq!(output.source, "default");
        assert_eq!(output.connect_timeout_ms, 40_000);
    }

    #[test]
    fn test_describe_registered_endpoint() {
        let registry = ClientRegistry::new();
        registry
            .register_endpoint(
                "https://api.example.com/",
                NetworkConfig::new("").with_header("X-App", "demo"),
            )
            .unwrap();
        let output = describe_endpoint(&registry, "https://api.example.com/").unwrap();
        assert_eq!(output.source, "endpoint");
        assert_eq!(output.headers.get("X-App").map(String::as_str), Some("demo"));
    }

    #[test]
    fn test_describe_all_lists_global_first() {
        let registry = ClientRegistry::new();
        registry.register_global(NetworkConfig::new("").with_timeouts_ms(5_000, 0, 0));
        registry
            .register_endpoint("https://b.example.com/", NetworkConfig::new(""))
            .unwrap();

        let outputs = describe_all(&registry);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].base_url, "*");
        assert_eq!(outputs[0].connect_timeout_ms, 5_000);
        assert_eq!(outputs[1].base_url, "https://b.example.com/");
    }

    #[test]
    fn test_describe_invalid_url() {
        let registry = ClientRegistry::new();
        assert!(describe_endpoint(&registry, "ftp://example.com").is_err());
    }
}
