//! Get command - send a GET request through the registry pipeline.

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, ValueEnum};
use portway_client::{
    CallError, ClientRegistry, ConfigError, CookieMode, Dispatcher, ErrorClassifier, GetServiceOptions,
    HttpRequest, ManualLifecycle, NetworkConfig, Outcome, TransportClient,
};
use portway_core::ApiResponse;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use super::{config_failure, load_registry, request_failure};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, CommandFailure, ExitCode, OutputFormat};

/// Arguments for the get command.
#[derive(Args)]
pub struct GetArgs {
    /// Absolute URL to request.
    pub url: String,

    /// Extra request header, `Name: value`. Repeatable.
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Do not send or store cookies.
    #[arg(long)]
    pub no_cookies: bool,

    /// Cookie persistence for this request.
    #[arg(long)]
    pub cookie_mode: Option<CookieModeArg>,

    /// Log the request and response through the logging stage.
    #[arg(long)]
    pub log: bool,

    /// Treat the body as a `{code, msg, data}` envelope and print `data`.
    #[arg(long)]
    pub envelope: bool,

    /// Print response headers.
    #[arg(long, short = 'i')]
    pub include: bool,
}

/// Cookie modes selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CookieModeArg {
    /// In memory, discarded on exit.
    Memory,
    /// Durable JSON file in the data directory.
    Persistent,
    /// SQLite database in the data directory.
    Db,
}

impl From<CookieModeArg> for CookieMode {
    fn from(arg: CookieModeArg) -> Self {
        match arg {
            CookieModeArg::Memory => Self::Memory,
            CookieModeArg::Persistent => Self::Persistent,
            CookieModeArg::Db => Self::Db,
        }
    }
}

/// Runs the get command.
pub async fn run(args: &GetArgs, cli: &Cli) -> Result<()> {
    let (base_url, path) = split_url(&args.url)?;
    let registry = load_registry(cli).await?;

    let config = effective_config(&registry, &base_url, args)?;
    let opts = GetServiceOptions::default()
        .with_converter(args.envelope)
        .with_cookies(!args.no_cookies);
    let client = registry
        .client(&base_url, opts, Some(&config))
        .map_err(config_failure)?;

    let mut request = client.request(Method::GET, &path)?;
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }

    info!(url = %request.url, envelope = args.envelope, "Sending request");

    if args.envelope {
        fetch_envelope(client, request, cli).await
    } else {
        fetch_raw(&client, request, args, cli).await
    }
}

/// Resolves the registered configuration and layers the flags on top.
///
/// Endpoints with nothing registered fall back to defaults instead of
/// failing, since the URL is given explicitly.
fn effective_config(
    registry: &ClientRegistry,
    base_url: &str,
    args: &GetArgs,
) -> Result<NetworkConfig> {
    let mut config = match registry.resolver().resolve(base_url, None) {
        Ok(config) => config,
        Err(ConfigError::NotRegistered { .. }) => {
            debug!(base_url, "No configuration registered, using defaults");
            NetworkConfig::new(base_url)
        }
        Err(e) => return Err(config_failure(e)),
    };
    if args.log {
        config.print_default_log = true;
    }
    if let Some(mode) = args.cookie_mode {
        config.cookie_mode = Some(mode.into());
    }
    Ok(config)
}

async fn fetch_raw(
    client: &TransportClient,
    request: HttpRequest,
    args: &GetArgs,
    cli: &Cli,
) -> Result<()> {
    let response = client
        .execute(request)
        .await
        .map_err(|e| request_failure(cli, &ErrorClassifier::classify(e)))?;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color).with_headers(args.include);
            println!("{}", formatter.format_response(&response));
        }
        OutputFormat::Json if response.is_success() => {
            println!("{}", JsonFormatter::new(cli.pretty).format_response(&response)?);
        }
        OutputFormat::Json => {}
    }

    if response.is_success() {
        return Ok(());
    }
    let error = ErrorClassifier::classify(CallError::Status {
        status: response.status.as_u16(),
        reason: response.reason().to_string(),
    });
    Err(request_failure(cli, &error))
}

/// Runs the request through the dispatcher so ctrl-c cancels it the way a
/// torn-down host would.
async fn fetch_envelope(client: Arc<TransportClient>, request: HttpRequest, cli: &Cli) -> Result<()> {
    let dispatcher = Dispatcher::current()?;
    let lifecycle = ManualLifecycle::new();
    let scope = dispatcher.bind_scope(&lifecycle);

    let interrupt = lifecycle.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            interrupt.end();
        }
    });

    let handle = dispatcher.enqueue(&scope, async move {
        client
            .call::<ApiResponse<serde_json::Value>>(request)
            .await
    });
    let outcome = handle.outcome().await;
    watcher.abort();

    match outcome {
        Outcome::Success(data) => {
            let data = data.unwrap_or(serde_json::Value::Null);
            let output = match cli.format {
                OutputFormat::Json => JsonFormatter::new(cli.pretty).format(&data)?,
                OutputFormat::Text => serde_json::to_string_pretty(&data)?,
            };
            println!("{output}");
            Ok(())
        }
        Outcome::Failure(error) => Err(request_failure(cli, &error)),
        Outcome::Cancelled => Err(CommandFailure {
            code: ExitCode::Error,
            message: "request cancelled".to_string(),
        }
        .into()),
    }
}

/// Splits an absolute URL into the endpoint base (scheme, host, port) and
/// the relative path plus query.
pub(crate) fn split_url(raw: &str) -> Result<(String, String)> {
    let url = Url::parse(raw).map_err(|e| {
        config_failure(ConfigError::InvalidBaseUrl {
            base_url: raw.to_string(),
            reason: e.to_string(),
        })
    })?;
    if url.cannot_be_a_base() {
        return Err(config_failure(ConfigError::InvalidBaseUrl {
            base_url: raw.to_string(),
            reason: "not a hierarchical URL".to_string(),
        }));
    }

    let mut path = url.path().trim_start_matches('/').to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let mut base = url;
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    Ok((base.to_string(), path))
}

/// Parses a `Name: value` header argument.
pub(crate) fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let invalid = |reason: String| {
        config_failure(ConfigError::InvalidHeader {
            name: raw.to_string(),
            reason,
        })
    };
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| invalid("expected `Name: value`".to_string()))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let value = HeaderValue::from_str(value.trim()).map_err(|e| invalid(e.to_string()))?;
    Ok((name, value))
}
