//! Cookies command - inspect and clear persisted cookies.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use portway_core::CookieStore;
use portway_store::{
    DbCookieStore, DurableCookieStore, JsonFileKv, default_cookie_db_path, default_cookie_path,
};
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the cookies command.
#[derive(Args)]
pub struct CookiesArgs {
    #[command(subcommand)]
    pub action: CookiesAction,
}

/// Cookies subcommands.
#[derive(Subcommand)]
pub enum CookiesAction {
    /// List stored cookies.
    List {
        /// Only cookies stored under this domain.
        #[arg(long, short)]
        domain: Option<String>,

        /// Backend to read.
        #[arg(long, short, default_value = "persistent")]
        backend: Backend,
    },

    /// Remove every stored cookie.
    Clear {
        /// Backend to clear.
        #[arg(long, short, default_value = "persistent")]
        backend: Backend,
    },
}

/// Durable cookie backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// JSON key-value file used by `PERSISTENT` mode.
    Persistent,
    /// SQLite database used by `DB` mode.
    Db,
}

/// Runs the cookies command.
pub async fn run(args: &CookiesArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        CookiesAction::List { domain, backend } => {
            let store = open_store(*backend, &default_cookie_path(), &default_cookie_db_path())?;
            list_cookies(store.as_ref(), domain.as_deref(), cli)
        }
        CookiesAction::Clear { backend } => {
            let store = open_store(*backend, &default_cookie_path(), &default_cookie_db_path())?;
            clear_cookies(store.as_ref(), cli)
        }
    }
}

/// Opens the backend the registry would use for the matching cookie mode.
pub(crate) fn open_store(
    backend: Backend,
    kv_path: &Path,
    db_path: &Path,
) -> Result<Arc<dyn CookieStore>> {
    let store: Arc<dyn CookieStore> = match backend {
        Backend::Persistent => {
            let kv = JsonFileKv::open(kv_path)?;
            Arc::new(DurableCookieStore::open(Arc::new(kv)))
        }
        Backend::Db => Arc::new(DbCookieStore::open(db_path)?),
    };
    Ok(store)
}

fn list_cookies(store: &dyn CookieStore, domain: Option<&str>, cli: &Cli) -> Result<()> {
    let cookies = match domain {
        Some(domain) => store.get(domain),
        None => store.get_all(),
    };

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_cookies(&cookies));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_cookies(&cookies)?);
        }
    }

    Ok(())
}

fn clear_cookies(store: &dyn CookieStore, cli: &Cli) -> Result<()> {
    let removed = store.get_all().len();
    let emptied = store.remove_all();
    info!(backend = store.name(), removed, emptied, "Cookies cleared");

    match cli.format {
        OutputFormat::Text => {
            if !cli.quiet {
                println!("Removed {removed} cookie(s) from {}", store.name());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "backend": store.name(),
                "removed": removed,
                "empty": emptied,
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    if !emptied {
        anyhow::bail!("{} still holds cookies after clearing", store.name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portway_core::Cookie;

    #[test]
    fn test_persistent_backend_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let kv_path = dir.path().join("cookies.json");
        let db_path = dir.path().join("cookies.db");

        let expires = chrono::Utc::now().timestamp_millis() + 3_600_000;
        let store = open_store(Backend::Persistent, &kv_path, &db_path).unwrap();
        store.add(
            "example.com",
            vec![Cookie::new("sid", "abc", "example.com").with_expires_at(expires)],
        );
        drop(store);

        let reopened = open_store(Backend::Persistent, &kv_path, &db_path).unwrap();
        let cookies = reopened.get("example.com");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "abc");
        assert_eq!(reopened.name(), "durable");
    }

    #[test]
    fn test_db_backend_clears() {
        let dir = tempfile::tempdir().unwrap();
        let kv_path = dir.path().join("cookies.json");
        let db_path = dir.path().join("cookies.db");

        let store = open_store(Backend::Db, &kv_path, &db_path).unwrap();
        store.add("example.com", vec![Cookie::new("sid", "abc", "example.com")]);
        assert!(store.remove_all());
        assert!(store.get_all().is_empty());
        assert_eq!(store.name(), "db");
    }
}
