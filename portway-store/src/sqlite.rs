//! SQLite-backed cookie store.
//!
//! All cookies live in one `cookies` table keyed by `(bucket, identity)`,
//! where the bucket is the domain the cookie was stored under. Session
//! cookies are stored too, flagged `persistent = 0`, and deleted when the
//! database is next opened.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use portway_core::{Cookie, CookieStore};
use rusqlite::{Connection, Row, params};
use tracing::{debug, info, warn};

use crate::error::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cookies (
        bucket      TEXT    NOT NULL,
        identity    TEXT    NOT NULL,
        name        TEXT    NOT NULL,
        value       TEXT    NOT NULL,
        domain      TEXT    NOT NULL,
        path        TEXT    NOT NULL,
        expires_at  INTEGER NOT NULL,
        persistent  INTEGER NOT NULL,
        secure      INTEGER NOT NULL DEFAULT 0,
        http_only   INTEGER NOT NULL DEFAULT 0,
        host_only   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (bucket, identity)
    );
";

const SELECT_COLUMNS: &str =
    "SELECT name, value, domain, path, expires_at, persistent, secure, http_only, host_only
     FROM cookies";

/// Cookie store kept in a SQLite database.
pub struct DbCookieStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DbCookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCookieStore").finish_non_exhaustive()
    }
}

impl DbCookieStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened cookie database");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let dropped = conn.execute("DELETE FROM cookies WHERE persistent = 0", [])?;
        let kept: i64 = conn.query_row("SELECT COUNT(*) FROM cookies", [], |row| row.get(0))?;
        info!(cookies = kept, dropped_session = dropped, "Loaded cookie database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(conn: &Connection, bucket: &str, cookie: &Cookie) -> Result<(), StoreError> {
        // REPLACE deletes the old row first, so the new one sorts last.
        conn.execute(
            "INSERT OR REPLACE INTO cookies
                 (bucket, identity, name, value, domain, path, expires_at,
                  persistent, secure, http_only, host_only)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                bucket,
                cookie.identity(),
                cookie.name,
                cookie.value,
                cookie.domain,
                cookie.path,
                cookie.expires_at,
                cookie.persistent,
                cookie.secure,
                cookie.http_only,
                cookie.host_only,
            ],
        )?;
        Ok(())
    }

    fn select(conn: &Connection, bucket: Option<&str>) -> Result<Vec<Cookie>, StoreError> {
        if let Some(bucket) = bucket {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE bucket = ?1 ORDER BY rowid"))?;
            let cookies = stmt
                .query_map([bucket], row_to_cookie)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cookies)
        } else {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;
            let cookies = stmt
                .query_map([], row_to_cookie)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cookies)
        }
    }

    fn try_get(&self, bucket: Option<&str>) -> Result<Vec<Cookie>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now().timestamp_millis();
        let purged = match bucket {
            Some(bucket) => conn.execute(
                "DELETE FROM cookies WHERE bucket = ?1 AND expires_at < ?2",
                params![bucket, now],
            )?,
            None => conn.execute("DELETE FROM cookies WHERE expires_at < ?1", [now])?,
        };
        if purged > 0 {
            debug!(count = purged, "Purged expired cookies");
        }
        Self::select(&conn, bucket)
    }
}

fn row_to_cookie(row: &Row<'_>) -> rusqlite::Result<Cookie> {
    Ok(Cookie {
        name: row.get(0)?,
        value: row.get(1)?,
        domain: row.get(2)?,
        path: row.get(3)?,
        expires_at: row.get(4)?,
        persistent: row.get(5)?,
        secure: row.get(6)?,
        http_only: row.get(7)?,
        host_only: row.get(8)?,
    })
}

impl CookieStore for DbCookieStore {
    fn add(&self, domain: &str, cookies: Vec<Cookie>) {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let result = conn.transaction().map_err(StoreError::from).and_then(|tx| {
            for cookie in &cookies {
                Self::insert(&tx, domain, cookie)?;
            }
            tx.commit().map_err(StoreError::from)
        });
        if let Err(e) = result {
            warn!(domain, error = %e, "Failed to store cookies");
        }
    }

    fn get(&self, domain: &str) -> Vec<Cookie> {
        self.try_get(Some(domain)).unwrap_or_else(|e| {
            warn!(domain, error = %e, "Failed to read cookies");
            Vec::new()
        })
    }

    fn get_all(&self) -> Vec<Cookie> {
        self.try_get(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read cookies");
            Vec::new()
        })
    }

    fn remove(&self, domain: &str, cookie: &Cookie) -> bool {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match conn.execute(
            "DELETE FROM cookies WHERE bucket = ?1 AND identity = ?2",
            params![domain, cookie.identity()],
        ) {
            Ok(n) => n > 0,
            Err(e) => {
                warn!(domain, error = %e, "Failed to remove cookie");
                false
            }
        }
    }

    fn remove_all(&self) -> bool {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM cookies", [])
            .inspect_err(|e| warn!(error = %e, "Failed to clear cookies"))
            .is_ok()
    }

    fn name(&self) -> &'static str {
        "db"
    }
}
