use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDateTime;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::{INIT_SQL, MIGRATIONS_TABLE_SQL};

/// The DuckDB store for QR Wizard.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. We wrap the connection in `Arc<Mutex<_>>` so the async
/// runtime serialises all access while the struct stays cheaply cloneable
/// across Axum handlers. Writes use short transactions; the uniqueness check
/// and the scan insert on the redirect path are deliberately separate
/// statements (see scans.rs).
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// Runs [`MIGRATIONS_TABLE_SQL`], [`INIT_SQL`], and the numbered column
    /// migrations, in that order, so tables, indexes, and late-added columns
    /// all exist before the first request is served.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(&conn)?;
        info!("DuckDB opened at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only — data is discarded when the struct is
    /// dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn bootstrap(conn: &Connection) -> Result<()> {
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(INIT_SQL)?;
        Self::apply_migrations(conn)?;
        Ok(())
    }

    /// Numbered, idempotent migrations applied after table creation.
    ///
    /// Each migration is recorded in `_migrations`; the DDL itself also uses
    /// `IF NOT EXISTS` so a lost tracking row cannot break a restart.
    fn apply_migrations(conn: &Connection) -> Result<()> {
        let applied: i64 = conn
            .prepare("SELECT COUNT(*) FROM _migrations WHERE id = 'm001_add_expires_at'")?
            .query_row([], |row| row.get(0))?;
        if applied == 0 {
            info!("Migrating: adding expires_at to qr_codes");
            conn.execute_batch(
                "ALTER TABLE qr_codes ADD COLUMN IF NOT EXISTS expires_at TIMESTAMP;",
            )?;
            conn.execute(
                "INSERT INTO _migrations (id) VALUES ('m001_add_expires_at')",
                [],
            )?;
        }
        Ok(())
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Called by the `/health` endpoint. Returns an error if the connection
    /// is unavailable (file locked, disk full, etc.).
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Direct connection access for test fixtures.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Current UTC wall time without a timezone marker, truncated to the
/// microsecond resolution of DuckDB's TIMESTAMP so values round-trip.
pub fn now_utc() -> NaiveDateTime {
    use chrono::Timelike;
    let now = chrono::Utc::now().naive_utc();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// Render a timestamp for a DuckDB TIMESTAMP parameter.
pub(crate) fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse the VARCHAR rendering DuckDB produces for TIMESTAMP casts
/// (`YYYY-MM-DD HH:MM:SS[.ffffff]`).
pub(crate) fn parse_ts(raw: &str) -> duckdb::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| {
        duckdb::Error::FromSqlConversionFailure(
            0,
            duckdb::types::Type::Text,
            Box::new(e),
        )
    })
}

/// Parse an optional timestamp cast.
pub(crate) fn parse_ts_opt(raw: Option<String>) -> duckdb::Result<Option<NaiveDateTime>> {
    raw.as_deref().map(parse_ts).transpose()
}
