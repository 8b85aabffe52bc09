use std::sync::Arc;

use qrwizard_core::config::Config;
use qrwizard_duckdb::DuckDbBackend;

use crate::geo::GeoResolver;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// All fields are cheap to clone — heavy resources live behind `Arc`.
pub struct AppState {
    /// The DuckDB store. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Geo resolver opened at process start and held for the process
    /// lifetime. Resolves to all-None when no database is configured.
    pub geo: Arc<GeoResolver>,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config, geo: GeoResolver) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            geo: Arc::new(geo),
        }
    }
}
