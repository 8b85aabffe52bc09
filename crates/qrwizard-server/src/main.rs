use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use qrwizard_server::{app, geo::GeoResolver, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("qrwizard=info".parse()?),
        )
        .json()
        .init();

    let cfg = qrwizard_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure the data directory exists before opening DuckDB.
    if let Some(parent) = std::path::Path::new(&cfg.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = qrwizard_duckdb::DuckDbBackend::open(&cfg.database_path)?;

    // `--purge [--days N]` runs a retention pass and exits, for cron use.
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--purge") {
        let days = args
            .iter()
            .position(|a| a == "--days")
            .and_then(|i| args.get(i + 1))
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.data_retention_days);
        let result = db.purge_older_than(days).await?;
        info!(
            deleted_scans = result.deleted_scans,
            deleted_conversions = result.deleted_conversions,
            days,
            "Purge complete"
        );
        return Ok(());
    }

    let geo = GeoResolver::open(&cfg.geoip_db_path);
    let state = Arc::new(AppState::new(db, cfg.clone(), geo));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "QR Wizard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
