use anyhow::Result;

use crate::backend::{format_ts, now_utc};
use crate::DuckDbBackend;

/// Counts removed by a retention run.
#[derive(Debug, Clone, Copy)]
pub struct PurgeResult {
    pub deleted_scans: usize,
    pub deleted_conversions: usize,
}

impl DuckDbBackend {
    /// Delete scans and conversions older than `days`. Links, goals, and
    /// history are never purged automatically.
    pub async fn purge_older_than(&self, days: u32) -> Result<PurgeResult> {
        let cutoff = now_utc() - chrono::Duration::days(days as i64);
        let cutoff_str = format_ts(&cutoff);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let deleted_scans = tx.execute(
            "DELETE FROM scan_events WHERE scanned_at < ?1",
            duckdb::params![cutoff_str],
        )?;
        let deleted_conversions = tx.execute(
            "DELETE FROM conversion_events WHERE occurred_at < ?1",
            duckdb::params![cutoff_str],
        )?;
        tx.commit()?;

        tracing::info!(
            deleted_scans,
            deleted_conversions,
            days,
            "Retention purge complete"
        );
        Ok(PurgeResult {
            deleted_scans,
            deleted_conversions,
        })
    }
}
