use anyhow::Result;

use qrwizard_core::model::HistoryEntry;

use crate::backend::{format_ts, now_utc, parse_ts};
use crate::DuckDbBackend;

/// Cap applied to the per-link history read.
pub const HISTORY_LIMIT: usize = 200;

impl DuckDbBackend {
    /// Append an audit entry. `details` is an opaque JSON string; entries are
    /// never mutated and only go away with the link's cascade delete.
    pub async fn append_history(
        &self,
        qr_code_id: i64,
        action: &str,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO qr_history (qr_code_id, action, details, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            duckdb::params![qr_code_id, action, details, format_ts(&now_utc())],
        )?;
        Ok(())
    }

    /// The most recent [`HISTORY_LIMIT`] entries for a link, newest first.
    pub async fn recent_history(&self, qr_code_id: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT id, qr_code_id, action, details, CAST(created_at AS VARCHAR) \
             FROM qr_history WHERE qr_code_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT {HISTORY_LIMIT}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params![qr_code_id], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                qr_code_id: row.get(1)?,
                action: row.get(2)?,
                details: row.get(3)?,
                created_at: parse_ts(&row.get::<_, String>(4)?)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
