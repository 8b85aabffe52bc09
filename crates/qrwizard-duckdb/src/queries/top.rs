use anyhow::Result;

use qrwizard_core::analytics::{ScanFilter, TopLink};

use crate::queries::filters::build_filter_sql;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Links ranked by total non-bot scans inside the filter window. Ties
    /// break by ascending id (insertion order). `limit` is clamped by the
    /// caller.
    pub async fn top_links(&self, filter: &ScanFilter, limit: u32) -> Result<Vec<TopLink>> {
        let filter_sql = build_filter_sql(filter, "s", "scanned_at");
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT q.id, q.slug, q.name, q.campaign, q.channel, q.location,
                      CAST(COUNT(*) AS BIGINT) AS total_scans,
                      CAST(COALESCE(SUM(CASE WHEN s.is_unique THEN 1 ELSE 0 END), 0) AS BIGINT) AS unique_scans
               FROM scan_events s
               JOIN qr_codes q ON q.id = s.qr_code_id
               WHERE s.is_bot = false{clause}
               GROUP BY q.id, q.slug, q.name, q.campaign, q.channel, q.location
               ORDER BY COUNT(*) DESC, q.id ASC
               LIMIT {limit}"#,
            clause = filter_sql.clause,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter_sql.param_refs().as_slice(), |row| {
            Ok(TopLink {
                qr_code_id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                campaign: row.get(3)?,
                channel: row.get(4)?,
                location: row.get(5)?,
                total_scans: row.get(6)?,
                unique_scans: row.get(7)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }
}
