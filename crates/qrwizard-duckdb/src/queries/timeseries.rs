use anyhow::Result;

use qrwizard_core::analytics::{Granularity, ScanFilter, TimeseriesPoint};

use crate::queries::filters::build_filter_sql;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Non-bot scans bucketed by the granularity's strftime key. Week
    /// (`YYYY-W%W`) and month (`YYYY-MM`) keys sort lexically, so `ORDER BY
    /// bucket` is chronological for every granularity.
    pub async fn timeseries(
        &self,
        filter: &ScanFilter,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesPoint>> {
        let filter_sql = build_filter_sql(filter, "s", "scanned_at");
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT strftime(s.scanned_at, '{fmt}') AS bucket,
                      CAST(COUNT(*) AS BIGINT) AS total_scans,
                      CAST(COALESCE(SUM(CASE WHEN s.is_unique THEN 1 ELSE 0 END), 0) AS BIGINT) AS unique_scans
               FROM scan_events s
               JOIN qr_codes q ON q.id = s.qr_code_id
               WHERE s.is_bot = false{clause}
               GROUP BY bucket
               ORDER BY bucket ASC"#,
            fmt = granularity.bucket_format(),
            clause = filter_sql.clause,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter_sql.param_refs().as_slice(), |row| {
            Ok(TimeseriesPoint {
                bucket: row.get(0)?,
                total_scans: row.get(1)?,
                unique_scans: row.get(2)?,
            })
        })?;

        let mut series = Vec::new();
        for row in rows {
            series.push(row?);
        }
        Ok(series)
    }
}
