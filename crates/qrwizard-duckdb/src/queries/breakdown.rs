use anyhow::Result;

use qrwizard_core::analytics::{BreakdownField, ScanFilter};

use crate::queries::filters::build_filter_sql;
use crate::DuckDbBackend;

/// Column or expression each breakdown dimension groups by. Link facets come
/// from `q`, scan denormalizations from `s`, and the two derived dimensions
/// from strftime (`%H` hour, `%w` weekday with Sunday = 0).
fn breakdown_expr(field: BreakdownField) -> &'static str {
    match field {
        BreakdownField::Campaign => "q.campaign",
        BreakdownField::Channel => "q.channel",
        BreakdownField::Location => "q.location",
        BreakdownField::Country => "s.country",
        BreakdownField::Region => "s.region",
        BreakdownField::City => "s.city",
        BreakdownField::Device => "s.device_type",
        BreakdownField::Browser => "s.browser",
        BreakdownField::Os => "s.os",
        BreakdownField::Referrer => "s.referrer",
        BreakdownField::HourOfDay => "strftime(s.scanned_at, '%H')",
        BreakdownField::DayOfWeek => "strftime(s.scanned_at, '%w')",
    }
}

impl DuckDbBackend {
    /// Group non-bot scans by the dimension. Labels come back raw
    /// (NULL-able); presentation mapping lives in
    /// [`BreakdownField::humanize_label`].
    pub async fn breakdown(
        &self,
        filter: &ScanFilter,
        field: BreakdownField,
        limit: u32,
    ) -> Result<Vec<(Option<String>, i64, i64)>> {
        let filter_sql = build_filter_sql(filter, "s", "scanned_at");
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT {expr} AS label,
                      CAST(COUNT(*) AS BIGINT) AS total_scans,
                      CAST(COALESCE(SUM(CASE WHEN s.is_unique THEN 1 ELSE 0 END), 0) AS BIGINT) AS unique_scans
               FROM scan_events s
               JOIN qr_codes q ON q.id = s.qr_code_id
               WHERE s.is_bot = false{clause}
               GROUP BY label
               ORDER BY COUNT(*) DESC
               LIMIT {limit}"#,
            expr = breakdown_expr(field),
            clause = filter_sql.clause,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter_sql.param_refs().as_slice(), |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }
}
