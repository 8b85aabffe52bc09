use anyhow::Result;

use qrwizard_core::analytics::ScanFilter;

use crate::backend::parse_ts;
use crate::queries::filters::build_filter_sql;
use crate::DuckDbBackend;

/// One row of the flat scans export, joined to its parent link. Column order
/// is fixed by the CSV writer in the server crate.
#[derive(Debug, Clone)]
pub struct ScanExportRow {
    pub scan_id: i64,
    /// ISO-8601 rendering of `scanned_at`.
    pub scanned_at: String,
    pub slug: String,
    pub name: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub owner: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub device_type: Option<String>,
    pub referrer: Option<String>,
    pub is_bot: bool,
    pub is_unique: bool,
    pub is_duplicate: bool,
}

impl DuckDbBackend {
    /// Filtered scans (bots included — the export is the raw record), newest
    /// first.
    pub async fn export_scan_rows(&self, filter: &ScanFilter) -> Result<Vec<ScanExportRow>> {
        let filter_sql = build_filter_sql(filter, "s", "scanned_at");
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT s.id, CAST(s.scanned_at AS VARCHAR),
                      q.slug, q.name, q.campaign, q.channel, q.location, q.owner,
                      s.country, s.region, s.city, s.os, s.browser, s.device_type,
                      s.referrer, s.is_bot, s.is_unique, s.is_duplicate
               FROM scan_events s
               JOIN qr_codes q ON q.id = s.qr_code_id
               WHERE 1=1{clause}
               ORDER BY s.scanned_at DESC, s.id DESC"#,
            clause = filter_sql.clause,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(filter_sql.param_refs().as_slice(), |row| {
            let scanned_at = parse_ts(&row.get::<_, String>(1)?)?;
            Ok(ScanExportRow {
                scan_id: row.get(0)?,
                scanned_at: scanned_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
                slug: row.get(2)?,
                name: row.get(3)?,
                campaign: row.get(4)?,
                channel: row.get(5)?,
                location: row.get(6)?,
                owner: row.get(7)?,
                country: row.get(8)?,
                region: row.get(9)?,
                city: row.get(10)?,
                os: row.get(11)?,
                browser: row.get(12)?,
                device_type: row.get(13)?,
                referrer: row.get(14)?,
                is_bot: row.get(15)?,
                is_unique: row.get(16)?,
                is_duplicate: row.get(17)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
