use anyhow::Result;

use qrwizard_core::analytics::{conversion_rate, ScanFilter, Summary};

use crate::queries::filters::build_filter_sql;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Summary KPIs over the filtered window. `total_scans` and
    /// `unique_scans` exclude bots; `bot_scans` is the complement.
    pub async fn summary(&self, filter: &ScanFilter, unique_window_hours: u32) -> Result<Summary> {
        let scan_filter = build_filter_sql(filter, "s", "scanned_at");
        let conv_filter = build_filter_sql(filter, "c", "occurred_at");

        let conn = self.conn.lock().await;

        let count_scans = |first_cond: &str| -> Result<i64> {
            let sql = format!(
                "SELECT COUNT(*) FROM scan_events s \
                 JOIN qr_codes q ON q.id = s.qr_code_id \
                 WHERE {first_cond}{clause}",
                clause = scan_filter.clause,
            );
            let count = conn
                .prepare(&sql)?
                .query_row(scan_filter.param_refs().as_slice(), |row| row.get(0))?;
            Ok(count)
        };

        let total_scans = count_scans("s.is_bot = false")?;
        let unique_scans = count_scans("s.is_bot = false AND s.is_unique = true")?;
        let bot_scans = count_scans("s.is_bot = true")?;

        let conversions_sql = format!(
            "SELECT COUNT(*) FROM conversion_events c \
             JOIN qr_codes q ON q.id = c.qr_code_id \
             WHERE 1=1{clause}",
            clause = conv_filter.clause,
        );
        let conversions: i64 = conn
            .prepare(&conversions_sql)?
            .query_row(conv_filter.param_refs().as_slice(), |row| row.get(0))?;

        Ok(Summary {
            total_scans,
            unique_scans,
            bot_scans,
            conversions,
            conversion_rate: conversion_rate(conversions, unique_scans),
            geo_accuracy_note:
                "Geo is IP-based and approximate; city-level resolution may be imprecise or unavailable."
                    .to_string(),
            unique_definition: format!(
                "Unique = first non-bot scan per visitor fingerprint within {unique_window_hours}h."
            ),
        })
    }
}
