use anyhow::Result;
use chrono::NaiveDateTime;

use qrwizard_core::model::{ScanDraft, ScanEvent};

use crate::backend::{format_ts, now_utc, parse_ts};
use crate::DuckDbBackend;

const SCAN_SELECT: &str = "id, qr_code_id, CAST(scanned_at AS VARCHAR), ip_hash, \
     visitor_fingerprint, country, region, city, os, browser, device_type, referrer, \
     user_agent, is_bot, is_unique, is_duplicate, query_payload";

fn scan_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<ScanEvent> {
    Ok(ScanEvent {
        id: row.get(0)?,
        qr_code_id: row.get(1)?,
        scanned_at: parse_ts(&row.get::<_, String>(2)?)?,
        ip_hash: row.get(3)?,
        visitor_fingerprint: row.get(4)?,
        country: row.get(5)?,
        region: row.get(6)?,
        city: row.get(7)?,
        os: row.get(8)?,
        browser: row.get(9)?,
        device_type: row.get(10)?,
        referrer: row.get(11)?,
        user_agent: row.get(12)?,
        is_bot: row.get(13)?,
        is_unique: row.get(14)?,
        is_duplicate: row.get(15)?,
        query_payload: row.get(16)?,
    })
}

impl DuckDbBackend {
    /// True when the fingerprint already produced a non-bot scan on this link
    /// at or after `window_start`.
    ///
    /// This check and the subsequent [`record_scan`](Self::record_scan) are
    /// deliberately two statements, not one transaction: two concurrent
    /// first-from-a-fingerprint scans can in rare cases both count as unique.
    /// That bounded error is accepted; within one process the connection
    /// mutex already serialises the writes.
    pub async fn has_recent_scan(
        &self,
        qr_code_id: i64,
        fingerprint: &str,
        window_start: &NaiveDateTime,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM scan_events \
                 WHERE qr_code_id = ?1 AND visitor_fingerprint = ?2 \
                   AND is_bot = false AND scanned_at >= ?3",
            )?
            .query_row(
                duckdb::params![qr_code_id, fingerprint, format_ts(window_start)],
                |row| row.get(0),
            )?;
        Ok(count > 0)
    }

    /// Persist a classified scan. Returns the stored event id.
    pub async fn record_scan(&self, draft: &ScanDraft) -> Result<i64> {
        let conn = self.conn.lock().await;
        let id: i64 = conn
            .prepare(
                r#"INSERT INTO scan_events (
                    qr_code_id, scanned_at, ip_hash, visitor_fingerprint,
                    country, region, city,
                    os, browser, device_type,
                    referrer, user_agent,
                    is_bot, is_unique, is_duplicate,
                    query_payload
                ) VALUES (
                    ?1, ?2, ?3, ?4,
                    ?5, ?6, ?7,
                    ?8, ?9, ?10,
                    ?11, ?12,
                    ?13, ?14, ?15,
                    ?16
                ) RETURNING id"#,
            )?
            .query_row(
                duckdb::params![
                    draft.qr_code_id,
                    format_ts(&now_utc()),
                    draft.ip_hash,
                    draft.visitor_fingerprint,
                    draft.country,
                    draft.region,
                    draft.city,
                    draft.os,
                    draft.browser,
                    draft.device_type,
                    draft.referrer,
                    draft.user_agent,
                    draft.is_bot,
                    draft.is_unique,
                    draft.is_duplicate,
                    draft.query_payload,
                ],
                |row| row.get(0),
            )?;
        Ok(id)
    }

    pub async fn scan_by_id(&self, id: i64) -> Result<Option<ScanEvent>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {SCAN_SELECT} FROM scan_events WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(duckdb::params![id], scan_from_row)?;
        Ok(rows.next().transpose()?)
    }
}
