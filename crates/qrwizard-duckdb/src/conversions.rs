use anyhow::Result;

use qrwizard_core::model::ConversionEvent;

use crate::backend::{format_ts, now_utc};
use crate::DuckDbBackend;

#[derive(Debug, Clone, Default)]
pub struct ConversionDraft {
    pub qr_code_id: i64,
    pub goal_id: Option<i64>,
    pub scan_event_id: Option<i64>,
    pub event_name: Option<String>,
    pub value: Option<f64>,
    pub visitor_fingerprint: Option<String>,
}

impl DuckDbBackend {
    pub async fn record_conversion(&self, draft: &ConversionDraft) -> Result<ConversionEvent> {
        let conn = self.conn.lock().await;
        let now = now_utc();
        let id: i64 = conn
            .prepare(
                r#"INSERT INTO conversion_events (
                    qr_code_id, goal_id, scan_event_id,
                    event_name, value, visitor_fingerprint, occurred_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id"#,
            )?
            .query_row(
                duckdb::params![
                    draft.qr_code_id,
                    draft.goal_id,
                    draft.scan_event_id,
                    draft.event_name,
                    draft.value,
                    draft.visitor_fingerprint,
                    format_ts(&now),
                ],
                |row| row.get(0),
            )?;
        Ok(ConversionEvent {
            id,
            qr_code_id: draft.qr_code_id,
            goal_id: draft.goal_id,
            scan_event_id: draft.scan_event_id,
            event_name: draft.event_name.clone(),
            value: draft.value,
            visitor_fingerprint: draft.visitor_fingerprint.clone(),
            occurred_at: now,
        })
    }
}
