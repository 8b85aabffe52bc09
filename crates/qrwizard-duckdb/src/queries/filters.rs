use qrwizard_core::analytics::ScanFilter;

use crate::backend::format_ts;

/// A composed `AND ...` fragment plus its positional parameters.
///
/// Every analytics query joins the event table (aliased `s` for scans, `c`
/// for conversions) to `qr_codes q` so the link facets can constrain; the
/// fragment is appended after the query's fixed first condition.
pub(crate) struct FilterSql {
    pub clause: String,
    pub params: Vec<Box<dyn duckdb::types::ToSql + Send>>,
}

impl FilterSql {
    pub fn param_refs(&self) -> Vec<&(dyn duckdb::types::ToSql + Send)> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Build the conjunction of the optional filters. Unspecified fields add no
/// condition. `event_alias`/`time_col` select between the scans and
/// conversions shapes (`s`/`scanned_at` vs `c`/`occurred_at`).
pub(crate) fn build_filter_sql(
    filter: &ScanFilter,
    event_alias: &str,
    time_col: &str,
) -> FilterSql {
    let mut clause = String::new();
    let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = Vec::new();
    let mut param_idx = 1;

    if let Some(start) = &filter.start {
        clause.push_str(&format!(" AND {event_alias}.{time_col} >= ?{param_idx}"));
        params.push(Box::new(format_ts(start)));
        param_idx += 1;
    }
    if let Some(end) = &filter.end {
        clause.push_str(&format!(" AND {event_alias}.{time_col} <= ?{param_idx}"));
        params.push(Box::new(format_ts(end)));
        param_idx += 1;
    }
    for (col, value) in [
        ("q.campaign", &filter.campaign),
        ("q.channel", &filter.channel),
        ("q.location", &filter.location),
        ("q.owner", &filter.owner),
        ("q.status", &filter.status),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            clause.push_str(&format!(" AND {col} = ?{param_idx}"));
            params.push(Box::new(v.to_string()));
            param_idx += 1;
        }
    }
    if let Some(id) = filter.qr_code_id {
        clause.push_str(&format!(" AND {event_alias}.qr_code_id = ?{param_idx}"));
        params.push(Box::new(id));
    }

    FilterSql { clause, params }
}
