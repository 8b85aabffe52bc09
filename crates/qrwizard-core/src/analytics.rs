//! Analytics filter, bucketing, and breakdown types shared between the HTTP
//! layer and the store.

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Filter set every analytics endpoint accepts. Filters compose as
/// conjunctions; unspecified facets do not constrain. Facet filters apply to
/// the parent link, so scan and conversion queries join `qr_codes`.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub qr_code_id: Option<i64>,
}

/// Time-series bucket width. Bucket keys are strftime strings chosen so week
/// (`YYYY-W%W`) and month (`YYYY-MM`) buckets sort lexically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("day") => Ok(Self::Day),
            Some("hour") => Ok(Self::Hour),
            Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some(_) => Err(anyhow!("granularity must be hour, day, week, or month")),
        }
    }

    /// strftime format for the bucket key.
    pub fn bucket_format(&self) -> &'static str {
        match self {
            Self::Hour => "%Y-%m-%d %H:00",
            Self::Day => "%Y-%m-%d",
            Self::Week => "%Y-W%W",
            Self::Month => "%Y-%m",
        }
    }
}

/// Closed set of breakdown dimensions. Unknown inputs default to `Campaign`
/// rather than erroring, so dashboards degrade gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownField {
    Campaign,
    Channel,
    Location,
    Country,
    Region,
    City,
    Device,
    Browser,
    Os,
    Referrer,
    HourOfDay,
    DayOfWeek,
}

impl BreakdownField {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("channel") => Self::Channel,
            Some("location") => Self::Location,
            Some("country") => Self::Country,
            Some("region") => Self::Region,
            Some("city") => Self::City,
            Some("device") => Self::Device,
            Some("browser") => Self::Browser,
            Some("os") => Self::Os,
            Some("referrer") => Self::Referrer,
            Some("hour_of_day") => Self::HourOfDay,
            Some("day_of_week") => Self::DayOfWeek,
            _ => Self::Campaign,
        }
    }

    /// Post-process a raw group label for presentation: numeric hours become
    /// `HH:00`, numeric weekdays become English day names (0 = Sunday), and
    /// NULL groups collapse to `(unknown)`.
    pub fn humanize_label(&self, raw: Option<String>) -> String {
        let Some(label) = raw.filter(|l| !l.is_empty()) else {
            return "(unknown)".to_string();
        };
        match self {
            Self::HourOfDay => format!("{label}:00"),
            Self::DayOfWeek => day_name(&label).unwrap_or(label),
            _ => label,
        }
    }
}

fn day_name(raw: &str) -> Option<String> {
    let name = match raw {
        "0" => "Sunday",
        "1" => "Monday",
        "2" => "Tuesday",
        "3" => "Wednesday",
        "4" => "Thursday",
        "5" => "Friday",
        "6" => "Saturday",
        _ => return None,
    };
    Some(name.to_string())
}

/// Summary KPIs over the filtered window. Bot scans are excluded from every
/// counter except `bot_scans` itself.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_scans: i64,
    pub unique_scans: i64,
    pub bot_scans: i64,
    pub conversions: i64,
    pub conversion_rate: f64,
    pub geo_accuracy_note: String,
    pub unique_definition: String,
}

/// `round(conversions / unique_scans × 100, 2)`; zero when there are no
/// unique scans.
pub fn conversion_rate(conversions: i64, unique_scans: i64) -> f64 {
    if unique_scans == 0 {
        return 0.0;
    }
    let rate = conversions as f64 / unique_scans as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesPoint {
    pub bucket: String,
    pub total_scans: i64,
    pub unique_scans: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopLink {
    pub qr_code_id: i64,
    pub slug: String,
    pub name: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub total_scans: i64,
    pub unique_scans: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownRow {
    pub label: String,
    pub total_scans: i64,
    pub unique_scans: i64,
}

/// Distinct facet values offered to filter pickers.
#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub campaigns: Vec<String>,
    pub channels: Vec<String>,
    pub locations: Vec<String>,
    pub owners: Vec<String>,
}
