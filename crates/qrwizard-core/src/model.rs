use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Link lifecycle state. Only `active` links redirect; the single automatic
/// transition is `active → archived` on expiry at redirect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Paused,
    Archived,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }

    /// Lenient parse: trims, lowercases, and falls back to `active` for
    /// anything outside the three literals.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("paused") => Self::Paused,
            Some("archived") => Self::Archived,
            _ => Self::Active,
        }
    }
}

/// Output image formats the renderer accepts. Anything else is a
/// validation error at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            other => Err(format!("format must be png or svg, got '{other}'")),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
        }
    }
}

/// A trackable link. Mirrors the `qr_codes` table columns exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub slug: String,
    pub name: Option<String>,
    pub destination_url: String,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub asset: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub status: LinkStatus,
    pub auto_append_utm: bool,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    /// Always true — static (re-printable) codes are not supported.
    pub dynamic: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
}

impl Link {
    /// Non-empty UTM fields as query pairs, in canonical order.
    pub fn utm_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("utm_source", &self.utm_source),
            ("utm_medium", &self.utm_medium),
            ("utm_campaign", &self.utm_campaign),
            ("utm_term", &self.utm_term),
            ("utm_content", &self.utm_content),
        ]
        .into_iter()
        .filter_map(|(k, v)| match v.as_deref() {
            Some(val) if !val.is_empty() => Some((k, val)),
            _ => None,
        })
        .collect()
    }
}

/// Field set for inserting a link; the store assigns id, slug (re-rolled on
/// collision), and timestamps.
#[derive(Debug, Clone, Default)]
pub struct LinkDraft {
    pub destination_url: String,
    pub name: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub asset: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub status: Option<LinkStatus>,
    pub auto_append_utm: bool,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

/// A recorded scan. Mirrors the `scan_events` table columns exactly.
///
/// Classifier invariants: `is_unique` and `is_duplicate` are mutually
/// exclusive; a bot scan is neither; a null fingerprint means both false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: i64,
    pub qr_code_id: i64,
    pub scanned_at: NaiveDateTime,
    pub ip_hash: Option<String>,
    pub visitor_fingerprint: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub device_type: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub is_bot: bool,
    pub is_unique: bool,
    pub is_duplicate: bool,
    /// JSON object of the inbound query parameters, serialized to a string.
    pub query_payload: Option<String>,
}

/// Field set for recording a scan; the store assigns id and `scanned_at`.
#[derive(Debug, Clone, Default)]
pub struct ScanDraft {
    pub qr_code_id: i64,
    pub ip_hash: Option<String>,
    pub visitor_fingerprint: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub device_type: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub is_bot: bool,
    pub is_unique: bool,
    pub is_duplicate: bool,
    pub query_payload: Option<String>,
}

/// A conversion goal, optionally scoped to one link (`qr_code_id = NULL`
/// means global).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub qr_code_id: Option<i64>,
    pub name: String,
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

/// A recorded conversion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: i64,
    pub qr_code_id: i64,
    pub goal_id: Option<i64>,
    pub scan_event_id: Option<i64>,
    pub event_name: Option<String>,
    pub value: Option<f64>,
    pub visitor_fingerprint: Option<String>,
    pub occurred_at: NaiveDateTime,
}

/// Append-only audit entry for a link. Never mutated; deleted only via the
/// link's cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub qr_code_id: i64,
    pub action: String,
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}
