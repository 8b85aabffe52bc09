/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// Entity keys are monotonic integers drawn from per-table sequences.
///
/// No FOREIGN KEY declarations: DuckDB enforces FK constraints immediately at
/// statement time, which conflicts with the manual cascade-delete order
/// (scans → conversions → goals → history → link) run inside one
/// transaction. See `delete_link()` in links.rs.
///
/// `qr_codes.expires_at` is intentionally absent here — it is added by the
/// idempotent column migration in backend.rs so databases created before the
/// column existed upgrade in place.
pub const INIT_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_qr_codes;
CREATE SEQUENCE IF NOT EXISTS seq_scan_events;
CREATE SEQUENCE IF NOT EXISTS seq_goals;
CREATE SEQUENCE IF NOT EXISTS seq_conversion_events;
CREATE SEQUENCE IF NOT EXISTS seq_qr_history;

-- ===========================================
-- QR CODES (links)
-- ===========================================
CREATE TABLE IF NOT EXISTS qr_codes (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_qr_codes'),
    slug            VARCHAR(32) NOT NULL UNIQUE,
    name            VARCHAR,
    destination_url VARCHAR NOT NULL,
    campaign        VARCHAR,
    channel         VARCHAR,
    location        VARCHAR,
    asset           VARCHAR,
    owner           VARCHAR,
    notes           VARCHAR,
    status          VARCHAR(20) NOT NULL DEFAULT 'active',   -- 'active' | 'paused' | 'archived'
    auto_append_utm BOOLEAN NOT NULL DEFAULT false,
    utm_source      VARCHAR,
    utm_medium      VARCHAR,
    utm_campaign    VARCHAR,
    utm_term        VARCHAR,
    utm_content     VARCHAR,
    dynamic         BOOLEAN NOT NULL DEFAULT true,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
-- Redirect hot path resolves links by slug.
CREATE UNIQUE INDEX IF NOT EXISTS idx_qr_codes_slug ON qr_codes(slug);

-- ===========================================
-- SCAN EVENTS (main analytics table)
-- ===========================================
CREATE TABLE IF NOT EXISTS scan_events (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('seq_scan_events'),
    qr_code_id          BIGINT NOT NULL,
    scanned_at          TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,  -- naive UTC wall time
    ip_hash             VARCHAR(64),               -- sha256(salt :: anonymized network)
    visitor_fingerprint VARCHAR(64),               -- sha256(ip_hash | ua prefix); NULL when both absent
    country             VARCHAR,
    region              VARCHAR,
    city                VARCHAR,
    os                  VARCHAR,
    browser             VARCHAR,
    device_type         VARCHAR(50),               -- mobile | tablet | desktop | bot | other | unknown
    referrer            VARCHAR,
    user_agent          VARCHAR,
    is_bot              BOOLEAN NOT NULL DEFAULT false,
    is_unique           BOOLEAN NOT NULL DEFAULT false,
    is_duplicate        BOOLEAN NOT NULL DEFAULT false,
    query_payload       VARCHAR                    -- JSON string of inbound query params
);
CREATE INDEX IF NOT EXISTS idx_scan_events_qr_code     ON scan_events(qr_code_id);
CREATE INDEX IF NOT EXISTS idx_scan_events_scanned_at  ON scan_events(scanned_at);
CREATE INDEX IF NOT EXISTS idx_scan_events_ip_hash     ON scan_events(ip_hash);
-- Uniqueness-window lookup: prior non-bot scan by the same fingerprint.
CREATE INDEX IF NOT EXISTS idx_scan_events_fingerprint ON scan_events(visitor_fingerprint);
CREATE INDEX IF NOT EXISTS idx_scan_events_is_bot      ON scan_events(is_bot);
CREATE INDEX IF NOT EXISTS idx_scan_events_is_unique   ON scan_events(is_unique);
CREATE INDEX IF NOT EXISTS idx_scan_events_is_dup      ON scan_events(is_duplicate);

-- ===========================================
-- GOALS (qr_code_id NULL = global goal)
-- ===========================================
CREATE TABLE IF NOT EXISTS goals (
    id          BIGINT PRIMARY KEY DEFAULT nextval('seq_goals'),
    qr_code_id  BIGINT,
    name        VARCHAR NOT NULL,
    target_url  VARCHAR,
    description VARCHAR,
    active      BOOLEAN NOT NULL DEFAULT true,
    created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_goals_qr_code ON goals(qr_code_id);

-- ===========================================
-- CONVERSION EVENTS
-- ===========================================
CREATE TABLE IF NOT EXISTS conversion_events (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('seq_conversion_events'),
    qr_code_id          BIGINT NOT NULL,
    goal_id             BIGINT,
    scan_event_id       BIGINT,
    event_name          VARCHAR,
    value               DOUBLE,
    visitor_fingerprint VARCHAR(64),
    occurred_at         TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_conversions_qr_code     ON conversion_events(qr_code_id);
CREATE INDEX IF NOT EXISTS idx_conversions_goal        ON conversion_events(goal_id);
CREATE INDEX IF NOT EXISTS idx_conversions_occurred_at ON conversion_events(occurred_at);
CREATE INDEX IF NOT EXISTS idx_conversions_fingerprint ON conversion_events(visitor_fingerprint);

-- ===========================================
-- HISTORY (append-only audit journal per link)
-- ===========================================
CREATE TABLE IF NOT EXISTS qr_history (
    id          BIGINT PRIMARY KEY DEFAULT nextval('seq_qr_history'),
    qr_code_id  BIGINT NOT NULL,
    action      VARCHAR(100) NOT NULL,
    details     VARCHAR,                           -- opaque JSON
    created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_qr_history_qr_code ON qr_history(qr_code_id);
"#;

/// Migrations tracking table SQL.
///
/// Run before [`INIT_SQL`]. Tracks which numbered migrations have been
/// applied so restarts don't re-run them.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
