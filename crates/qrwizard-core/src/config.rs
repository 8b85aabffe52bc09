#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Path to the DuckDB database file.
    pub database_path: String,
    /// Salt mixed into every ip_hash. Rotating it breaks fingerprint
    /// continuity for all stored scans; that is an explicit operator choice.
    pub ip_hash_salt: String,
    pub unique_window_hours: u32,
    pub data_retention_days: u32,
    /// Base used when building tracking URLs in responses, e.g.
    /// `https://qr.example.com`. Trailing slashes are stripped at use sites.
    pub public_base_url: String,
    /// Query parameter appended to every redirect target (empty disables).
    pub tracking_param: String,
    /// Session cookie signing secret.
    pub secret_key: String,
    /// Argon2id PHC string the admin password is verified against.
    pub admin_password_hash: String,
    /// Optional MaxMind database path. Empty means no geo resolution.
    pub geoip_db_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("QRWIZARD_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            database_path: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "./data/qrwizard.db".to_string()),
            ip_hash_salt: std::env::var("IP_HASH_SALT")
                .unwrap_or_else(|_| "replace-me".to_string()),
            unique_window_hours: std::env::var("UNIQUE_WINDOW_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            data_retention_days: std::env::var("DATA_RETENTION_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            tracking_param: std::env::var("TRACKING_PARAM")
                .unwrap_or_else(|_| "qr_tid".to_string()),
            secret_key: std::env::var("SECRET_KEY")
                .map_err(|_| "SECRET_KEY is required".to_string())?,
            admin_password_hash: std::env::var("ADMIN_PASSWORD_HASH")
                .map_err(|_| "ADMIN_PASSWORD_HASH is required".to_string())?,
            geoip_db_path: std::env::var("GEOIP_DB_PATH").unwrap_or_default(),
        })
    }

    /// The public URL a QR image encodes for `slug`.
    pub fn tracking_url(&self, slug: &str) -> String {
        format!("{}/t/{}", self.public_base_url.trim_end_matches('/'), slug)
    }
}
