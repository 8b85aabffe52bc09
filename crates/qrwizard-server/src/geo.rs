use std::net::IpAddr;

/// Best-effort geo lookup result. All fields None is a normal outcome, not
/// an error.
#[derive(Debug, Clone, Default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Pluggable IP → (country, region, city) resolver backed by an optional
/// MaxMind database.
///
/// The reader is opened once at process start and held for the process
/// lifetime. Running without a database is a supported mode: every public-IP
/// lookup then resolves to all-None. Failures inside the database are
/// swallowed the same way.
pub struct GeoResolver {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
}

impl GeoResolver {
    /// Open the database at `path`. An empty path, a missing file, or an
    /// unreadable database all degrade to the disabled resolver with a
    /// warning.
    pub fn open(path: &str) -> Self {
        if path.is_empty() {
            return Self::disabled();
        }
        if !std::path::Path::new(path).exists() {
            tracing::warn!(
                geoip_path = %path,
                "GeoIP database not found. Scans stored with NULL geo fields."
            );
            return Self::disabled();
        }
        let reader = std::fs::read(path)
            .ok()
            .and_then(|bytes| maxminddb::Reader::from_source(bytes).ok());
        if reader.is_none() {
            tracing::warn!(geoip_path = %path, "GeoIP database could not be opened");
        }
        Self { reader }
    }

    /// A resolver with no database. Used in tests and when `GEOIP_DB_PATH`
    /// is unset.
    pub fn disabled() -> Self {
        Self { reader: None }
    }

    /// Resolve an IP string. Private and loopback addresses short-circuit to
    /// `country = "Private"` without touching the database.
    pub fn resolve(&self, ip: &str) -> GeoInfo {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return GeoInfo::default();
        };
        if is_private_or_loopback(&addr) {
            return GeoInfo {
                country: Some("Private".to_string()),
                region: None,
                city: None,
            };
        }
        let Some(reader) = self.reader.as_ref() else {
            return GeoInfo::default();
        };
        lookup_city(reader, addr).unwrap_or_default()
    }
}

fn lookup_city(reader: &maxminddb::Reader<Vec<u8>>, addr: IpAddr) -> Option<GeoInfo> {
    let lookup = reader.lookup(addr).ok()?;
    let record = lookup.decode::<maxminddb::geoip2::City>().ok().flatten()?;

    let country = record
        .country
        .names
        .english
        .map(|s| s.to_string())
        .or_else(|| record.country.iso_code.map(|s| s.to_string()));
    let region = record
        .subdivisions
        .first()
        .and_then(|sub| sub.names.english)
        .map(|s| s.to_string());
    let city = record.city.names.english.map(|s| s.to_string());

    Some(GeoInfo {
        country,
        region,
        city,
    })
}

fn is_private_or_loopback(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            // fc00::/7 unique-local, fe80::/10 link-local
            v6.is_loopback() || (seg[0] & 0xfe00) == 0xfc00 || (seg[0] & 0xffc0) == 0xfe80
        }
    }
}
