use std::net::IpAddr;

use ipnet::{Ipv4Net, Ipv6Net};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Slug alphabet: digits minus 0/1, ASCII letters minus I/l/O.
/// 58 symbols ^ 7 chars ≈ 2.2e12 — collisions are handled by re-rolling
/// against the store, not probabilistically.
pub const SLUG_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
pub const SLUG_LEN: usize = 7;

/// UA prefix length folded into the visitor fingerprint.
const FINGERPRINT_UA_CHARS: usize = 300;

/// Lowercased substrings that classify a User-Agent as a bot without
/// consulting the structured parser.
pub const BOT_KEYWORDS: [&str; 7] = [
    "bot",
    "spider",
    "crawler",
    "preview",
    "headless",
    "monitor",
    "httpclient",
];

/// Draw a random slug candidate. Uniqueness is enforced by the caller
/// (the store re-rolls on collision).
pub fn random_slug() -> String {
    let mut rng = rand::thread_rng();
    (0..SLUG_LEN)
        .map(|_| SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())] as char)
        .collect()
}

/// Truncate an IP to its network: /24 for IPv4, /48 for IPv6.
///
/// Returns the `network/prefix` rendering (e.g. `203.0.113.0/24`), or `None`
/// when the input does not parse as an IP address.
pub fn anonymize_ip(ip: &str) -> Option<String> {
    match ip.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let net = Ipv4Net::new(v4, 24).ok()?.trunc();
            Some(format!("{}/{}", net.network(), net.prefix_len()))
        }
        IpAddr::V6(v6) => {
            let net = Ipv6Net::new(v6, 48).ok()?.trunc();
            Some(format!("{}/{}", net.network(), net.prefix_len()))
        }
    }
}

/// Salted hash over the anonymized network: `sha256(salt || "::" || network)`
/// as lowercase hex. Deterministic for a fixed salt; changes iff the /24
/// (v4) or /48 (v6) network changes.
pub fn ip_hash(salt: &str, ip: &str) -> Option<String> {
    let anon = anonymize_ip(ip)?;
    let digest = Sha256::digest(format!("{salt}::{anon}").as_bytes());
    Some(hex::encode(digest))
}

/// Visitor fingerprint: `sha256(ip_hash | "|" | lower(ua[..300]))`.
///
/// Returns `None` when both inputs are absent — such scans are never counted
/// unique or duplicate.
pub fn visitor_fingerprint(ip_hash: Option<&str>, user_agent: Option<&str>) -> Option<String> {
    let normalized_ua: String = user_agent
        .unwrap_or("")
        .chars()
        .take(FINGERPRINT_UA_CHARS)
        .collect::<String>()
        .to_lowercase();
    let ip_h = ip_hash.unwrap_or("");
    if ip_h.is_empty() && normalized_ua.is_empty() {
        return None;
    }
    let digest = Sha256::digest(format!("{ip_h}|{normalized_ua}").as_bytes());
    Some(hex::encode(digest))
}

/// Keyword tier of bot detection: substring match on the lowercased UA.
/// The structured-parser tier lives in the server's device module.
pub fn matches_bot_keywords(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    BOT_KEYWORDS.iter().any(|kw| ua.contains(kw))
}
