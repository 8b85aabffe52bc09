use qrwizard_core::identity::matches_bot_keywords;

/// Parsed User-Agent fields, denormalized onto each scan event.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// OS family plus version, e.g. "Mac OSX 10.15".
    pub os: Option<String>,
    /// Browser family plus version, e.g. "Chrome 120.0".
    pub browser: Option<String>,
    /// One of: mobile, tablet, desktop, bot, other, unknown.
    pub device_type: String,
}

/// Two-tier bot classification: the keyword substring tier, then woothee's
/// `crawler` category. Either hit classifies as bot.
pub fn is_bot_user_agent(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    if matches_bot_keywords(user_agent) {
        return true;
    }
    woothee::parser::Parser::new()
        .parse(user_agent)
        .map(|r| r.category == "crawler")
        .unwrap_or(false)
}

/// Parse a User-Agent via `woothee`. Empty input yields the `unknown` device
/// type and no OS/browser.
pub fn parse_device(user_agent: &str) -> DeviceInfo {
    if user_agent.is_empty() {
        return DeviceInfo {
            device_type: "unknown".to_string(),
            ..Default::default()
        };
    }

    let Some(result) = woothee::parser::Parser::new().parse(user_agent) else {
        return DeviceInfo {
            device_type: "other".to_string(),
            ..Default::default()
        };
    };

    // iPads classify as smartphone in woothee, so the UA string check
    // supplements the category for those.
    let ua_lower = user_agent.to_lowercase();
    let device_type = match result.category {
        "tablet" => "tablet",
        "smartphone" | "mobilephone" => {
            if ua_lower.contains("ipad") || ua_lower.contains("tablet") {
                "tablet"
            } else {
                "mobile"
            }
        }
        "pc" => "desktop",
        "crawler" => "bot",
        "UNKNOWN" => "unknown",
        _ => "other",
    }
    .to_string();

    let os = join_family_version(result.os, result.os_version.as_ref());
    let browser = join_family_version(result.name, &result.version);

    DeviceInfo {
        os,
        browser,
        device_type,
    }
}

fn join_family_version(family: &str, version: &str) -> Option<String> {
    if family.is_empty() || family == "UNKNOWN" {
        return None;
    }
    if version.is_empty() || version == "UNKNOWN" {
        return Some(family.to_string());
    }
    Some(format!("{family} {version}"))
}
