use url::Url;

use crate::error::CoreError;
use crate::model::Link;

/// Validate an absolute http(s) URL with a hostname.
pub fn valid_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Append query pairs to `url`, skipping any key the URL already carries.
///
/// Existing parameters are preserved verbatim (including multi-valued keys);
/// operators may pre-tag destinations and those values must never be
/// clobbered.
pub fn append_params_if_absent(
    raw: &str,
    params: &[(&str, &str)],
) -> Result<String, CoreError> {
    let mut parsed = Url::parse(raw)?;
    let existing: Vec<String> = parsed
        .query_pairs()
        .map(|(k, _)| k.into_owned())
        .collect();
    let missing: Vec<&(&str, &str)> = params
        .iter()
        .filter(|(k, _)| !existing.iter().any(|e| e == k))
        .collect();
    if missing.is_empty() {
        return Ok(parsed.into());
    }
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in missing {
            pairs.append_pair(key, value);
        }
    }
    Ok(parsed.into())
}

/// Compose the final redirect target for a link: UTM merge (when enabled)
/// followed by the tracking parameter, each without overwriting anything the
/// destination already carries.
pub fn build_redirect_url(link: &Link, tracking_param: &str) -> Result<String, CoreError> {
    let mut target = link.destination_url.clone();

    if link.auto_append_utm {
        let utm = link.utm_pairs();
        if !utm.is_empty() {
            target = append_params_if_absent(&target, &utm)?;
        }
    }

    if !tracking_param.is_empty() {
        target = append_params_if_absent(&target, &[(tracking_param, &link.slug)])?;
    }

    Ok(target)
}
