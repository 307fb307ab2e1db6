//! Utility functions for torrss
//!
//! Small helpers shared by the pipeline: human-readable sizes for logs, site
//! label derivation from URLs, and cookie header reconstruction.

use regex::Regex;
use std::sync::LazyLock;

/// Well-known tracker hosts and their short labels
const SITE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("chdbits", "chd"),
    ("pterclub", "pter"),
    ("audiences", "aud"),
    ("lemonhd", "lhd"),
    ("keepfrds", "frds"),
    ("ourbits", "ob"),
    ("springsunday", "ssd"),
    ("totheglory", "ttg"),
    ("m-team", "mt"),
];

static TTG_DETAIL_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"t/([0-9]+)").unwrap()
});

static DETAIL_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"id=([0-9]+)").unwrap()
});

/// Format a byte count for log output, e.g. `1.5 GB`
///
/// Negative values (a budget that went below zero) keep their sign.
pub fn human_size(bytes: i64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs() as f64;

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let exp = (magnitude.log(1024.0).floor() as usize).min(UNITS.len() - 1);
    let scaled = magnitude / 1024f64.powi(exp as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{sign}{rounded} {}", UNITS[exp])
}

/// Derive the site label from a URL's host
///
/// `example.org` → `example`, `pt.example.org` → `example`; anything with
/// fewer than two or more than three labels yields an empty string.
pub fn site_name(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    match labels.len() {
        2 => labels[0].to_string(),
        3 => labels[1].to_string(),
        _ => String::new(),
    }
}

/// Short label for a site, falling back to the full site name
pub fn site_abbreviation(url: &str) -> String {
    let site = site_name(url);
    SITE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == site)
        .map(|(_, abbrev)| abbrev.to_string())
        .unwrap_or(site)
}

/// Build the site id string used as the client save path
///
/// Format: `<abbrev>_<detail id>[_<imdb id>]`. The detail id comes from
/// `t/<n>` on totheglory and from `id=<n>` everywhere else.
pub fn site_id(detail_link: &str, imdb_id: Option<&str>) -> String {
    let abbrev = site_abbreviation(detail_link);
    let pattern = if abbrev == "ttg" || abbrev == "totheglory" {
        &*TTG_DETAIL_ID
    } else {
        &*DETAIL_ID
    };
    let mut id = pattern
        .captures(detail_link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    if let Some(imdb) = imdb_id.filter(|s| !s.is_empty()) {
        id.push('_');
        id.push_str(imdb);
    }
    format!("{abbrev}_{id}")
}

/// Whether a download link carries the credentials trackers need to serve the
/// torrent file
///
/// The client accepts any URL and only fails later in the background, so links
/// without a passkey or download hash are refused up front.
pub fn is_valid_download_link(link: &str) -> bool {
    const MARKERS: [&str; 5] = [
        "passkey",
        "downhash",
        "totheglory.im/dl/",
        "totheglory.im/rssdd.php",
        "download.php?hash=",
    ];
    MARKERS.iter().any(|marker| link.contains(marker))
}

/// Rebuild a `Cookie` header value from a stored cookie string
///
/// Accepts `k=v; k2=v2` as pasted from a browser. Attributes such as `path`
/// or `expires`, empty pairs and stray whitespace are dropped.
pub fn cookie_header(raw: &str) -> String {
    const ATTRIBUTES: [&str; 7] = [
        "path", "domain", "expires", "max-age", "secure", "httponly", "samesite",
    ];
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() || ATTRIBUTES.contains(&name.to_ascii_lowercase().as_str()) {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some(format!("{name}={value}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
