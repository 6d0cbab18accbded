//! Canonical channel-identifier functions
//!
//! Maps raw channel references (URLs, paths, bare handles) to a canonical
//! lowercase identifier. All blocked-channel membership tests compare
//! canonical forms, so a leading `@` or mixed case is never significant.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Channel URL pattern: `/@handle`, `/channel/UCxxx`, `/c/name`,
/// with an optional subpage segment.
static CHANNEL_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(@[\w.-]+|channel/[\w-]+|c/[\w-]+)(/[\w-]*)?$").unwrap()
});

/// Bare handle, with or without the leading `@`.
static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@?([\w.-]+)$").unwrap());

/// Extract a channel identifier from a URL path or full URL.
///
/// Returns the normalized lowercase identifier (`@handle` or a raw channel
/// id) or `None` if the input is not a channel reference. Full URLs on a
/// foreign host are rejected.
pub fn extract_channel_from_url(url_or_path: &str) -> Option<String> {
    let pathname = if url_or_path.starts_with("http") {
        match Url::parse(url_or_path) {
            Ok(parsed) => {
                if !parsed.host_str().is_some_and(|h| h.contains("youtube.com")) {
                    return None;
                }
                parsed.path().to_string()
            }
            // Unparseable, treat as direct input
            Err(_) => with_leading_slash(url_or_path),
        }
    } else {
        with_leading_slash(url_or_path)
    };

    let Some(caps) = CHANNEL_URL_RE.captures(&pathname) else {
        // Not a channel path; maybe a bare handle like "@MrBeast" or "MrBeast"
        return HANDLE_RE
            .captures(url_or_path)
            .map(|caps| format!("@{}", caps[1].to_lowercase()));
    };

    let channel_part = &caps[1];
    if channel_part.starts_with('@') {
        Some(channel_part.to_lowercase())
    } else if let Some(id) = channel_part.strip_prefix("channel/") {
        Some(id.to_lowercase())
    } else {
        channel_part.strip_prefix("c/").map(str::to_lowercase)
    }
}

/// Normalize a channel identifier for comparison: strip the `@` prefix and
/// lowercase.
pub fn normalize_channel_id(channel_id: &str) -> String {
    channel_id.trim_start_matches('@').to_lowercase()
}

/// Check whether two channel identifiers refer to the same channel.
pub fn channel_ids_match(id1: &str, id2: &str) -> bool {
    normalize_channel_id(id1) == normalize_channel_id(id2)
}

/// Check whether a URL path is a channel page.
pub fn is_channel_page(pathname: &str) -> bool {
    CHANNEL_URL_RE.is_match(pathname)
}

fn with_leading_slash(input: &str) -> String {
    if input.starts_with('/') {
        input.to_string()
    } else {
        format!("/{}", input)
    }
}
