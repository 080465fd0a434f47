//! URL validation and platform inference
//!
//! Pure string inspection: no network access, no parsing failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a URL was rejected before any download work started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Please enter a valid URL")]
    Empty,

    #[error("Please enter a valid video URL")]
    NotHttp,
}

/// Source platform inferred from the URL host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
    Facebook,
    Twitter,
    Unknown,
}

/// Domain allow-list, checked in order.
const PLATFORM_DOMAINS: [(&str, Platform); 7] = [
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("instagram.com", Platform::Instagram),
    ("tiktok.com", Platform::TikTok),
    ("facebook.com", Platform::Facebook),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
];

impl Platform {
    /// Tag stored in the catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts trimmed, non-empty input starting with `http://` or `https://`.
pub fn is_valid_url(input: &str) -> bool {
    validate_url(input).is_ok()
}

/// Like [`is_valid_url`], but says which rule failed. Returns the trimmed URL.
pub fn validate_url(input: &str) -> Result<&str, UrlError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(UrlError::Empty);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(UrlError::NotHttp)
    }
}

/// Infer the platform, case-insensitively.
///
/// The host is checked first: a domain matches the host itself or any
/// subdomain of it. Otherwise the first domain found anywhere in the URL
/// wins, which catches redirect links carrying the video URL as a query.
pub fn infer_platform(url: &str) -> Platform {
    let host = host_of(url);
    let by_host = PLATFORM_DOMAINS.iter().find(|(domain, _)| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    });
    let lower = url.to_lowercase();
    by_host
        .or_else(|| PLATFORM_DOMAINS.iter().find(|(domain, _)| lower.contains(domain)))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unknown)
}

/// True when the URL belongs to one of the known platforms.
pub fn is_supported_platform(url: &str) -> bool {
    infer_platform(url) != Platform::Unknown
}

/// Lowercased host part, without scheme, credentials, port or path.
fn host_of(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let rest = lower.split_once("://").map_or(lower.as_str(), |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or(authority);
    host.split(':').next().unwrap_or(host).to_string()
}
