//! Source keys for remote posts.
//!
//! A source key is the post shortcode. It is parsed from any of the
//! supported post URL shapes or accepted as a bare shortcode:
//! - https://www.instagram.com/p/SHORTCODE/
//! - https://instagram.com/reel/SHORTCODE
//! - https://www.instagram.com/reels/SHORTCODE/?igsh=...
//! - https://www.instagram.com/tv/SHORTCODE
//! - instagram.com/p/SHORTCODE (scheme omitted)
//! - SHORTCODE

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Path prefixes that precede a shortcode in a post URL.
const POST_PATH_KINDS: &[&str] = &["p", "reel", "reels", "tv"];

/// Errors that can occur while parsing a source key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceKeyError {
    #[error("Source is empty")]
    Empty,

    #[error("URL is not an Instagram post URL")]
    UnsupportedHost,

    #[error("Shortcode not found in URL")]
    ShortcodeNotFound,

    #[error("Shortcode has invalid format: {0}")]
    InvalidShortcode(String),
}

/// Normalized identifier of a remote post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    /// Parse a post URL or bare shortcode.
    pub fn parse(input: &str) -> Result<Self, SourceKeyError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceKeyError::Empty);
        }

        if !input.contains('/') && !input.contains('.') {
            return Self::from_shortcode(input);
        }

        let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&with_scheme).map_err(|_| SourceKeyError::UnsupportedHost)?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host != "instagram.com" && !host.ends_with(".instagram.com") {
            return Err(SourceKeyError::UnsupportedHost);
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // Profile-scoped URLs look like /<user>/p/<code>/
        segments
            .windows(2)
            .find(|pair| POST_PATH_KINDS.contains(&pair[0]))
            .map(|pair| Self::from_shortcode(pair[1]))
            .unwrap_or(Err(SourceKeyError::ShortcodeNotFound))
    }

    /// Validate a bare shortcode.
    pub fn from_shortcode(code: &str) -> Result<Self, SourceKeyError> {
        let valid = !code.is_empty()
            && code.len() <= 64
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(code.to_string()))
        } else {
            Err(SourceKeyError::InvalidShortcode(code.to_string()))
        }
    }

    /// Get the shortcode.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical post URL for the downloader.
    pub fn post_url(&self) -> String {
        format!("https://www.instagram.com/p/{}/", self.0)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
