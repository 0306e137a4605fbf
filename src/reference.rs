use std::fmt;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

static VIDEO_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("invalid video id regex"));

static EMBED_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:embed|v|shorts)/([a-zA-Z0-9_-]{11})").expect("invalid embed path regex")
});

// Tried in order against the trimmed input once structured parsing gives up
static FALLBACK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)([a-zA-Z0-9_-]{11})",
        r"^.*(?:youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid fallback regex"))
    .collect()
});

/// The reference could not be turned into a video ID
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReferenceError {
    #[error("URL or video ID is required")]
    Empty,

    #[error("could not extract video ID from: {0}")]
    Unrecognized(String),
}

/// A validated 11-character YouTube video ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Accept `candidate` only if it is exactly an 11-character ID
    pub fn parse(candidate: &str) -> Option<Self> {
        VIDEO_ID_PATTERN
            .is_match(candidate)
            .then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch page URL for this video
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for VideoId {
    type Error = InvalidReferenceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value).ok_or_else(|| InvalidReferenceError::Unrecognized(value.to_string()))
    }
}

type Strategy = fn(&str) -> Option<VideoId>;

/// Resolution strategies, cheapest first; the first hit wins
const STRATEGIES: &[(&str, Strategy)] = &[
    ("bare", bare_token),
    ("url", structured_url),
    ("pattern", pattern_fallback),
];

/// Resolve a video reference (watch/short/embed URL or bare ID) to its video ID
pub fn resolve(input: &str) -> Result<VideoId, InvalidReferenceError> {
    if input.is_empty() {
        return Err(InvalidReferenceError::Empty);
    }

    let input = input.trim();
    for (name, strategy) in STRATEGIES {
        if let Some(id) = strategy(input) {
            debug!("Resolved video ID {id} via {name} strategy");
            return Ok(id);
        }
    }

    Err(InvalidReferenceError::Unrecognized(input.to_string()))
}

fn bare_token(input: &str) -> Option<VideoId> {
    VideoId::parse(input)
}

fn structured_url(input: &str) -> Option<VideoId> {
    // Unparseable input is left to the pattern fallback
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?;

    if host.contains("youtube") {
        let from_query = url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .and_then(|(_, value)| VideoId::parse(&value));
        if from_query.is_some() {
            return from_query;
        }

        if let Some(caps) = EMBED_PATH_PATTERN.captures(url.path()) {
            return VideoId::parse(&caps[1]);
        }
    }

    if host == "youtu.be" {
        let segment = url.path_segments()?.next()?;
        return VideoId::parse(segment);
    }

    None
}

fn pattern_fallback(input: &str) -> Option<VideoId> {
    FALLBACK_PATTERNS.iter().find_map(|re| {
        let candidate = re.captures(input)?.get(1)?.as_str();
        if candidate.len() == 11 {
            VideoId::parse(candidate)
        } else {
            None
        }
    })
}
