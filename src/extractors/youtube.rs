use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use url::Url;

use crate::PipelineError;

/// Length of every YouTube video ID
pub const VIDEO_ID_LEN: usize = 11;

const CANONICAL_PREFIX: &str = "https://www.youtube.com/watch?v=";

// Searched anywhere in the input, so links pasted inside text or brackets match
static SHORT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:youtu\.be)/([A-Za-z0-9_-]+)").expect("valid regex"));

static WATCH_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:youtube\.com)/watch\?([^#\s]*)").expect("valid regex"));

static V_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|&)v=([A-Za-z0-9_-]+)").expect("valid regex"));

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"));

/// A candidate producer: returns the raw ID it found, if any
type Strategy = fn(&str) -> Option<String>;

/// Tried in order; the first one that yields a candidate decides the outcome.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("short-link", from_short_link),
    ("watch-link", from_watch_link),
    ("query-parameter", from_query_parameter),
];

/// Normalized identity of a YouTube video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalVideoRef {
    id: String,
}

impl CanonicalVideoRef {
    /// The 11-character video ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical watch URL, `https://www.youtube.com/watch?v=<id>`
    pub fn url(&self) -> String {
        format!("{}{}", CANONICAL_PREFIX, self.id)
    }
}

impl fmt::Display for CanonicalVideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CANONICAL_PREFIX, self.id)
    }
}

impl Serialize for CanonicalVideoRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalize any supported YouTube URL form into its canonical reference.
///
/// Accepted forms include `youtu.be/<id>`, `youtube.com/watch?v=<id>` with or
/// without scheme, `www.` or `m.` prefixes and extra query parameters. All
/// parameters other than the video ID are dropped.
pub fn normalize(raw: &str) -> Result<CanonicalVideoRef, PipelineError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(PipelineError::InvalidUrl("URL must be a non-empty string".to_string()));
    }

    let (strategy, candidate) = STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(input).map(|candidate| (*name, candidate)))
        .ok_or_else(|| PipelineError::InvalidUrl(format!("Could not extract video ID from URL: {}", input)))?;

    if !VIDEO_ID.is_match(&candidate) {
        return Err(PipelineError::InvalidUrl(format!(
            "Invalid YouTube video ID format: {}",
            candidate
        )));
    }

    tracing::debug!("Extracted video ID {} via {} strategy", candidate, strategy);
    Ok(CanonicalVideoRef { id: candidate })
}

/// Same as [`normalize`], for callers whose input field may be absent
pub fn normalize_optional(raw: Option<&str>) -> Result<CanonicalVideoRef, PipelineError> {
    match raw {
        Some(raw) => normalize(raw),
        None => Err(PipelineError::InvalidUrl("URL must be a non-empty string".to_string())),
    }
}

/// Extract only the 11-character video ID
pub fn extract_video_id(raw: &str) -> Result<String, PipelineError> {
    normalize(raw).map(|video| video.id)
}

/// Check whether the input is a URL we can normalize
pub fn is_valid_video_url(raw: &str) -> bool {
    normalize(raw).is_ok()
}

fn from_short_link(input: &str) -> Option<String> {
    SHORT_LINK.captures(input).map(|caps| caps[1].to_string())
}

/// The last well-formed `v` value of the watch query wins; with none, the
/// first value is the candidate, so the caller reports it as malformed.
fn from_watch_link(input: &str) -> Option<String> {
    let query = WATCH_QUERY.captures(input)?.get(1)?.as_str();
    let values: Vec<&str> = V_PARAM
        .captures_iter(query)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    values
        .iter()
        .rev()
        .find(|value| VIDEO_ID.is_match(value))
        .or_else(|| values.first())
        .map(|value| value.to_string())
}

fn from_query_parameter(input: &str) -> Option<String> {
    let parsed = Url::parse(input).ok()?;
    if !parsed.host_str()?.to_ascii_lowercase().contains("youtube.com") {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| value.chars().count() == VIDEO_ID_LEN)
}
