// src/interception/body.rs
//! Body capture and response heuristics
//!
//! Capturing never fails: anything that cannot be read or is too large is
//! replaced by a descriptive placeholder.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header map with lower-cased names
pub type Headers = BTreeMap<String, String>;

/// Build a [`Headers`] map, lower-casing names
pub fn normalize_headers<I, K, V>(headers: I) -> Headers
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
        .collect()
}

/// Request or response body as seen by a hook
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Binary(Bytes),
    Form(Vec<(String, String)>),
    /// Streaming body that cannot be read without consuming it
    Stream,
    /// The body was already read by someone else
    Consumed,
    /// Reading failed
    Unreadable(String),
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

/// Stored form of a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapturedBody {
    Empty,
    Text { text: String },
    Json { value: serde_json::Value },
    Placeholder {
        description: String,
        /// Original size where known (characters for text, bytes otherwise)
        size: Option<u64>,
    },
}

impl CapturedBody {
    fn placeholder(description: String, size: Option<u64>) -> Self {
        CapturedBody::Placeholder { description, size }
    }

    /// Byte length of the captured content
    ///
    /// Placeholders report the original size when it is known.
    pub fn size(&self) -> u64 {
        match self {
            CapturedBody::Empty => 0,
            CapturedBody::Text { text } => text.len() as u64,
            CapturedBody::Json { value } => value.to_string().len() as u64,
            CapturedBody::Placeholder { size, .. } => size.unwrap_or(0),
        }
    }

    /// Text rendering used by exports
    pub fn as_text(&self) -> Option<String> {
        match self {
            CapturedBody::Empty => None,
            CapturedBody::Text { text } => Some(text.clone()),
            CapturedBody::Json { value } => Some(value.to_string()),
            CapturedBody::Placeholder { description, .. } => Some(description.clone()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, CapturedBody::Placeholder { .. })
    }
}

/// Convert a body into its stored form
pub fn sanitize_body(body: &Body, max_chars: usize) -> CapturedBody {
    match body {
        Body::Empty => CapturedBody::Empty,
        Body::Text(text) => cap_text(text, max_chars)
            .unwrap_or_else(|| CapturedBody::Text { text: text.clone() }),
        Body::Json(value) => {
            let rendered = value.to_string();
            cap_text(&rendered, max_chars).unwrap_or_else(|| CapturedBody::Json {
                value: value.clone(),
            })
        }
        Body::Form(pairs) => {
            let text = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            cap_text(&text, max_chars).unwrap_or(CapturedBody::Text { text })
        }
        Body::Binary(bytes) => CapturedBody::placeholder(
            format!("[Binary data: {} bytes]", bytes.len()),
            Some(bytes.len() as u64),
        ),
        Body::Stream => CapturedBody::placeholder("[Stream body]".to_string(), None),
        Body::Consumed => CapturedBody::placeholder("[Body already consumed]".to_string(), None),
        Body::Unreadable(reason) => {
            CapturedBody::placeholder(format!("[Unreadable body: {}]", reason), None)
        }
    }
}

fn cap_text(text: &str, max_chars: usize) -> Option<CapturedBody> {
    let chars = text.chars().count();
    (chars > max_chars).then(|| {
        CapturedBody::placeholder(
            format!("[Body too large: {} characters]", chars),
            Some(text.len() as u64),
        )
    })
}

/// Declared `content-length`, if it parses
pub fn content_length(headers: &Headers) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.trim().parse().ok())
}

/// Response size: declared content-length, else the captured body length
pub fn response_size(headers: &Headers, body: &CapturedBody) -> u64 {
    content_length(headers).unwrap_or_else(|| body.size())
}

/// Best-effort guess whether a response came from a cache
///
/// An environment-provided `cache_status` wins. Otherwise a response faster
/// than `threshold_ms`, or one carrying caching headers, counts as cached.
/// This is an approximation, not a guarantee.
pub fn is_probably_cached(
    duration_ms: u64,
    headers: &Headers,
    threshold_ms: u64,
    cache_status: Option<bool>,
) -> bool {
    if let Some(status) = cache_status {
        return status;
    }
    if duration_ms < threshold_ms {
        return true;
    }

    let hit = |name: &str| {
        headers
            .get(name)
            .map(|v| {
                v.split(|c: char| !c.is_ascii_alphanumeric())
                    .any(|token| token.eq_ignore_ascii_case("hit"))
            })
            .unwrap_or(false)
    };

    hit("x-cache")
        || hit("cf-cache-status")
        || headers.contains_key("age")
        || headers.contains_key("x-from-cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_under_cap_is_kept() {
        let captured = sanitize_body(&Body::from("hello"), 10);
        assert_eq!(captured, CapturedBody::Text { text: "hello".to_string() });
    }

    #[test]
    fn test_oversized_text_becomes_placeholder() {
        let body = Body::Text("x".repeat(10_001));
        let captured = sanitize_body(&body, 10_000);
        assert_eq!(
            captured,
            CapturedBody::Placeholder {
                description: "[Body too large: 10001 characters]".to_string(),
                size: Some(10_001),
            }
        );
    }

    #[test]
    fn test_binary_reports_byte_length() {
        let captured = sanitize_body(&Body::Binary(Bytes::from(vec![0u8; 2048])), 10);
        assert_eq!(captured.as_text().as_deref(), Some("[Binary data: 2048 bytes]"));
        assert_eq!(captured.size(), 2048);
    }

    #[test]
    fn test_unreadable_bodies() {
        assert!(sanitize_body(&Body::Consumed, 10).is_placeholder());
        assert!(sanitize_body(&Body::Stream, 10).is_placeholder());
        assert_eq!(
            sanitize_body(&Body::Unreadable("decode error".into()), 10).as_text().as_deref(),
            Some("[Unreadable body: decode error]")
        );
    }

    #[test]
    fn test_form_body() {
        let body = Body::Form(vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
        assert_eq!(sanitize_body(&body, 100).as_text().as_deref(), Some("a=1&b=2"));
    }

    #[test]
    fn test_size_prefers_content_length() {
        let body = CapturedBody::Text { text: "abc".to_string() };
        let headers = normalize_headers([("Content-Length", "512")]);
        assert_eq!(response_size(&headers, &body), 512);
        assert_eq!(response_size(&Headers::new(), &body), 3);

        let bad = normalize_headers([("content-length", "lots")]);
        assert_eq!(response_size(&bad, &body), 3);
    }

    #[test]
    fn test_cache_heuristic() {
        let none = Headers::new();
        assert!(is_probably_cached(2, &none, 5, None));
        assert!(!is_probably_cached(50, &none, 5, None));

        let hit = normalize_headers([("X-Cache", "HIT from edge")]);
        assert!(is_probably_cached(50, &hit, 5, None));

        let age = normalize_headers([("age", "30")]);
        assert!(is_probably_cached(50, &age, 5, None));

        let miss = normalize_headers([("cf-cache-status", "MISS")]);
        assert!(!is_probably_cached(50, &miss, 5, None));
    }

    #[test]
    fn test_cache_header_matches_whole_tokens() {
        for value in ["white", "chit-chat", "MISS, WHITELISTED"] {
            let headers = normalize_headers([("x-cache", value)]);
            assert!(!is_probably_cached(50, &headers, 5, None), "{}", value);
        }
        for value in ["HIT, MISS", "TCP_HIT", "Hit from cloudfront"] {
            let headers = normalize_headers([("x-cache", value)]);
            assert!(is_probably_cached(50, &headers, 5, None), "{}", value);
        }
    }

    #[test]
    fn test_environment_signal_overrides_heuristic() {
        let hit = normalize_headers([("x-cache", "hit")]);
        assert!(!is_probably_cached(1, &hit, 5, Some(false)));
        assert!(is_probably_cached(500, &Headers::new(), 5, Some(true)));
    }
}
