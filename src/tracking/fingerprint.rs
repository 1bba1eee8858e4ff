// src/tracking/fingerprint.rs
//! Message normalization and fingerprints

use crate::tracking::stack::StackFrame;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:https?|wss?|file)://[^\s'"`]+"#).expect("valid URL pattern"));

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("valid UUID pattern")
});

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("valid quoted-string pattern"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number pattern"));

/// Where an error was raised when no stack frame is available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Replace dynamic values so messages that differ only by them compare equal
///
/// URLs, UUIDs, quoted literals and numbers are replaced, in that order.
pub fn normalize_message(message: &str) -> String {
    let out = URL.replace_all(message, "<url>");
    let out = UUID.replace_all(&out, "<uuid>");
    let out = QUOTED.replace_all(&out, "<str>");
    let out = NUMBER.replace_all(&out, "<n>");
    out.trim().to_string()
}

/// Grouping key: `type|normalized message|top file|top function`
///
/// Without a parsed frame the source location stands in for file and
/// function.
pub fn fingerprint(
    error_type: &str,
    message: &str,
    frames: &[StackFrame],
    source: Option<&SourceLocation>,
) -> String {
    let normalized = normalize_message(message);
    match frames.first() {
        Some(top) => format!(
            "{}|{}|{}|{}",
            error_type,
            normalized,
            top.file_path(),
            top.function.as_deref().unwrap_or("<anonymous>")
        ),
        None => {
            let locator = source
                .map(|s| format!("{}:{}", s.file, s.line))
                .unwrap_or_else(|| "<unknown>".to_string());
            format!("{}|{}|{}", error_type, normalized, locator)
        }
    }
}
