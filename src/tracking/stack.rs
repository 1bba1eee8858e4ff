// src/tracking/stack.rs
//! Stack trace parsing
//!
//! Two frame formats are recognised:
//!
//! ```text
//! V8:          at handleClick (https://app.test/main.js:10:5)
//!              at https://app.test/main.js:10:5
//! Gecko/WebKit: handleClick@https://app.test/main.js:10:5
//! ```
//!
//! Lines that match neither (the `Error: message` header, native frames)
//! are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static V8_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*at\s+(?:(?:async\s+)?(.+?)\s+\()?(.+?):(\d+):(\d+)\)?\s*$")
        .expect("valid V8 frame pattern")
});

static GECKO_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:([^@]*)@)?(.+?):(\d+):(\d+)\s*$").expect("valid Gecko frame pattern")
});

/// One parsed frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    /// File without query string or fragment
    pub fn file_path(&self) -> &str {
        let end = self.file.find(['?', '#']).unwrap_or(self.file.len());
        &self.file[..end]
    }
}

/// Parse every recognisable frame, innermost first
pub fn parse_stack(stack: &str) -> Vec<StackFrame> {
    stack.lines().filter_map(parse_frame).collect()
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let caps = if trimmed.starts_with("at ") {
        V8_FRAME.captures(trimmed)?
    } else if trimmed.contains('@') || !trimmed.contains(' ') {
        GECKO_FRAME.captures(trimmed)?
    } else {
        return None;
    };

    let function = caps
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|f| !f.is_empty() && *f != "<anonymous>")
        .map(str::to_string);

    Some(StackFrame {
        function,
        file: caps.get(2)?.as_str().to_string(),
        line: caps.get(3)?.as_str().parse().ok()?,
        column: caps.get(4)?.as_str().parse().ok()?,
    })
}
