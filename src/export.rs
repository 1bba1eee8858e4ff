// src/export.rs
//! Export captured records to interchange formats
//!
//! Supports:
//! - JSON (every record, as stored)
//! - HAR 1.2 (network records only)

use crate::interception::body::{CapturedBody, Headers};
use crate::interception::record::{CapturedEvent, NetworkRecord, RequestState};
use crate::utils::errors::{InspectorError, Result};
use crate::utils::time::format_millis;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON array of captured records
    Json,

    /// HAR (HTTP Archive) format
    Har,
}

impl FromStr for ExportFormat {
    type Err = InspectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "har" => Ok(ExportFormat::Har),
            other => Err(InspectorError::ExportFailed(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// Renders captured records
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export records to a string
    pub fn export(&self, events: &[CapturedEvent]) -> Result<String> {
        debug!("Exporting {} records to {:?} format", events.len(), self.format);

        match self.format {
            ExportFormat::Json => self.export_json(events),
            ExportFormat::Har => self.export_har(events),
        }
    }

    fn export_json(&self, events: &[CapturedEvent]) -> Result<String> {
        serde_json::to_string_pretty(events)
            .map_err(|e| InspectorError::ExportFailed(format!("JSON serialization error: {}", e)))
    }

    fn export_har(&self, events: &[CapturedEvent]) -> Result<String> {
        let har = HarDocument {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: "telemetry-inspector".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: events
                    .iter()
                    .filter_map(CapturedEvent::as_network)
                    .map(har_entry)
                    .collect(),
            },
        };

        serde_json::to_string_pretty(&har)
            .map_err(|e| InspectorError::ExportFailed(format!("HAR serialization error: {}", e)))
    }
}

fn har_entry(record: &NetworkRecord) -> HarEntry {
    let time = record.duration_ms.unwrap_or(0) as f64;
    let request_body = record.request.body.as_text();

    let response = match (&record.response, &record.error) {
        (Some(response), _) => HarResponse {
            status: response.status,
            status_text: response.status_text.clone(),
            http_version: HTTP_VERSION,
            headers: har_headers(&response.headers),
            content: HarContent {
                size: response.size as i64,
                mime_type: mime_type(&response.headers, &response.body),
                text: response.body.as_text(),
            },
            redirect_url: response.headers.get("location").cloned().unwrap_or_default(),
            headers_size: -1,
            body_size: response.size as i64,
        },
        (None, failure) => HarResponse {
            status: 0,
            status_text: failure
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_default(),
            http_version: HTTP_VERSION,
            headers: Vec::new(),
            content: HarContent {
                size: 0,
                mime_type: "x-unknown".to_string(),
                text: None,
            },
            redirect_url: String::new(),
            headers_size: -1,
            body_size: -1,
        },
    };

    HarEntry {
        started_date_time: format_millis(record.timestamp),
        time,
        request: HarRequest {
            method: record.request.method.clone(),
            url: record.request.url.clone(),
            http_version: HTTP_VERSION,
            headers: har_headers(&record.request.headers),
            query_string: query_string(&record.request.url),
            post_data: request_body.clone().map(|text| HarPostData {
                mime_type: mime_type(&record.request.headers, &record.request.body),
                text,
            }),
            headers_size: -1,
            body_size: request_body.map(|t| t.len() as i64).unwrap_or(0),
        },
        response,
        cache: HarCache {},
        timings: HarTimings {
            send: 0.0,
            wait: time,
            receive: 0.0,
        },
        from_cache: record.response.as_ref().map(|r| r.from_cache),
        state: record.state,
        error: record.error.as_ref().map(|f| f.message.clone()),
    }
}

const HTTP_VERSION: &str = "HTTP/1.1";

fn har_headers(headers: &Headers) -> Vec<HarNameValue> {
    headers
        .iter()
        .map(|(name, value)| HarNameValue {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn query_string(url: &str) -> Vec<HarNameValue> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            HarNameValue {
                name: name.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}

fn mime_type(headers: &Headers, body: &CapturedBody) -> String {
    if let Some(content_type) = headers.get("content-type") {
        return content_type.clone();
    }
    match body {
        CapturedBody::Json { .. } => "application/json".to_string(),
        CapturedBody::Text { .. } => "text/plain".to_string(),
        _ => "x-unknown".to_string(),
    }
}

// HAR format structures
#[derive(Serialize)]
struct HarDocument {
    log: HarLog,
}

#[derive(Serialize)]
struct HarLog {
    version: String,
    creator: HarCreator,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator {
    name: String,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: String,
    time: f64,
    request: HarRequest,
    response: HarResponse,
    cache: HarCache,
    timings: HarTimings,

    #[serde(rename = "_fromCache", skip_serializing_if = "Option::is_none")]
    from_cache: Option<bool>,

    #[serde(rename = "_state")]
    state: RequestState,

    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    http_version: &'static str,
    headers: Vec<HarNameValue>,
    query_string: Vec<HarNameValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_data: Option<HarPostData>,
    headers_size: i64,
    body_size: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse {
    status: u16,
    status_text: String,
    http_version: &'static str,
    headers: Vec<HarNameValue>,
    content: HarContent,
    #[serde(rename = "redirectURL")]
    redirect_url: String,
    headers_size: i64,
    body_size: i64,
}

#[derive(Serialize)]
struct HarNameValue {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarPostData {
    mime_type: String,
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarContent {
    size: i64,
    mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct HarCache {}

#[derive(Serialize)]
struct HarTimings {
    send: f64,
    wait: f64,
    receive: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::body::normalize_headers;
    use crate::interception::record::{
        FailureInfo, FailureKind, LogLevel, LogRecord, RequestInfo, ResponseInfo,
    };

    fn resolved() -> CapturedEvent {
        let mut request = RequestInfo::new("post", "https://api.test/search?q=rust&page=2");
        request.headers = normalize_headers([("Content-Type", "application/json")]);
        request.body = CapturedBody::Json {
            value: serde_json::json!({"q": "rust"}),
        };
        let mut record = NetworkRecord::begin("c1", 1_700_000_000_000, request);
        record.resolve(
            ResponseInfo {
                status: 201,
                status_text: "Created".to_string(),
                headers: normalize_headers([("content-type", "application/json")]),
                body: CapturedBody::Text {
                    text: "{\"ok\":true}".to_string(),
                },
                size: 11,
                from_cache: false,
            },
            42,
        );
        CapturedEvent::Fetch(record)
    }

    fn failed() -> CapturedEvent {
        let mut record = NetworkRecord::begin("c2", 1_700_000_000_500, RequestInfo::new("get", "/down"));
        record.fail(FailureInfo::new(FailureKind::Timeout, "Request timed out"), 3_000);
        CapturedEvent::Xhr(record)
    }

    fn log() -> CapturedEvent {
        CapturedEvent::Log(LogRecord {
            id: "l1".to_string(),
            timestamp: 0,
            level: LogLevel::Info,
            args: vec![],
            message: "hello".to_string(),
        })
    }

    #[test]
    fn test_json_export() {
        let json = Exporter::new(ExportFormat::Json)
            .export(&[resolved(), log()])
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["type"], "fetch");
        assert_eq!(parsed[1]["type"], "log");
    }

    #[test]
    fn test_har_export_uses_record_fields() {
        let har = Exporter::new(ExportFormat::Har)
            .export(&[resolved(), log(), failed()])
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&har).unwrap();

        let entries = parsed["log"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(parsed["log"]["version"], "1.2");

        let ok = &entries[0];
        assert_eq!(ok["request"]["method"], "POST");
        assert_eq!(ok["request"]["queryString"][0]["name"], "q");
        assert_eq!(ok["request"]["queryString"][1]["value"], "2");
        assert_eq!(ok["request"]["postData"]["mimeType"], "application/json");
        assert_eq!(ok["response"]["status"], 201);
        assert_eq!(ok["response"]["content"]["size"], 11);
        assert_eq!(ok["time"], 42.0);
        assert_eq!(ok["_state"], "resolved");

        let err = &entries[1];
        assert_eq!(err["response"]["status"], 0);
        assert_eq!(err["_error"], "Request timed out");
        assert_eq!(err["_state"], "failed");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("HAR".parse::<ExportFormat>().unwrap(), ExportFormat::Har);
        assert!("junit".parse::<ExportFormat>().is_err());
    }
}
