//! The telemetry unit shipped to the collector.
//!
//! One [`Record`] describes a single outbound call. Field names follow the
//! collector's wire contract (`startedAt`, `requestHeaders`, ...). Header maps
//! hold a single value per name; multi-valued headers are collapsed to their
//! first value when the record is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle tag attached to every record emitted by the interceptor.
pub const REQUEST_END: &str = "REQUEST_END";

/// Header name → single header value.
pub type Headers = BTreeMap<String, String>;

/// A telemetry record describing one outbound HTTP call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// URL scheme (`"http"`, `"https"`).
    pub protocol: String,
    /// Request path.
    pub path: String,
    /// Target hostname without port.
    pub hostname: String,
    /// HTTP method.
    pub method: String,
    /// Milliseconds since the Unix epoch when the call started.
    pub started_at: i64,
    /// Milliseconds since the Unix epoch when the call returned.
    pub ended_at: i64,
    /// Lifecycle tag, see [`REQUEST_END`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Response status, `0` when no response was received.
    pub status_code: u16,
    /// Full request URL.
    pub url: String,
    pub request_headers: Headers,
    pub request_body: String,
    pub response_headers: Headers,
    pub response_body: String,
}

impl Record {
    /// Content type of the captured request, if any.
    pub fn request_content_type(&self) -> Option<&str> {
        header_value(&self.request_headers, "content-type")
    }

    /// Content type of the captured response, if any.
    pub fn response_content_type(&self) -> Option<&str> {
        header_value(&self.response_headers, "content-type")
    }
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
