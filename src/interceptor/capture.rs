//! Per-request capture and its conversion into a [`Record`].

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::record::{Headers, Record, REQUEST_END};

/// Everything observed about one outbound exchange.
///
/// Captures are owned by a single request until they are handed to the
/// telemetry queue.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: Method,
    pub uri: Uri,
    pub request_headers: HeaderMap,
    /// Copy of the request body, when one was sent.
    pub request_body: Option<Bytes>,
    pub started_at: i64,
    pub ended_at: i64,
    /// `None` when the transport returned an error.
    pub status: Option<StatusCode>,
    pub response_headers: HeaderMap,
    /// Copy of the response body, only kept for textual content types.
    pub response_body: Option<Bytes>,
}

impl Exchange {
    pub fn new(method: Method, uri: Uri, request_headers: HeaderMap) -> Self {
        let now = now_millis();
        Self {
            method,
            uri,
            request_headers,
            request_body: None,
            started_at: now,
            ended_at: now,
            status: None,
            response_headers: HeaderMap::new(),
            response_body: None,
        }
    }

    pub fn hostname(&self) -> String {
        hostname_of(&self.uri, &self.request_headers)
    }

    /// Build the raw, unsanitized record.
    pub fn into_record(self) -> Record {
        let hostname = self.hostname();
        let protocol = self.uri.scheme_str().unwrap_or("http").to_string();
        let url = if self.uri.scheme().is_some() {
            self.uri.to_string()
        } else {
            let path_and_query = self
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("{}://{}{}", protocol, hostname, path_and_query)
        };

        let request_body = textual_body(&self.request_headers, self.request_body.as_ref());
        let response_body = textual_body(&self.response_headers, self.response_body.as_ref());

        Record {
            protocol,
            path: self.uri.path().to_string(),
            hostname,
            method: self.method.to_string(),
            started_at: self.started_at,
            ended_at: self.ended_at.max(self.started_at),
            kind: REQUEST_END.to_string(),
            status_code: self.status.map(|s| s.as_u16()).unwrap_or(0),
            url,
            request_headers: collapse_headers(&self.request_headers),
            request_body,
            response_headers: collapse_headers(&self.response_headers),
            response_body,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Host the request is addressed to, without port or IPv6 brackets.
///
/// Falls back to the `Host` header for origin-form URIs.
pub fn hostname_of(uri: &Uri, headers: &HeaderMap) -> String {
    if let Some(host) = uri.host() {
        return host.trim_start_matches('[').trim_end_matches(']').to_string();
    }
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| strip_port(host).to_string())
        .unwrap_or_default()
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Collapse a header map to one value per name, keeping the first.
pub fn collapse_headers(headers: &HeaderMap) -> Headers {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

/// Whether bodies of this content type are worth capturing.
pub fn is_parseable_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    ["json", "text", "xml", "x-www-form-urlencoded"]
        .iter()
        .any(|token| content_type.contains(token))
}

/// The `Content-Type` header value, if present and valid UTF-8.
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn textual_body(headers: &HeaderMap, body: Option<&Bytes>) -> String {
    match (content_type(headers), body) {
        (Some(ct), Some(body)) if is_parseable_content_type(ct) => {
            String::from_utf8_lossy(body).into_owned()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn hostname_from_absolute_uri() {
        let uri: Uri = "https://api.example.com:8443/v1".parse().unwrap();
        assert_eq!(hostname_of(&uri, &HeaderMap::new()), "api.example.com");
    }

    #[test]
    fn hostname_strips_ipv6_brackets() {
        let uri: Uri = "http://[::1]:8080/".parse().unwrap();
        assert_eq!(hostname_of(&uri, &HeaderMap::new()), "::1");
    }

    #[test]
    fn hostname_falls_back_to_host_header() {
        let uri: Uri = "/v1/items".parse().unwrap();
        let map = headers(&[("host", "internal.local:9000")]);
        assert_eq!(hostname_of(&uri, &map), "internal.local");

        let map = headers(&[("host", "[fe80::1]:80")]);
        assert_eq!(hostname_of(&uri, &map), "fe80::1");

        assert_eq!(hostname_of(&uri, &HeaderMap::new()), "");
    }

    #[test]
    fn multi_valued_headers_keep_first_value() {
        let map = headers(&[
            ("accept", "application/json"),
            ("accept", "text/plain"),
            ("x-id", "1"),
        ]);
        let collapsed = collapse_headers(&map);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed["accept"], "application/json");
        assert_eq!(collapsed["x-id"], "1");
    }

    #[test]
    fn parseable_content_types() {
        assert!(is_parseable_content_type("application/json; charset=utf-8"));
        assert!(is_parseable_content_type("TEXT/HTML"));
        assert!(is_parseable_content_type("application/xml"));
        assert!(is_parseable_content_type("application/x-www-form-urlencoded"));
        assert!(is_parseable_content_type("application/vnd.api+json"));
        assert!(!is_parseable_content_type("image/png"));
        assert!(!is_parseable_content_type("application/octet-stream"));
    }

    #[test]
    fn record_from_completed_exchange() {
        let mut exchange = Exchange::new(
            Method::POST,
            "https://api.example.com/v1/charge?x=1".parse().unwrap(),
            headers(&[("content-type", "application/json")]),
        );
        exchange.request_body = Some(Bytes::from_static(br#"{"amount":1}"#));
        exchange.started_at = 1_000;
        exchange.ended_at = 1_250;
        exchange.status = Some(StatusCode::CREATED);
        exchange.response_headers = headers(&[("content-type", "text/plain")]);
        exchange.response_body = Some(Bytes::from_static(b"ok"));

        let record = exchange.into_record();
        assert_eq!(record.protocol, "https");
        assert_eq!(record.path, "/v1/charge");
        assert_eq!(record.hostname, "api.example.com");
        assert_eq!(record.method, "POST");
        assert_eq!(record.kind, "REQUEST_END");
        assert_eq!(record.status_code, 201);
        assert_eq!(record.started_at, 1_000);
        assert_eq!(record.ended_at, 1_250);
        assert_eq!(record.url, "https://api.example.com/v1/charge?x=1");
        assert_eq!(record.request_body, r#"{"amount":1}"#);
        assert_eq!(record.response_body, "ok");
    }

    #[test]
    fn failed_exchange_has_zero_status() {
        let record = Exchange::new(
            Method::GET,
            "http://down.example.com/".parse().unwrap(),
            HeaderMap::new(),
        )
        .into_record();
        assert_eq!(record.status_code, 0);
        assert!(record.response_headers.is_empty());
        assert!(record.response_body.is_empty());
    }

    #[test]
    fn each_body_uses_its_own_content_type() {
        let mut exchange = Exchange::new(
            Method::POST,
            "http://example.com/upload".parse().unwrap(),
            headers(&[("content-type", "application/octet-stream")]),
        );
        exchange.request_body = Some(Bytes::from_static(b"\x00\x01binary"));
        exchange.status = Some(StatusCode::OK);
        exchange.response_headers = headers(&[("content-type", "application/json")]);
        exchange.response_body = Some(Bytes::from_static(br#"{"id":7}"#));

        let record = exchange.into_record();
        assert_eq!(record.request_body, "");
        assert_eq!(record.response_body, r#"{"id":7}"#);
    }

    #[test]
    fn origin_form_uri_builds_url_from_host_header() {
        let record = Exchange::new(
            Method::GET,
            "/items?page=2".parse().unwrap(),
            headers(&[("host", "shop.local:8080")]),
        )
        .into_record();
        assert_eq!(record.hostname, "shop.local");
        assert_eq!(record.url, "http://shop.local/items?page=2");
    }
}
