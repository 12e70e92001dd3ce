//! Record redaction.
//!
//! The [`Sanitizer`] scrubs a [`Record`] in a fixed order:
//!
//! 1. request and response headers,
//! 2. the URL and path (substring pass first, then the query is re-parsed),
//! 3. request and response bodies declared as exactly `application/json`.
//!
//! Only a URL that no longer parses after the substring pass is an error. JSON
//! bodies that are not objects are left as they are.

pub mod patterns;

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use url::Url;

use crate::error::Result;
use crate::record::{Headers, Record};

pub use patterns::SensitivePatterns;

const JSON_CONTENT_TYPE: &str = "application/json";

/// How far JSON body redaction descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonDepth {
    /// Only top-level entries of an object body.
    #[default]
    Shallow,
    /// Nested objects and arrays as well.
    Recursive,
}

/// Redacts sensitive content from records before they leave the process.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    patterns: SensitivePatterns,
    depth: JsonDepth,
}

impl Sanitizer {
    /// A sanitizer using `patterns` with shallow JSON redaction.
    pub fn new(patterns: SensitivePatterns) -> Self {
        Self {
            patterns,
            depth: JsonDepth::Shallow,
        }
    }

    /// Set how far JSON body redaction descends.
    pub fn with_json_depth(mut self, depth: JsonDepth) -> Self {
        self.depth = depth;
        self
    }

    /// The patterns this sanitizer applies.
    pub fn patterns(&self) -> &SensitivePatterns {
        &self.patterns
    }

    /// Sanitize a record, returning the scrubbed copy.
    pub fn sanitize(&self, mut record: Record) -> Result<Record> {
        self.sanitize_in_place(&mut record)?;
        Ok(record)
    }

    /// Sanitize a record in place.
    ///
    /// On error the record is left partially sanitized: headers and the
    /// substring pass over the URL have run, bodies have not.
    pub fn sanitize_in_place(&self, record: &mut Record) -> Result<()> {
        self.sanitize_headers(&mut record.request_headers);
        self.sanitize_headers(&mut record.response_headers);

        self.sanitize_url(record)?;

        if !record.request_body.is_empty() && record.request_content_type() == Some(JSON_CONTENT_TYPE)
        {
            record.request_body = self.sanitize_json(&record.request_body);
        }
        if !record.response_body.is_empty()
            && record.response_content_type() == Some(JSON_CONTENT_TYPE)
        {
            record.response_body = self.sanitize_json(&record.response_body);
        }

        Ok(())
    }

    fn sanitize_headers(&self, headers: &mut Headers) {
        for (key, value) in headers.iter_mut() {
            if self.patterns.is_sensitive_key(key) {
                *value = self.patterns.placeholder().to_string();
            } else if let std::borrow::Cow::Owned(redacted) = self.patterns.redact_value(value) {
                *value = redacted;
            }
        }
    }

    fn sanitize_url(&self, record: &mut Record) -> Result<()> {
        if record.url.is_empty() {
            return Ok(());
        }

        record.url = self.patterns.redact_value(&record.url).into_owned();
        record.path = self.patterns.redact_value(&record.path).into_owned();

        let mut url = Url::parse(&record.url)?;

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        let key_as_value = params
            .values()
            .flatten()
            .any(|value| self.patterns.is_sensitive_key(value));

        let mut changed = false;
        for (key, values) in params.iter_mut() {
            if self.patterns.is_sensitive_key(key) {
                for value in values.iter_mut() {
                    *value = self.patterns.placeholder().to_string();
                }
                changed = true;
            }
        }

        // Compatibility: a redacted query that also carries a key name as a
        // value yields an empty URL.
        if changed && key_as_value {
            record.url.clear();
            return Ok(());
        }

        if changed {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(
                    params
                        .iter()
                        .flat_map(|(key, values)| values.iter().map(move |value| (key, value))),
                )
                .finish();
            url.set_query(Some(&query));
            record.url = url.into();
        }

        Ok(())
    }

    /// Redact a JSON body.
    ///
    /// Anything that does not parse as a JSON object is returned unchanged.
    pub fn sanitize_json(&self, body: &str) -> String {
        let mut object: Map<String, Value> = match serde_json::from_str(body) {
            Ok(object) => object,
            Err(_) => return body.to_string(),
        };

        self.redact_object(&mut object);

        serde_json::to_string(&object).unwrap_or_else(|_| body.to_string())
    }

    fn redact_object(&self, object: &mut Map<String, Value>) {
        for (key, value) in object.iter_mut() {
            if self.patterns.is_sensitive_key(key) {
                *value = Value::String(self.patterns.placeholder().to_string());
            } else {
                self.redact_json_value(value);
            }
        }
    }

    fn redact_json_value(&self, value: &mut Value) {
        match value {
            Value::String(text) => {
                if let std::borrow::Cow::Owned(redacted) = self.patterns.redact_value(text) {
                    *text = redacted;
                }
            }
            Value::Object(nested) if self.depth == JsonDepth::Recursive => {
                self.redact_object(nested);
            }
            Value::Array(items) if self.depth == JsonDepth::Recursive => {
                for item in items.iter_mut() {
                    self.redact_json_value(item);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::REQUEST_END;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn json_request(body: &str) -> Record {
        Record {
            request_headers: headers(&[("Content-Type", "application/json")]),
            request_body: body.to_string(),
            ..Default::default()
        }
    }

    fn sane_record() -> Record {
        Record {
            protocol: "https".to_string(),
            path: "/sample".to_string(),
            hostname: "api.example.com".to_string(),
            method: "GET".to_string(),
            started_at: 1_700_000_000_000,
            ended_at: 1_700_000_000_080,
            kind: REQUEST_END.to_string(),
            status_code: 200,
            url: "http://api.example.com/sample".to_string(),
            request_headers: headers(&[("Accept", "application/json")]),
            request_body: r#"{"body":"data"}"#.to_string(),
            response_headers: headers(&[("Content-Type", "application/json")]),
            response_body: r#"{"ok":true}"#.to_string(),
        }
    }

    #[test]
    fn sane_record_is_untouched() {
        let sanitizer = Sanitizer::default();
        let record = sane_record();
        assert_eq!(sanitizer.sanitize(record.clone()).unwrap(), record);
    }

    #[test]
    fn sensitive_header_keys_are_filtered() {
        let sanitizer = Sanitizer::default();
        for key in ["authorization", "Authorization", "AutHorizAtion"] {
            let record = Record {
                request_headers: headers(&[(key, "hello")]),
                response_headers: headers(&[(key, "contact@example.com")]),
                ..Default::default()
            };
            let out = sanitizer.sanitize(record).unwrap();
            assert_eq!(out.request_headers[key], "[FILTERED]");
            assert_eq!(out.response_headers[key], "[FILTERED]");
        }
    }

    #[test]
    fn near_miss_header_keys_are_kept() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            request_headers: headers(&[("Authorization2", "hello"), ("2Authorization", "hello")]),
            ..Default::default()
        };
        let out = sanitizer.sanitize(record.clone()).unwrap();
        assert_eq!(out.request_headers, record.request_headers);
    }

    #[test]
    fn header_values_get_substring_redaction() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            request_headers: headers(&[("Blah", "contact@example.com")]),
            response_headers: headers(&[("Blah", "aaa bbb@ccc ddd eee@fff.ggg hhh")]),
            ..Default::default()
        };
        let out = sanitizer.sanitize(record).unwrap();
        assert_eq!(out.request_headers["Blah"], "[FILTERED].com");
        assert_eq!(out.response_headers["Blah"], "aaa [FILTERED] ddd [FILTERED].ggg hhh");
    }

    #[test]
    fn clean_url_is_kept_verbatim() {
        let sanitizer = Sanitizer::default();
        let url = "http://api.example.com/blah/blih?bluh=bloh&blouh=blanh";
        let record = Record {
            url: url.to_string(),
            ..Default::default()
        };
        assert_eq!(sanitizer.sanitize(record).unwrap().url, url);
    }

    #[test]
    fn sensitive_query_keys_are_filtered_and_sorted() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            url: "http://api.example.com/search?q=rust&api_key=abc&api_key=def".to_string(),
            ..Default::default()
        };
        let out = sanitizer.sanitize(record).unwrap();
        assert_eq!(
            out.url,
            "http://api.example.com/search?api_key=%5BFILTERED%5D&api_key=%5BFILTERED%5D&q=rust"
        );
    }

    #[test]
    fn key_name_as_query_value_empties_url() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            url: "http://api.example.com/blah/blih?bluh=Authorization&authorization=blanh"
                .to_string(),
            ..Default::default()
        };
        assert_eq!(sanitizer.sanitize(record).unwrap().url, "");
    }

    #[test]
    fn key_name_as_value_alone_keeps_url() {
        let sanitizer = Sanitizer::default();
        for url in [
            "https://api.example.com/search?type=secret&page=2",
            "https://api.example.com/forms?field=password",
        ] {
            let record = Record {
                url: url.to_string(),
                ..Default::default()
            };
            assert_eq!(sanitizer.sanitize(record).unwrap().url, url);
        }
    }

    #[test]
    fn email_in_path_is_redacted() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            url: "http://api.example.com/email/contact@example.org".to_string(),
            path: "/email/contact@example.org".to_string(),
            ..Default::default()
        };
        let out = sanitizer.sanitize(record).unwrap();
        assert_eq!(out.url, "http://api.example.com/email/[FILTERED].org");
        assert_eq!(out.path, "/email/[FILTERED].org");
    }

    #[test]
    fn unparseable_url_after_substring_pass_is_an_error() {
        let sanitizer = Sanitizer::default();
        let mut record = Record {
            url: "http://user.name@example.com/".to_string(),
            request_headers: headers(&[
                ("Authorization", "secret"),
                ("Content-Type", "application/json"),
            ]),
            request_body: r#"{"password":"hunter2"}"#.to_string(),
            ..Default::default()
        };
        assert!(sanitizer.sanitize_in_place(&mut record).is_err());
        // Headers ran before the URL step, bodies did not.
        assert_eq!(record.request_headers["Authorization"], "[FILTERED]");
        assert_eq!(record.url, "http://[FILTERED].com/");
        assert_eq!(record.request_body, r#"{"password":"hunter2"}"#);
    }

    #[test]
    fn json_body_sensitive_key_is_filtered() {
        let sanitizer = Sanitizer::default();
        let out = sanitizer
            .sanitize(json_request(r#"{"authorization":"blah"}"#))
            .unwrap();
        assert_eq!(out.request_body, r#"{"authorization":"[FILTERED]"}"#);
    }

    #[test]
    fn non_object_json_bodies_are_byte_identical() {
        let sanitizer = Sanitizer::default();
        for body in ["42", "[42]", "{}", "not json", r#"["a@b.com"]"#] {
            let out = sanitizer.sanitize(json_request(body)).unwrap();
            assert_eq!(out.request_body, body);
        }
    }

    #[test]
    fn json_string_values_get_substring_redaction() {
        let sanitizer = Sanitizer::default();
        let out = sanitizer
            .sanitize(json_request(r#"{"contact":"me@example.com","count":4111111111111111}"#))
            .unwrap();
        let value: Value = serde_json::from_str(&out.request_body).unwrap();
        assert_eq!(value["contact"], "[FILTERED].com");
        // Non-string values are left alone.
        assert_eq!(value["count"], 4111111111111111u64);
    }

    #[test]
    fn json_body_requires_exact_content_type() {
        let sanitizer = Sanitizer::default();
        let mut record = json_request(r#"{"password":"x"}"#);
        record.request_headers = headers(&[("Content-Type", "application/json; charset=utf-8")]);
        let out = sanitizer.sanitize(record).unwrap();
        assert_eq!(out.request_body, r#"{"password":"x"}"#);
    }

    #[test]
    fn response_json_body_is_sanitized() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            response_headers: headers(&[("content-type", "application/json")]),
            response_body: r#"{"access_token":"abc","ok":true}"#.to_string(),
            ..Default::default()
        };
        let out = sanitizer.sanitize(record).unwrap();
        assert_eq!(out.response_body, r#"{"access_token":"[FILTERED]","ok":true}"#);
    }

    #[test]
    fn shallow_mode_skips_nested_objects() {
        let sanitizer = Sanitizer::default();
        let body = r#"{"a":{"authorization":"blah"}}"#;
        let out = sanitizer.sanitize(json_request(body)).unwrap();
        assert_eq!(out.request_body, body);
    }

    #[test]
    fn recursive_mode_descends_into_nested_values() {
        let sanitizer = Sanitizer::default().with_json_depth(JsonDepth::Recursive);
        let out = sanitizer
            .sanitize(json_request(
                r#"{"a":{"authorization":"blah"},"list":[{"password":"x"},"me@example.com"]}"#,
            ))
            .unwrap();
        assert_eq!(
            out.request_body,
            r#"{"a":{"authorization":"[FILTERED]"},"list":[{"password":"[FILTERED]"},"[FILTERED].com"]}"#
        );
    }

    #[test]
    fn recursive_mode_keeps_top_level_behavior() {
        let shallow = Sanitizer::default();
        let recursive = Sanitizer::default().with_json_depth(JsonDepth::Recursive);
        for body in [r#"{"authorization":"blah"}"#, "42", "[42]", "{}"] {
            assert_eq!(
                shallow.sanitize(json_request(body)).unwrap(),
                recursive.sanitize(json_request(body)).unwrap()
            );
        }
    }

    #[test]
    fn sanitizing_twice_is_idempotent() {
        let sanitizer = Sanitizer::default();
        let record = Record {
            url: "http://api.example.com/u/contact@example.org?token=1&password=x".to_string(),
            path: "/u/contact@example.org".to_string(),
            request_headers: headers(&[
                ("Authorization", "Bearer abc"),
                ("Content-Type", "application/json"),
                ("X-Email", "aaa bbb@ccc ddd eee@fff.ggg hhh"),
            ]),
            request_body: r#"{"secret":"s","note":"card 4111 1111 1111 1111"}"#.to_string(),
            ..Default::default()
        };
        let once = sanitizer.sanitize(record).unwrap();
        let twice = sanitizer.sanitize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
