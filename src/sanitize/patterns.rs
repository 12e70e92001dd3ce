//! Redaction patterns.
//!
//! Two rules are applied to every captured string:
//!
//! | Rule | Applies to | Effect |
//! |------|------------|--------|
//! | Sensitive key | header names, JSON keys, query parameter names | whole value replaced |
//! | Sensitive value | any other value | matching substrings replaced |
//!
//! The value rule matches email-like substrings and 13-16 digit sequences
//! (candidate card numbers). For email matches the final domain label is kept:
//! `contact@example.com` becomes `[FILTERED].com`.

use std::borrow::Cow;

use regex::{Captures, Regex};

use crate::error::Result;

/// Header and field names whose values are always redacted.
pub const DEFAULT_SENSITIVE_KEYS: &str = r"(?i)^authorization$|^password$|^secret$|^passwd$|^api.?key$|^access.?token$|^auth.?token$|^credentials$|^mysql_pwd$|^stripetoken$|^card.?number.?$|^secret$|^client.?id$|^client.?secret$";

/// Email-like substrings and candidate card numbers.
pub const DEFAULT_SENSITIVE_VALUES: &str = r"[a-zA-Z0-9][a-zA-Z0-9.!#$%&’*+=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*|(?:\d[ -]*?){13,16}";

/// Replacement text for redacted content.
pub const DEFAULT_PLACEHOLDER: &str = "[FILTERED]";

/// The compiled key and value rules plus the placeholder they substitute.
///
/// Built once and handed to a [`Sanitizer`](super::Sanitizer); never mutated.
#[derive(Debug, Clone)]
pub struct SensitivePatterns {
    keys: Regex,
    values: Regex,
    placeholder: String,
}

impl SensitivePatterns {
    /// Create the built-in pattern set.
    pub fn new() -> Self {
        Self {
            keys: Regex::new(DEFAULT_SENSITIVE_KEYS).expect("built-in key pattern compiles"),
            values: Regex::new(DEFAULT_SENSITIVE_VALUES).expect("built-in value pattern compiles"),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    /// Create a pattern set from custom expressions.
    ///
    /// `None` keeps the corresponding built-in.
    pub fn with_patterns(
        keys: Option<&str>,
        values: Option<&str>,
        placeholder: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            keys: Regex::new(keys.unwrap_or(DEFAULT_SENSITIVE_KEYS))?,
            values: Regex::new(values.unwrap_or(DEFAULT_SENSITIVE_VALUES))?,
            placeholder: placeholder.unwrap_or(DEFAULT_PLACEHOLDER).to_string(),
        })
    }

    /// Text substituted for redacted content.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Whether `key` names a field whose whole value must be hidden.
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        self.keys.is_match(key)
    }

    /// Replace every sensitive substring of `value` with the placeholder.
    ///
    /// Borrows when nothing matched.
    pub fn redact_value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        self.values.replace_all(value, |caps: &Captures<'_>| {
            let matched = &caps[0];
            // Email matches keep their last domain label.
            match matched.split_once('@') {
                Some((_, domain)) => match domain.rfind('.') {
                    Some(dot) => format!("{}{}", self.placeholder, &domain[dot..]),
                    None => self.placeholder.clone(),
                },
                None => self.placeholder.clone(),
            }
        })
    }
}

impl Default for SensitivePatterns {
    fn default() -> Self {
        Self::new()
    }
}
