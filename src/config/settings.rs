//! Local agent settings.
//!
//! # Example `bearer.toml`
//!
//! ```toml
//! secret_key = "${BEARER_SECRETKEY}"
//! refresh_interval_ms = 5000
//! queue_capacity = 1024
//! workers = 2
//!
//! [redaction]
//! recursive = false
//! placeholder = "[FILTERED]"
//! ```

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::sanitize::{JsonDepth, Sanitizer, SensitivePatterns};

/// Environment variable holding the secret key.
pub const SECRET_KEY_ENV: &str = "BEARER_SECRETKEY";

pub const DEFAULT_CONFIG_ENDPOINT: &str = "https://config.bearer.sh/config";
pub const DEFAULT_LOGS_ENDPOINT: &str = "https://agent.bearer.sh/logs";

/// Redaction overrides (`[redaction]` section).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RedactionSettings {
    /// Replacement for the sensitive-key expression.
    #[serde(default)]
    pub keys: Option<String>,
    /// Replacement for the sensitive-value expression.
    #[serde(default)]
    pub values: Option<String>,
    /// Replacement text.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Descend into nested JSON objects and arrays.
    #[serde(default)]
    pub recursive: bool,
}

/// Top-level agent settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    /// Collector secret key. Telemetry is disabled when absent or empty.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Delay between two blocklist refreshes.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_config_endpoint")]
    pub config_endpoint: String,
    #[serde(default = "default_logs_endpoint")]
    pub logs_endpoint: String,
    /// Records waiting for a telemetry worker; newer records are dropped beyond this.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of telemetry workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub redaction: RedactionSettings,
}

fn default_refresh_interval_ms() -> u64 {
    5_000
}

fn default_config_endpoint() -> String {
    DEFAULT_CONFIG_ENDPOINT.to_string()
}

fn default_logs_endpoint() -> String {
    DEFAULT_LOGS_ENDPOINT.to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    2
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            secret_key: None,
            refresh_interval_ms: default_refresh_interval_ms(),
            config_endpoint: default_config_endpoint(),
            logs_endpoint: default_logs_endpoint(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            redaction: RedactionSettings::default(),
        }
    }
}

impl AgentSettings {
    /// Settings with the given secret key and defaults everywhere else.
    pub fn with_secret_key(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }

    /// Default settings with the secret key read from `BEARER_SECRETKEY`.
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var(SECRET_KEY_ENV).ok().filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }

    /// Load and parse settings from a TOML file.
    ///
    /// `${VAR}` and `$VAR` placeholders in string values are replaced with
    /// environment values, except under `[redaction]`. An unset variable is
    /// an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding environment placeholders.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut table: toml::Table = content.parse()?;
        substitute_env_vars(&mut table)?;
        let settings: AgentSettings = toml::Value::Table(table).try_into()?;
        Ok(settings)
    }

    /// The secret key, if telemetry is enabled.
    pub fn telemetry_key(&self) -> Option<&str> {
        self.secret_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    /// Build the sanitizer described by the `[redaction]` section.
    pub fn sanitizer(&self) -> Result<Sanitizer> {
        let patterns = SensitivePatterns::with_patterns(
            self.redaction.keys.as_deref(),
            self.redaction.values.as_deref(),
            self.redaction.placeholder.as_deref(),
        )?;
        let depth = if self.redaction.recursive {
            JsonDepth::Recursive
        } else {
            JsonDepth::Shallow
        };
        Ok(Sanitizer::new(patterns).with_json_depth(depth))
    }
}

/// Expand `${VAR_NAME}` and `$VAR_NAME` in every string value of `table`.
///
/// `[redaction]` holds regular expressions, where `$` is an anchor, so it is
/// left as written.
fn substitute_env_vars(table: &mut toml::Table) -> Result<()> {
    // Bare form is restricted to uppercase names.
    let placeholder = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Z_][A-Z0-9_]*)")?;
    for (key, value) in table.iter_mut() {
        if key != "redaction" {
            expand_value(value, &placeholder)?;
        }
    }
    Ok(())
}

fn expand_value(value: &mut toml::Value, placeholder: &Regex) -> Result<()> {
    match value {
        toml::Value::String(text) => {
            let mut missing = None;
            let expanded = placeholder.replace_all(text.as_str(), |caps: &regex::Captures<'_>| {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                std::env::var(name).unwrap_or_else(|_| {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                })
            });
            let expanded = expanded.into_owned();
            if let Some(name) = missing {
                return Err(AgentError::ConfigEnvVar(name));
            }
            *text = expanded;
        }
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item, placeholder)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_value(item, placeholder)?;
            }
        }
        _ => {}
    }
    Ok(())
}
