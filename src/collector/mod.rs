//! Collector capabilities.
//!
//! The remote collector is consumed through two narrow traits so the cache and
//! the shipper can be exercised without a network:
//!
//! - [`ConfigSource`] fetches the blocklist [`Config`].
//! - [`LogSink`] delivers a [`LogsEnvelope`] of records.
//!
//! [`client::HttpCollector`] implements both against the collector's HTTP API.

pub mod client;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::record::Record;

pub use client::HttpCollector;

/// Agent type string reported to the collector.
pub const AGENT_TYPE: &str = "bearer-rust";
/// Log level marker meaning "everything".
pub const LOG_LEVEL_ALL: &str = "ALL";
pub const RUNTIME_TYPE: &str = "rust";

/// Fetches the collector-side configuration for a secret key.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_config(&self, secret_key: &str) -> Result<Config>;
}

/// Delivers a batch of records to the collector.
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    async fn send_logs(&self, envelope: &LogsEnvelope) -> Result<()>;
}

/// Runtime descriptor (`runtime` object of the envelope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// Agent descriptor (`agent` object of the envelope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub log_level: String,
}

/// Body of a log shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsEnvelope {
    pub secret_key: String,
    pub runtime: RuntimeInfo,
    pub agent: AgentInfo,
    pub logs: Vec<Record>,
}

impl LogsEnvelope {
    pub fn new(secret_key: &str, logs: Vec<Record>) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            runtime: RuntimeInfo {
                kind: RUNTIME_TYPE.to_string(),
                version: option_env!("CARGO_PKG_RUST_VERSION")
                    .filter(|v| !v.is_empty())
                    .unwrap_or("unknown")
                    .to_string(),
            },
            agent: AgentInfo {
                kind: AGENT_TYPE.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                log_level: LOG_LEVEL_ALL.to_string(),
            },
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_to_wire_shape() {
        let envelope = LogsEnvelope::new("sk_test", vec![Record::default()]);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["secretKey"], "sk_test");
        assert_eq!(json["runtime"]["type"], "rust");
        assert!(json["runtime"]["version"].is_string());
        assert_eq!(json["agent"]["type"], "bearer-rust");
        assert_eq!(json["agent"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["agent"]["log_level"], "ALL");
        assert_eq!(json["logs"].as_array().unwrap().len(), 1);
        assert_eq!(json["logs"][0]["type"], "");
    }
}
