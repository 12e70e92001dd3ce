//! Configuration for the agent.
//!
//! Two kinds of configuration exist:
//!
//! - [`Config`]: the blocklist served by the collector, cached and refreshed
//!   in the background by [`cache::ConfigCache`].
//! - [`settings::AgentSettings`]: local settings (secret key, endpoints,
//!   queue sizing, redaction overrides) loaded from TOML or the environment.

pub mod cache;
pub mod settings;

use serde::{Deserialize, Serialize};

pub use cache::ConfigCache;
pub use settings::AgentSettings;

/// Remote configuration fetched from the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Hostnames that must never be contacted.
    #[serde(default)]
    pub blocked_domains: Vec<String>,
}

impl Config {
    /// Whether `hostname` exactly matches a blocked domain.
    pub fn is_blocked(&self, hostname: &str) -> bool {
        self.blocked_domains.iter().any(|domain| domain == hostname)
    }
}
