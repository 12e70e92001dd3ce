//! # bearer-agent
//!
//! **Outbound HTTP instrumentation with a domain blocklist.**
//!
//! The agent wraps an HTTP [`Transport`](transport::Transport), refuses calls
//! to blocked hostnames, and ships a redacted record of every other call to a
//! remote collector. The caller sees the wrapped transport's response
//! unchanged; telemetry runs on background workers.
//!
//! ## Architecture
//!
//! - **[`interceptor`]**: the [`Agent`] transport wrapper and per-request capture
//! - **[`transport`]**: the `Transport` trait and its `reqwest` implementation
//! - **[`sanitize`]**: redaction of headers, URLs and JSON bodies
//! - **[`config`]**: collector blocklist cache and local TOML settings
//! - **[`telemetry`]**: bounded worker pool building and shipping records
//! - **[`shipper`]** / **[`collector`]**: envelope assembly and the collector HTTP API
//! - **[`record`]**: the wire record
//! - **[`error`]**: unified error types using `thiserror`
//!
//! ## Quick Start
//!
//! ```no_run
//! use bearer_agent::transport::{empty, Transport};
//! use bearer_agent::Agent;
//!
//! # async fn run() -> Result<(), bearer_agent::error::BoxError> {
//! let agent = Agent::init(std::env::var("BEARER_SECRETKEY").unwrap_or_default())?;
//! let request = http::Request::get("https://api.example.com/v1/items").body(empty())?;
//! let response = agent.round_trip(request).await?;
//! println!("{}", response.status());
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod record;
pub mod sanitize;
pub mod shipper;
pub mod telemetry;
pub mod transport;

pub use config::{AgentSettings, Config, ConfigCache};
pub use error::{is_blocked_domain, AgentError, BoxError};
pub use interceptor::{Agent, AgentBuilder};
pub use record::Record;
pub use sanitize::{JsonDepth, Sanitizer, SensitivePatterns};
pub use telemetry::{ErrorSink, TelemetryFault, TracingSink};
pub use transport::{ClientTransport, Transport};
