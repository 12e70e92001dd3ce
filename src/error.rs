use thiserror::Error;

/// Boxed error type used at the transport seam, as in the hyper/tower ecosystem.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the agent library.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The request targets a hostname on the collector's blocklist.
    #[error("bearer: blocked domain {0}")]
    BlockedDomain(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Environment variable not set: {0}")]
    ConfigEnvVar(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The collector answered with something other than the expected status.
    #[error("unsupported status code: {0}")]
    UnsupportedStatus(u16),

    /// The agent was built outside of a Tokio runtime.
    #[error("no Tokio runtime available: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Returns `true` when `err` is the blocked-domain refusal produced by the agent.
pub fn is_blocked_domain(err: &(dyn std::error::Error + 'static)) -> bool {
    matches!(
        err.downcast_ref::<AgentError>(),
        Some(AgentError::BlockedDomain(_))
    )
}
