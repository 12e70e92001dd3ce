use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::collector::{ConfigSource, LogSink, LogsEnvelope};
use crate::config::settings::{DEFAULT_CONFIG_ENDPOINT, DEFAULT_LOGS_ENDPOINT};
use crate::config::Config;
use crate::error::{AgentError, Result};

/// Talks to the collector's config and log-ingestion endpoints.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    config_endpoint: String,
    logs_endpoint: String,
    client: reqwest::Client,
}

impl HttpCollector {
    /// A collector client for the given config and logs URLs.
    pub fn new(config_endpoint: impl Into<String>, logs_endpoint: impl Into<String>) -> Self {
        Self {
            config_endpoint: config_endpoint.into(),
            logs_endpoint: logs_endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured client (proxies, timeouts, TLS roots).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for HttpCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_ENDPOINT, DEFAULT_LOGS_ENDPOINT)
    }
}

#[async_trait::async_trait]
impl ConfigSource for HttpCollector {
    async fn fetch_config(&self, secret_key: &str) -> Result<Config> {
        let resp = self
            .client
            .get(&self.config_endpoint)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, secret_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AgentError::UnsupportedStatus(resp.status().as_u16()));
        }

        let body = resp.bytes().await?;
        let config: Config = serde_json::from_slice(&body)?;
        debug!(
            blocked = config.blocked_domains.len(),
            "Fetched collector config"
        );
        Ok(config)
    }
}

#[async_trait::async_trait]
impl LogSink for HttpCollector {
    async fn send_logs(&self, envelope: &LogsEnvelope) -> Result<()> {
        let body = serde_json::to_vec(envelope)?;
        let resp = self
            .client
            .post(&self.logs_endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            status => Err(AgentError::UnsupportedStatus(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collector_for(server: &MockServer) -> HttpCollector {
        HttpCollector::new(
            format!("{}/config", server.uri()),
            format!("{}/logs", server.uri()),
        )
    }

    #[tokio::test]
    async fn fetch_config_sends_secret_and_parses_blocklist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .and(header("Authorization", "sk_test"))
            .and(header("Accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"blockedDomains": ["evil.com"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = collector_for(&server).fetch_config("sk_test").await.unwrap();
        assert_eq!(config.blocked_domains, vec!["evil.com"]);
    }

    #[tokio::test]
    async fn fetch_config_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let result = collector_for(&server).fetch_config("bad").await;
        assert!(matches!(result, Err(AgentError::UnsupportedStatus(401))));
    }

    #[tokio::test]
    async fn fetch_config_rejects_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = collector_for(&server).fetch_config("sk").await;
        assert!(matches!(result, Err(AgentError::Json(_))));
    }

    #[tokio::test]
    async fn send_logs_posts_json_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs"))
            .and(header("Content-Type", "application/json"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = LogsEnvelope::new("sk_test", vec![Record::default()]);
        collector_for(&server).send_logs(&envelope).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["secretKey"], "sk_test");
        assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_logs_requires_exactly_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let envelope = LogsEnvelope::new("sk_test", vec![Record::default()]);
        let result = collector_for(&server).send_logs(&envelope).await;
        assert!(matches!(result, Err(AgentError::UnsupportedStatus(201))));
    }

    #[tokio::test]
    async fn unreachable_collector_is_http_error() {
        let collector = HttpCollector::new("http://127.0.0.1:1/config", "http://127.0.0.1:1/logs");
        let result = collector.fetch_config("sk").await;
        assert!(matches!(result, Err(AgentError::Http(_))));
    }
}
