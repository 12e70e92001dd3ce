//! The transport interceptor.
//!
//! [`Agent`] wraps any [`Transport`] and implements it again, so it can be
//! dropped in wherever the inner transport was used. For every request it:
//!
//! 1. refuses hostnames on the collector's blocklist without touching the network;
//! 2. buffers the request body, forwarding one copy and keeping the other;
//! 3. delegates to the inner transport, timing the exchange;
//! 4. buffers textual response bodies the same way, replaying a body that
//!    fails partway to the caller unchanged;
//! 5. queues the capture for the telemetry workers.
//!
//! Steps 2, 4 and 5 only happen when telemetry is enabled.

pub mod capture;

use std::sync::Arc;

use http::{Request, Response};
use http_body::Body as _;
use tracing::{debug, info, warn};

use crate::collector::{ConfigSource, HttpCollector, LogSink};
use crate::config::{AgentSettings, Config, ConfigCache};
use crate::error::{AgentError, BoxError, Result};
use crate::shipper::RecordShipper;
use crate::telemetry::{ErrorSink, TelemetryProcessor, TelemetryQueue, TracingSink};
use crate::transport::{collect, full, replay, Body, ClientTransport, Transport};

use self::capture::{content_type, hostname_of, is_parseable_content_type, now_millis, Exchange};

pub struct Agent<T = ClientTransport> {
    inner: T,
    cache: Arc<ConfigCache>,
    telemetry: Option<TelemetryQueue>,
}

impl Agent {
    /// Agent over a default `reqwest` transport, with telemetry keyed by `secret_key`.
    pub fn init(secret_key: impl Into<String>) -> Result<Self> {
        AgentBuilder::new(
            ClientTransport::new()?,
            AgentSettings::with_secret_key(secret_key),
        )
        .build()
    }
}

impl<T: Transport> Agent<T> {
    /// Start building an agent around `transport`.
    pub fn builder(transport: T, settings: AgentSettings) -> AgentBuilder<T> {
        AgentBuilder::new(transport, settings)
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The blocklist cache consulted before every request.
    pub fn config_cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    /// Whether captures are recorded and shipped (a secret key is set).
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.is_some()
    }

    /// Stop the config refresh and wait for queued telemetry to be shipped.
    pub async fn shutdown(self) {
        self.cache.shutdown();
        if let Some(telemetry) = self.telemetry {
            telemetry.shutdown().await;
        }
        info!("Agent stopped");
    }

    async fn check_blocklist(&self, hostname: &str) -> std::result::Result<(), BoxError> {
        if let Some(config) = self.cache.get().await {
            if config.is_blocked(hostname) {
                warn!("BLOCKED request to {}", hostname);
                return Err(Box::new(AgentError::BlockedDomain(hostname.to_string())));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for Agent<T> {
    async fn round_trip(&self, request: Request<Body>) -> std::result::Result<Response<Body>, BoxError> {
        let hostname = hostname_of(request.uri(), request.headers());
        self.check_blocklist(&hostname).await?;

        let Some(telemetry) = &self.telemetry else {
            return self.inner.round_trip(request).await;
        };

        let (parts, body) = request.into_parts();
        let mut exchange = Exchange::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone());
        let body = if body.is_end_stream() {
            body
        } else {
            let bytes = collect(body).await?;
            exchange.request_body = Some(bytes.clone());
            full(bytes)
        };
        let request = Request::from_parts(parts, body);

        exchange.started_at = now_millis();
        let result = self.inner.round_trip(request).await;
        exchange.ended_at = now_millis();

        let result = match result {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                exchange.status = Some(parts.status);
                exchange.response_headers = parts.headers.clone();

                let textual = content_type(&parts.headers).is_some_and(is_parseable_content_type);
                let body = if textual && !body.is_end_stream() {
                    let (body, captured) = replay(body).await;
                    exchange.response_body = captured;
                    body
                } else {
                    body
                };
                Ok(Response::from_parts(parts, body))
            }
            Err(e) => Err(e),
        };

        if !telemetry.submit(exchange) {
            debug!("Telemetry capture for {} dropped", hostname);
        }
        result
    }
}

impl<T> std::fmt::Debug for Agent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("cache", &self.cache)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`Agent`] from settings and optional collaborators.
///
/// Unset collaborators default to an [`HttpCollector`] pointed at the
/// configured endpoints and a [`TracingSink`].
pub struct AgentBuilder<T> {
    transport: T,
    settings: AgentSettings,
    config_source: Option<Arc<dyn ConfigSource>>,
    log_sink: Option<Arc<dyn LogSink>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    cache: Option<Arc<ConfigCache>>,
    seed: Option<Config>,
}

impl<T: Transport> AgentBuilder<T> {
    /// Start from `transport` and `settings` with every collaborator defaulted.
    pub fn new(transport: T, settings: AgentSettings) -> Self {
        Self {
            transport,
            settings,
            config_source: None,
            log_sink: None,
            error_sink: None,
            cache: None,
            seed: None,
        }
    }

    /// Fetch the blocklist from `source` instead of the HTTP collector.
    pub fn config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Deliver records to `sink` instead of the HTTP collector.
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Receive telemetry faults; defaults to [`TracingSink`].
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Share an existing cache, e.g. between several agents.
    ///
    /// Takes precedence over [`config`](Self::config) and
    /// [`config_source`](Self::config_source).
    pub fn config_cache(mut self, cache: Arc<ConfigCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a fixed blocklist instead of fetching one.
    ///
    /// Ignored, with a warning, when a shared cache is also supplied.
    pub fn config(mut self, config: Config) -> Self {
        self.seed = Some(config);
        self
    }

    /// Assemble the agent.
    ///
    /// With telemetry enabled this starts the worker pool, so it must run
    /// inside a Tokio runtime.
    pub fn build(self) -> Result<Agent<T>> {
        let collector = Arc::new(HttpCollector::new(
            self.settings.config_endpoint.clone(),
            self.settings.logs_endpoint.clone(),
        ));
        let secret_key = self.settings.telemetry_key().unwrap_or_default().to_string();

        let cache = match (self.cache, self.seed) {
            (Some(cache), seed) => {
                if seed.is_some() {
                    warn!("Fixed blocklist ignored: a shared config cache was supplied");
                }
                cache
            }
            (None, seed) => {
                let source = self
                    .config_source
                    .unwrap_or_else(|| Arc::clone(&collector) as Arc<dyn ConfigSource>);
                match seed {
                    Some(config) => Arc::new(ConfigCache::seeded(source, config)),
                    None => Arc::new(ConfigCache::new(
                        source,
                        secret_key.clone(),
                        self.settings.refresh_interval(),
                    )),
                }
            }
        };

        let telemetry = if secret_key.is_empty() {
            None
        } else {
            tokio::runtime::Handle::try_current()
                .map_err(|e| AgentError::Runtime(e.to_string()))?;
            let sink = self
                .log_sink
                .unwrap_or_else(|| collector as Arc<dyn LogSink>);
            let errors = self
                .error_sink
                .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn ErrorSink>);
            let processor = TelemetryProcessor::new(
                self.settings.sanitizer()?,
                RecordShipper::new(sink, secret_key),
                errors,
            );
            Some(TelemetryQueue::start(
                self.settings.queue_capacity,
                self.settings.workers,
                processor,
            ))
        };

        info!(telemetry = telemetry.is_some(), "Agent initialized");
        Ok(Agent {
            inner: self.transport,
            cache,
            telemetry,
        })
    }
}
