use std::time::Duration;

use futures::TryStreamExt;
use http::{Request, Response};
use http_body::Body as _;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};

use crate::error::{BoxError, Result};
use crate::transport::{collect, Body, Transport};

/// [`Transport`] backed by a `reqwest::Client`.
///
/// Request bodies are buffered before sending; response bodies are streamed
/// back to the caller as they arrive.
#[derive(Debug, Clone)]
pub struct ClientTransport {
    client: reqwest::Client,
}

impl ClientTransport {
    /// A client with conservative connection defaults.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for ClientTransport {
    async fn round_trip(&self, request: Request<Body>) -> std::result::Result<Response<Body>, BoxError> {
        let (parts, body) = request.into_parts();
        let url = reqwest::Url::parse(&parts.uri.to_string())?;

        let mut builder = self.client.request(parts.method, url).headers(parts.headers);
        if !body.is_end_stream() {
            builder = builder.body(collect(body).await?);
        }

        let resp = builder.send().await?;

        let mut response = Response::builder()
            .status(resp.status())
            .version(resp.version());
        if let Some(headers) = response.headers_mut() {
            *headers = resp.headers().clone();
        }

        let stream = resp
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(|e| Box::new(e) as BoxError);
        Ok(response.body(StreamBody::new(stream).boxed_unsync())?)
    }
}
