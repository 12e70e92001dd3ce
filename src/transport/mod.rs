//! The outbound HTTP seam.
//!
//! A [`Transport`] turns an `http::Request` into an `http::Response`. The
//! agent both consumes and implements this trait, so it can be stacked on top
//! of any transport, including another agent.

pub mod client;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{Request, Response};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

use crate::error::BoxError;

pub use client::ClientTransport;

/// Request and response body type exchanged across the seam.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single HTTP exchange.
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, BoxError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, BoxError> {
        (**self).round_trip(request).await
    }
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, BoxError> {
        (**self).round_trip(request).await
    }
}

/// A body holding `bytes` in full.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body with no data.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Read a body to completion.
pub async fn collect(body: Body) -> Result<Bytes, BoxError> {
    Ok(body.collect().await?.to_bytes())
}

/// Read a body to its end, returning a body that replays it and the data read.
///
/// If the body fails partway, the returned body yields the frames read so far
/// followed by the same error, and no data is returned.
pub async fn replay(mut body: Body) -> (Body, Option<Bytes>) {
    let mut frames: Vec<Result<Frame<Bytes>, BoxError>> = Vec::new();
    let mut data = BytesMut::new();
    let mut failed = false;

    while let Some(next) = body.frame().await {
        match next {
            Ok(frame) => {
                if let Some(chunk) = frame.data_ref() {
                    data.extend_from_slice(chunk);
                }
                frames.push(Ok(frame));
            }
            Err(e) => {
                frames.push(Err(e));
                failed = true;
                break;
            }
        }
    }

    if failed {
        let body = StreamBody::new(futures::stream::iter(frames)).boxed_unsync();
        return (body, None);
    }

    let data = data.freeze();
    let data_only = frames
        .iter()
        .all(|frame| frame.as_ref().is_ok_and(|f| f.is_data()));
    let body = if data_only {
        full(data.clone())
    } else {
        StreamBody::new(futures::stream::iter(frames)).boxed_unsync()
    };
    (body, Some(data))
}
