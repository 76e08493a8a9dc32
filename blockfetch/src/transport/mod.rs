//! Transport abstraction for ranged content requests.
//!
//! The downloader talks to its source through the [`ContentTransport`]
//! trait so tests can inject scripted responses. The production
//! implementation wraps `reqwest` (see [`ReqwestTransport`]); the trait
//! returns boxed futures to stay dyn-compatible behind `Arc`.

mod http;

pub use http::ReqwestTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use url::Url;

use crate::range::ByteRange;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lazily pulled response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Status of a complete response.
pub const HTTP_OK: u16 = 200;

/// Status of a ranged response.
pub const HTTP_PARTIAL_CONTENT: u16 = 206;

/// Status telling us the requested range no longer exists.
pub const HTTP_RANGE_NOT_SATISFIABLE: u16 = 416;

/// Errors raised by the transport layer.
///
/// `Clone` so a failure can be both logged and carried into retry
/// bookkeeping without consuming it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or no response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body failed mid-stream.
    #[error("body read failed: {0}")]
    Body(String),
}

/// HTTP method of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Delete,
}

/// Authentication metadata attached to every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Host-relative form of the endpoint URL. Signing layers beneath
    /// the transport use this as the stable request identity even when
    /// the edge URL has been rewritten.
    pub signed_path: String,
}

/// One request handed to a [`ContentTransport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: RequestMethod,
    pub url: String,
    /// Rendered as a `Range` header when present.
    pub range: Option<ByteRange>,
    pub context: RequestContext,
}

/// Response header data plus the streaming body.
pub struct TransportResponse {
    pub status: u16,
    /// Raw `Content-Range` header value, if the server sent one.
    pub content_range: Option<String>,
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Trait for issuing content requests.
///
/// Dyn-compatible so the downloader can hold `Arc<dyn ContentTransport>`
/// and tests can swap in scripted implementations.
pub trait ContentTransport: Send + Sync {
    /// Sends one request and resolves to its response headers plus a
    /// lazy body stream. Non-success statuses are returned, not raised;
    /// status policy belongs to the caller.
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

/// Sends through a shared transport without borrowing it.
///
/// Retry loops hold the in-flight future across polls, so it must own
/// its transport handle rather than borrow one.
pub fn send_owned(
    transport: Arc<dyn ContentTransport>,
    request: TransportRequest,
) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
    Box::pin(async move { transport.send(request).await })
}

/// A content location plus the signing metadata derived from it.
#[derive(Debug, Clone)]
pub struct SourceEndpoint {
    url: Url,
    signed_path: String,
}

impl SourceEndpoint {
    /// Parses an endpoint URL and derives its signing metadata.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let url = Url::parse(input)
            .map_err(|e| TransportError::Request(format!("invalid URL {}: {}", input, e)))?;

        // Host-relative form: path plus query, no scheme or authority.
        let mut signed_path = url.path().to_string();
        if let Some(query) = url.query() {
            signed_path.push('?');
            signed_path.push_str(query);
        }

        Ok(Self { url, signed_path })
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Host-relative URL recorded for request signing.
    pub fn signed_path(&self) -> &str {
        &self.signed_path
    }

    /// Last path segment, used to derive a local file name.
    pub fn file_name(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
    }

    /// GET request for `range`, or for the whole content when `None`.
    pub fn get(&self, range: Option<ByteRange>) -> TransportRequest {
        self.request(RequestMethod::Get, range)
    }

    /// DELETE request for the content behind this endpoint.
    pub fn delete(&self) -> TransportRequest {
        self.request(RequestMethod::Delete, None)
    }

    fn request(&self, method: RequestMethod, range: Option<ByteRange>) -> TransportRequest {
        TransportRequest {
            method,
            url: self.url.as_str().to_string(),
            range,
            context: RequestContext {
                signed_path: self.signed_path.clone(),
            },
        }
    }
}
