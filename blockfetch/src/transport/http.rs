//! Production transport backed by `reqwest`.

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::Client;

use super::{
    BodyStream, BoxFuture, ContentTransport, RequestMethod, TransportError, TransportRequest,
    TransportResponse,
};

/// Timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport backed by an async `reqwest` client.
///
/// Cheap to clone; the underlying client pools connections.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default connection settings.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl ContentTransport for ReqwestTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            tracing::trace!(
                url = %request.url,
                signed_path = %request.context.signed_path,
                method = ?request.method,
                "Sending content request"
            );

            let mut builder = match request.method {
                RequestMethod::Get => self.client.get(&request.url),
                RequestMethod::Delete => self.client.delete(&request.url),
            };
            if let Some(range) = request.range {
                builder = builder.header(reqwest::header::RANGE, range.header_value());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status().as_u16();
            let content_range = response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let body: BodyStream = Box::pin(
                response
                    .bytes_stream()
                    .map_err(|e| TransportError::Body(e.to_string())),
            );

            Ok(TransportResponse {
                status,
                content_range,
                body,
            })
        })
    }
}
