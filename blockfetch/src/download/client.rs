//! High-level client for fetching ranged content.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::parallel::ParallelFetch;
use super::progress::{ProgressReceiver, SequentialProgress};
use super::stream::ResumableStream;
use crate::config::DownloadConfig;
use crate::error::{DownloadError, DownloadResult};
use crate::range::ByteRange;
use crate::transport::{ContentTransport, SourceEndpoint};

/// Outcome of a completed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Bytes handed to the destination.
    pub bytes_transferred: u64,
    /// Number of planned blocks (1 for sequential transfers).
    pub blocks: u64,
}

/// Client for fetching ranged content from a source endpoint.
///
/// Three modes share one retry core: a raw [`ResumableStream`], a
/// sequential drain into any `AsyncWrite`, and a parallel multi-block
/// download into a file. Cancelling the client's token aborts every
/// in-flight transfer and runs the cleanup paths.
pub struct ContentClient {
    transport: Arc<dyn ContentTransport>,
    config: DownloadConfig,
    cancel: CancellationToken,
}

impl ContentClient {
    /// Creates a client over `transport`.
    pub fn new(transport: Arc<dyn ContentTransport>, config: DownloadConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties all transfers made through this client to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Opens a resumable stream over `range`, or the whole content when
    /// `None`.
    pub fn download_stream(
        &self,
        endpoint: &SourceEndpoint,
        range: Option<ByteRange>,
    ) -> ResumableStream {
        ResumableStream::open(
            Arc::clone(&self.transport),
            endpoint.clone(),
            range,
            self.config.retry,
            self.cancel.child_token(),
        )
    }

    /// Drains `range` (or the whole content) into `sink`, reporting
    /// cumulative progress through `progress`.
    ///
    /// A plain sink cannot rewind: if the content restarts after bytes
    /// were already written (a stale range forced a full refetch), the
    /// transfer fails rather than emit corrupt output.
    pub async fn download_to<W>(
        &self,
        endpoint: &SourceEndpoint,
        range: Option<ByteRange>,
        sink: &mut W,
        progress: Option<ProgressReceiver>,
    ) -> DownloadResult<DownloadSummary>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.download_stream(endpoint, range);
        let mut progress = SequentialProgress::new(progress);
        let mut generation = stream.generation();

        while let Some(item) = stream.next().await {
            let bytes = item?;
            if stream.generation() != generation {
                generation = stream.generation();
                if progress.emitted() > 0 {
                    return Err(DownloadError::Sink(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "content restarted after bytes were already written",
                    )));
                }
                progress.reset();
            }
            sink.write_all(&bytes).await.map_err(DownloadError::Sink)?;
            progress.record(bytes.len() as u64);
        }
        sink.flush().await.map_err(DownloadError::Sink)?;

        Ok(DownloadSummary {
            bytes_transferred: progress.emitted(),
            blocks: 1,
        })
    }

    /// Downloads the whole content into the file at `path` using
    /// concurrent ranged requests.
    ///
    /// With `overwrite` the destination is truncated if it exists;
    /// without it an existing file is an error. On failure or
    /// cancellation the partial file is removed.
    pub async fn download_to_file(
        &self,
        endpoint: &SourceEndpoint,
        path: &Path,
        overwrite: bool,
        progress: Option<ProgressReceiver>,
    ) -> DownloadResult<DownloadSummary> {
        ParallelFetch::new(
            Arc::clone(&self.transport),
            endpoint.clone(),
            self.config,
            self.cancel.child_token(),
        )
        .run(path, overwrite, progress)
        .await
    }

    /// Deletes the content behind `endpoint`.
    pub async fn delete(&self, endpoint: &SourceEndpoint) -> DownloadResult<()> {
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = self.transport.send(endpoint.delete()) => result?,
        };
        if !(200..300).contains(&response.status) {
            return Err(DownloadError::service(response.status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::{Reply, ScriptedTransport};
    use crate::transport::RequestMethod;
    use parking_lot::Mutex;

    fn endpoint() -> SourceEndpoint {
        SourceEndpoint::parse("https://content.test/media/42").unwrap()
    }

    fn client_over(transport: &Arc<ScriptedTransport>) -> ContentClient {
        let dyn_transport: Arc<dyn ContentTransport> = Arc::clone(transport) as _;
        ContentClient::new(
            dyn_transport,
            DownloadConfig::default().with_retry_base_delay(std::time::Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_download_to_writes_range_to_sink() {
        let transport = Arc::new(ScriptedTransport::new(vec![Reply::partial(
            b"hello world",
            "bytes 0-10/11",
        )]));
        let client = client_over(&transport);

        let mut sink = Vec::new();
        let summary = client
            .download_to(&endpoint(), Some(ByteRange::new(0, 11)), &mut sink, None)
            .await
            .unwrap();

        assert_eq!(sink, b"hello world");
        assert_eq!(summary.bytes_transferred, 11);
        assert_eq!(summary.blocks, 1);
    }

    #[tokio::test]
    async fn test_download_to_reports_cumulative_progress() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Reply::truncated(b"abc", "bytes 0-5/6", "reset"),
            Reply::partial(b"def", "bytes 3-5/6"),
        ]));
        let client = client_over(&transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let receiver: ProgressReceiver = Box::new(move |total| seen_clone.lock().push(total));

        let mut sink = Vec::new();
        let summary = client
            .download_to(
                &endpoint(),
                Some(ByteRange::new(0, 6)),
                &mut sink,
                Some(receiver),
            )
            .await
            .unwrap();

        assert_eq!(sink, b"abcdef");
        assert_eq!(summary.bytes_transferred, 6);
        // Cumulative totals, unaffected by the mid-stream resume.
        assert_eq!(*seen.lock(), vec![3, 6]);
    }

    #[tokio::test]
    async fn test_download_to_fails_when_content_restarts_mid_sink() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Reply::truncated(b"abc", "bytes 0-5/6", "reset"),
            Reply::status(416),
            Reply::full(b"abcdef"),
        ]));
        let client = client_over(&transport);

        let mut sink = Vec::new();
        let err = client
            .download_to(&endpoint(), Some(ByteRange::new(0, 6)), &mut sink, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Sink(_)));
    }

    #[tokio::test]
    async fn test_delete_sends_delete_request() {
        let transport = Arc::new(ScriptedTransport::new(vec![Reply::status(204)]));
        let client = client_over(&transport);

        client.delete(&endpoint()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, RequestMethod::Delete);
        assert!(requests[0].range.is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_error_status() {
        let transport = Arc::new(ScriptedTransport::new(vec![Reply::status(404)]));
        let client = client_over(&transport);

        let err = client.delete(&endpoint()).await.unwrap_err();
        assert_eq!(err.to_string(), "Service Request failed! Status: 404");
    }
}
