//! Parallel ranged downloads into a destination file.
//!
//! The orchestrator issues a discovery request for the first block,
//! learns the content length from `Content-Range`, plans the remaining
//! blocks, and fetches them concurrently under a semaphore bound. Each
//! block writes to its own disjoint file region, so only the progress
//! aggregate needs a lock. The first terminal failure cancels every
//! other block and the partial file is removed.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::client::DownloadSummary;
use super::progress::{AggregateProgress, ChunkProgress, ProgressReceiver};
use super::stream::ResumableStream;
use crate::config::DownloadConfig;
use crate::error::{DownloadError, DownloadResult};
use crate::plan::DownloadPlan;
use crate::range::{content_range_total, ByteRange};
use crate::transport::{
    ContentTransport, SourceEndpoint, TransportResponse, HTTP_OK, HTTP_PARTIAL_CONTENT,
    HTTP_RANGE_NOT_SATISFIABLE,
};

/// Buffer size for chunk writers.
const WRITE_BUFFER_SIZE: usize = 512 * 1024;

/// One parallel download in flight.
pub(crate) struct ParallelFetch {
    transport: Arc<dyn ContentTransport>,
    endpoint: SourceEndpoint,
    config: DownloadConfig,
    cancel: CancellationToken,
}

impl ParallelFetch {
    pub(crate) fn new(
        transport: Arc<dyn ContentTransport>,
        endpoint: SourceEndpoint,
        config: DownloadConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            endpoint,
            config,
            cancel,
        }
    }

    /// Downloads the whole content into `path`.
    ///
    /// The destination is opened before any network activity so local
    /// I/O problems surface immediately. On any terminal failure or
    /// cancellation the partial file is removed; it survives only when
    /// every block completed.
    pub(crate) async fn run(
        self,
        path: &Path,
        overwrite: bool,
        progress: Option<ProgressReceiver>,
    ) -> DownloadResult<DownloadSummary> {
        let file = open_destination(path, overwrite).await?;

        let result = self.fetch_into(path, file, progress).await;
        if result.is_err() {
            // Never leave a corrupt partial file behind.
            if let Err(error) = tokio::fs::remove_file(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to remove partial download"
                );
            }
        }
        result
    }

    async fn fetch_into(
        &self,
        path: &Path,
        file: File,
        progress: Option<ProgressReceiver>,
    ) -> DownloadResult<DownloadSummary> {
        let response = self.discover().await?;
        let (total, response) = self.classify_discovery(response).await?;

        let plan = DownloadPlan::new(total, self.config.block_size);
        tracing::info!(
            url = %self.endpoint.url(),
            path = %path.display(),
            total_bytes = total,
            blocks = plan.block_count(),
            "Starting parallel download"
        );

        // Preallocate so every chunk writer can seek to its region.
        if total > 0 {
            file.set_len(total).await.map_err(|source| DownloadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        // Chunk writers open their own handles on disjoint regions.
        drop(file);

        let aggregate = Arc::new(AggregateProgress::new(progress));
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        // Child token: the first failed chunk cancels its siblings
        // without cancelling the caller's token.
        let fail_token = self.cancel.child_token();
        let mut tasks: JoinSet<DownloadResult<()>> = JoinSet::new();

        // Chunk 0 adopts the discovery response; its request is already
        // in flight, so it bypasses the semaphore.
        let chunk0_range = if total > 0 {
            ByteRange::new(0, self.config.block_size.min(total))
        } else {
            ByteRange::from_offset(0)
        };
        let chunk0 = ResumableStream::from_response(
            Arc::clone(&self.transport),
            self.endpoint.clone(),
            chunk0_range,
            response.body,
            self.config.retry,
            fail_token.clone(),
        );
        tasks.spawn(write_chunk(
            chunk0,
            path.to_path_buf(),
            ChunkProgress::new(Arc::clone(&aggregate)),
        ));

        for chunk in plan.chunks().skip(1) {
            let semaphore = Arc::clone(&semaphore);
            let transport = Arc::clone(&self.transport);
            let endpoint = self.endpoint.clone();
            let retry = self.config.retry;
            let token = fail_token.clone();
            let progress = ChunkProgress::new(Arc::clone(&aggregate));
            let path = path.to_path_buf();
            tasks.spawn(async move {
                // Hold the permit for the chunk's whole transfer.
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(DownloadError::Cancelled),
                    permit = semaphore.acquire_owned() => {
                        permit.expect("download semaphore closed")
                    }
                };
                tracing::debug!(index = chunk.index, offset = chunk.offset, "Fetching chunk");
                let stream = ResumableStream::open(
                    transport,
                    endpoint,
                    Some(chunk.range()),
                    retry,
                    token,
                );
                write_chunk(stream, path, progress).await
            });
        }

        let mut first_error: Option<DownloadError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|join_error| {
                Err(DownloadError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, join_error.to_string()),
                })
            });
            if let Err(error) = result {
                fail_token.cancel();
                // Keep the root cause: a Cancelled error from a sibling
                // chunk is an effect of the first real failure.
                match &first_error {
                    None => first_error = Some(error),
                    Some(existing) if existing.is_cancelled() && !error.is_cancelled() => {
                        first_error = Some(error);
                    }
                    _ => {}
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        let bytes_transferred = aggregate.total();
        tracing::info!(
            path = %path.display(),
            bytes = bytes_transferred,
            blocks = plan.block_count(),
            "Download complete"
        );
        Ok(DownloadSummary {
            bytes_transferred,
            blocks: plan.block_count(),
        })
    }

    /// Issues the first-block request, retrying transport failures
    /// under the configured budget.
    async fn discover(&self) -> DownloadResult<TransportResponse> {
        let range = ByteRange::new(0, self.config.block_size);
        let mut attempts = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                result = self.transport.send(self.endpoint.get(Some(range))) => result,
            };
            match result {
                Ok(response) => return Ok(response),
                Err(error) => {
                    attempts += 1;
                    if attempts > self.config.retry.max_retries {
                        return Err(DownloadError::RetriesExhausted {
                            attempts,
                            source: error,
                        });
                    }
                    let delay = self.config.retry.delay_for_attempt(attempts - 1);
                    tracing::warn!(
                        url = %self.endpoint.url(),
                        attempt = attempts,
                        error = %error,
                        "Discovery request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Applies the discovery status policy and extracts the total
    /// content length. Returns the response whose body chunk 0 adopts.
    async fn classify_discovery(
        &self,
        response: TransportResponse,
    ) -> DownloadResult<(u64, TransportResponse)> {
        match response.status {
            HTTP_PARTIAL_CONTENT => {
                let parsed = response.content_range.as_deref().map(content_range_total);
                match parsed {
                    Some(Some(total)) => Ok((total, response)),
                    // No Content-Range header at all: single-chunk
                    // mode, whatever bytes arrive.
                    None => Ok((0, response)),
                    // The total is `*` or garbage. A 206 body covers
                    // only the requested block, so the remainder cannot
                    // be planned from it; take the content in full.
                    Some(None) => {
                        tracing::warn!(
                            url = %self.endpoint.url(),
                            "Discovery reply has no usable total, fetching content in full"
                        );
                        let refetched = self.fetch_unranged().await?;
                        Ok((0, refetched))
                    }
                }
            }
            // No range support: the server sends the whole body and no
            // Content-Range. Single-chunk mode, whatever bytes arrive.
            HTTP_OK => Ok((0, response)),
            HTTP_RANGE_NOT_SATISFIABLE => {
                tracing::warn!(
                    url = %self.endpoint.url(),
                    "Discovery range not satisfiable, fetching content in full"
                );
                let refetched = self.fetch_unranged().await?;
                Ok((0, refetched))
            }
            status => Err(DownloadError::service(status)),
        }
    }

    /// One unranged fallback request for a discovery answer whose range
    /// information was unusable. Only 200/206 are acceptable.
    async fn fetch_unranged(&self) -> DownloadResult<TransportResponse> {
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = self.transport.send(self.endpoint.get(None)) => result?,
        };
        match response.status {
            HTTP_OK | HTTP_PARTIAL_CONTENT => Ok(response),
            status => Err(DownloadError::service(status)),
        }
    }
}

async fn open_destination(path: &Path, overwrite: bool) -> DownloadResult<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).await.map_err(|source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Drains one chunk's stream into the file region its range covers.
async fn write_chunk(
    mut stream: ResumableStream,
    path: PathBuf,
    mut progress: ChunkProgress,
) -> DownloadResult<()> {
    let offset = stream.range().offset;
    let file = OpenOptions::new()
        .write(true)
        .open(&path)
        .await
        .map_err(|source| DownloadError::Io {
            path: path.clone(),
            source,
        })?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    writer
        .seek(SeekFrom::Start(offset))
        .await
        .map_err(|source| DownloadError::Io {
            path: path.clone(),
            source,
        })?;

    let mut generation = stream.generation();
    let mut written = 0u64;
    while let Some(item) = stream.next().await {
        let bytes = item?;
        if stream.generation() != generation {
            // A full refetch restarted this chunk from its beginning:
            // rewind the file position and the progress accounting.
            generation = stream.generation();
            writer
                .seek(SeekFrom::Start(offset))
                .await
                .map_err(|source| DownloadError::Io {
                    path: path.clone(),
                    source,
                })?;
            progress.rewind();
            written = 0;
        }
        writer
            .write_all(&bytes)
            .await
            .map_err(|source| DownloadError::Io {
                path: path.clone(),
                source,
            })?;
        written += bytes.len() as u64;
        progress.record(bytes.len() as u64);
    }
    writer.flush().await.map_err(|source| DownloadError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::debug!(offset, bytes = written, "Chunk complete");
    Ok(())
}
