//! Resumable byte streams over ranged requests.
//!
//! [`ResumableStream`] turns one logical ranged GET into a
//! `futures::Stream` of byte frames that survives transient transport
//! failures: on a mid-body error it re-issues the request for exactly
//! the bytes not yet emitted and splices the resumed body onto the
//! output, so consumers see no duplicate and no gap.
//!
//! A 416 answer means the length assumption behind the range went
//! stale. The stream then falls back to exactly one full unranged
//! refetch: the requested range restarts from its beginning and a
//! generation counter tells the consumer to rewind whatever it built
//! from earlier bytes. A second 416 is fatal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::config::RetryPolicy;
use crate::error::DownloadError;
use crate::range::ByteRange;
use crate::transport::{
    send_owned, BodyStream, BoxFuture, ContentTransport, SourceEndpoint, TransportError,
    TransportRequest, TransportResponse, HTTP_OK, HTTP_PARTIAL_CONTENT,
    HTTP_RANGE_NOT_SATISFIABLE,
};

/// Where the stream is in its lifecycle.
enum StreamState {
    /// Waiting for the response to the current request.
    Connecting {
        request: BoxFuture<'static, Result<TransportResponse, TransportError>>,
        /// True when this request is the one-shot full refetch.
        refetch: bool,
    },
    /// Emitting body bytes.
    Streaming { body: BodyStream },
    /// Waiting out the backoff before the next request.
    Retrying {
        delay: Pin<Box<Sleep>>,
        /// True when the request being retried is the full refetch.
        refetch: bool,
    },
    /// All requested bytes emitted.
    Done,
    /// A fatal error was yielded; the stream is spent.
    Failed,
}

/// Byte stream covering one requested range, resuming on failure.
pub struct ResumableStream {
    transport: Arc<dyn ContentTransport>,
    endpoint: SourceEndpoint,
    /// The range this stream was asked to produce.
    range: ByteRange,
    retry: RetryPolicy,
    state: StreamState,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    /// Bytes emitted toward the requested range in this generation.
    emitted: u64,
    /// Bytes of the current body still to skip before emitting.
    discard: u64,
    /// Consecutive failures since the last byte of progress.
    attempts: u32,
    /// Incremented when a full refetch restarts the range from scratch.
    generation: u64,
    /// Set once the one-shot full refetch has been spent.
    refetched: bool,
    /// Cleared after a refetch: the believed length is stale, so a
    /// short body means natural end rather than a transient failure.
    length_trusted: bool,
}

impl ResumableStream {
    /// Opens a stream for `range`, or for the whole content when `None`.
    pub fn open(
        transport: Arc<dyn ContentTransport>,
        endpoint: SourceEndpoint,
        range: Option<ByteRange>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let request = send_owned(Arc::clone(&transport), endpoint.get(range));
        Self {
            transport,
            endpoint,
            range: range.unwrap_or_else(|| ByteRange::from_offset(0)),
            retry,
            state: StreamState::Connecting {
                request,
                refetch: false,
            },
            cancelled: Box::pin(cancel.cancelled_owned()),
            emitted: 0,
            discard: 0,
            attempts: 0,
            generation: 0,
            refetched: false,
            length_trusted: true,
        }
    }

    /// Adopts an already-received response body as the first segment of
    /// `range`. Used by the parallel path, where the first request has
    /// already been issued and its headers inspected.
    pub fn from_response(
        transport: Arc<dyn ContentTransport>,
        endpoint: SourceEndpoint,
        range: ByteRange,
        body: BodyStream,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            endpoint,
            range,
            retry,
            state: StreamState::Streaming { body },
            cancelled: Box::pin(cancel.cancelled_owned()),
            emitted: 0,
            discard: 0,
            attempts: 0,
            generation: 0,
            refetched: false,
            length_trusted: true,
        }
    }

    /// Restart marker. Changes when a full refetch has restarted the
    /// requested range from its beginning; a consumer seeing a new
    /// value must discard whatever it built from earlier frames.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The range this stream produces.
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Bytes still owed, when the requested range is bounded.
    fn remaining(&self) -> Option<u64> {
        self.range.length.map(|length| length - self.emitted)
    }

    fn fail(&mut self, error: DownloadError) -> Poll<Option<Result<Bytes, DownloadError>>> {
        self.state = StreamState::Failed;
        Poll::Ready(Some(Err(error)))
    }

    /// Records one transport failure. Returns the fatal error when the
    /// consecutive-failure budget is spent, otherwise schedules a
    /// backed-off retry.
    fn handle_failure(&mut self, error: TransportError, refetch: bool) -> Option<DownloadError> {
        self.attempts += 1;
        if self.attempts > self.retry.max_retries {
            return Some(DownloadError::RetriesExhausted {
                attempts: self.attempts,
                source: error,
            });
        }
        let delay = self.retry.delay_for_attempt(self.attempts - 1);
        tracing::warn!(
            url = %self.endpoint.url(),
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Stream interrupted, scheduling resume"
        );
        self.state = StreamState::Retrying {
            delay: Box::pin(tokio::time::sleep(delay)),
            refetch,
        };
        None
    }

    /// The request that resumes this stream past the last emitted byte.
    fn resume_request(&self) -> TransportRequest {
        let resume = if self.length_trusted {
            self.range.advance(self.emitted)
        } else {
            // The believed end is stale after a refetch; leave it open.
            ByteRange::from_offset(self.range.offset + self.emitted)
        };
        self.endpoint.get(Some(resume))
    }
}

impl Stream for ResumableStream {
    type Item = Result<Bytes, DownloadError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.state, StreamState::Done | StreamState::Failed) {
            return Poll::Ready(None);
        }

        // Cancellation must wake the stream even while the body is idle.
        if this.cancelled.as_mut().poll(cx).is_ready() {
            return this.fail(DownloadError::Cancelled);
        }

        loop {
            match &mut this.state {
                StreamState::Connecting { request, refetch } => {
                    let refetch = *refetch;
                    let polled = request.as_mut().poll(cx);
                    match polled {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(error)) => {
                            if let Some(fatal) = this.handle_failure(error, refetch) {
                                return this.fail(fatal);
                            }
                        }
                        Poll::Ready(Ok(response)) if refetch => match response.status {
                            HTTP_OK | HTTP_PARTIAL_CONTENT => {
                                // The refetch restarts the requested range
                                // from its beginning; consumers rewind via
                                // the generation counter.
                                this.generation += 1;
                                this.emitted = 0;
                                this.discard = this.range.offset;
                                this.length_trusted = false;
                                this.state = StreamState::Streaming {
                                    body: response.body,
                                };
                            }
                            status => return this.fail(DownloadError::service(status)),
                        },
                        Poll::Ready(Ok(response)) => match response.status {
                            HTTP_PARTIAL_CONTENT => {
                                // Body starts exactly at the resume position.
                                this.discard = 0;
                                this.state = StreamState::Streaming {
                                    body: response.body,
                                };
                            }
                            HTTP_OK => {
                                // The server ignored the range; skip the
                                // prefix it sent anyway.
                                this.discard = this.range.offset + this.emitted;
                                this.state = StreamState::Streaming {
                                    body: response.body,
                                };
                            }
                            HTTP_RANGE_NOT_SATISFIABLE => {
                                if this.refetched {
                                    return this
                                        .fail(DownloadError::service(HTTP_RANGE_NOT_SATISFIABLE));
                                }
                                this.refetched = true;
                                tracing::warn!(
                                    url = %this.endpoint.url(),
                                    "Range no longer satisfiable, refetching content in full"
                                );
                                let request = send_owned(
                                    Arc::clone(&this.transport),
                                    this.endpoint.get(None),
                                );
                                this.state = StreamState::Connecting {
                                    request,
                                    refetch: true,
                                };
                            }
                            status => return this.fail(DownloadError::service(status)),
                        },
                    }
                }
                StreamState::Streaming { body } => {
                    let polled = body.as_mut().poll_next(cx);
                    match polled {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(mut bytes))) => {
                            // Splice: drop body bytes preceding the
                            // position we resumed from.
                            if this.discard > 0 {
                                if (bytes.len() as u64) <= this.discard {
                                    this.discard -= bytes.len() as u64;
                                    continue;
                                }
                                let _ = bytes.split_to(this.discard as usize);
                                this.discard = 0;
                            }
                            // Never emit past the requested range.
                            if let Some(remaining) = this.remaining() {
                                if (bytes.len() as u64) > remaining {
                                    bytes.truncate(remaining as usize);
                                }
                            }
                            if bytes.is_empty() {
                                continue;
                            }
                            this.emitted += bytes.len() as u64;
                            this.attempts = 0;
                            if this.remaining() == Some(0) {
                                this.state = StreamState::Done;
                            }
                            return Poll::Ready(Some(Ok(bytes)));
                        }
                        Poll::Ready(Some(Err(error))) => {
                            if let Some(fatal) = this.handle_failure(error, false) {
                                return this.fail(fatal);
                            }
                        }
                        Poll::Ready(None) => match this.remaining() {
                            Some(missing) if missing > 0 && this.length_trusted => {
                                // The server closed early; resume for the
                                // remainder.
                                let error = TransportError::Body(format!(
                                    "body ended {} bytes short",
                                    missing
                                ));
                                if let Some(fatal) = this.handle_failure(error, false) {
                                    return this.fail(fatal);
                                }
                            }
                            _ => {
                                this.state = StreamState::Done;
                                return Poll::Ready(None);
                            }
                        },
                    }
                }
                StreamState::Retrying { delay, refetch } => {
                    let refetch = *refetch;
                    if delay.as_mut().poll(cx).is_pending() {
                        return Poll::Pending;
                    }
                    let request = if refetch {
                        this.endpoint.get(None)
                    } else {
                        this.resume_request()
                    };
                    this.state = StreamState::Connecting {
                        request: send_owned(Arc::clone(&this.transport), request),
                        refetch,
                    };
                }
                StreamState::Done | StreamState::Failed => return Poll::Ready(None),
            }
        }
    }
}

impl std::fmt::Debug for ResumableStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableStream")
            .field("range", &self.range)
            .field("emitted", &self.emitted)
            .field("attempts", &self.attempts)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
