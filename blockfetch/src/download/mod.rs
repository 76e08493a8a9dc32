//! Ranged content downloads.
//!
//! This module provides the downloader built on the transport seam:
//! - Resumable single streams over ranged requests (`stream`)
//! - Sequential and parallel progress accounting (`progress`)
//! - Parallel multi-block orchestration with cleanup (`parallel`)
//! - The high-level client facade (`client`)
//!
//! # Architecture
//!
//! ```text
//! ContentClient (facade)
//!         │
//!         ├── ResumableStream (one ranged GET, resume on failure)
//!         │       └── ContentTransport (HTTP seam)
//!         │
//!         ├── ParallelFetch (plan blocks, fetch under semaphore,
//!         │       │          positioned writes, cleanup on failure)
//!         │       └── ResumableStream (one per block)
//!         │
//!         └── SequentialProgress / AggregateProgress
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use blockfetch::config::DownloadConfig;
//! use blockfetch::download::ContentClient;
//! use blockfetch::transport::{ReqwestTransport, SourceEndpoint};
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let client = ContentClient::new(transport, DownloadConfig::default());
//! let endpoint = SourceEndpoint::parse("https://example.com/content/42")?;
//!
//! let summary = client
//!     .download_to_file(&endpoint, "out.bin".as_ref(), true, None)
//!     .await?;
//! println!("fetched {} bytes", summary.bytes_transferred);
//! ```

mod client;
mod parallel;
mod progress;
mod stream;

pub use client::{ContentClient, DownloadSummary};
pub use progress::{AggregateProgress, ChunkProgress, ProgressReceiver, SequentialProgress};
pub use stream::ResumableStream;
