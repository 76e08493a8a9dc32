//! Blockfetch - parallel ranged content downloads
//!
//! This library fetches remote content over HTTP range requests: as a
//! resumable byte stream, into any async sink, or into a file using
//! concurrent fixed-size blocks with progress aggregation and
//! cleanup-on-failure.

pub mod config;
pub mod download;
pub mod error;
pub mod plan;
pub mod range;
pub mod transport;

pub use config::DownloadConfig;
pub use download::{ContentClient, DownloadSummary, ProgressReceiver, ResumableStream};
pub use error::{DownloadError, DownloadResult};
pub use range::ByteRange;
pub use transport::{ContentTransport, ReqwestTransport, SourceEndpoint};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
