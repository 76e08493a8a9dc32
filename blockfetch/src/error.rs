//! Error types for download operations.

use std::io;
use std::path::PathBuf;

use crate::transport::TransportError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while fetching content.
#[derive(Debug)]
pub enum DownloadError {
    /// The transport failed before any retry budget applied.
    Transport(TransportError),

    /// The service answered with a non-success status.
    Service { status: u16, message: String },

    /// Too many consecutive transport failures without progress.
    RetriesExhausted { attempts: u32, source: TransportError },

    /// A local file operation failed.
    Io { path: PathBuf, source: io::Error },

    /// Writing to the caller-supplied sink failed.
    Sink(io::Error),

    /// The download was cancelled before it completed.
    Cancelled,
}

impl DownloadError {
    /// Builds the service error for a rejected status code.
    pub fn service(status: u16) -> Self {
        Self::Service {
            status,
            message: format!("Service Request failed! Status: {}", status),
        }
    }

    /// True when the failure was a cancellation rather than an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(source) => write!(f, "transfer failed: {}", source),
            Self::Service { message, .. } => write!(f, "{}", message),
            Self::RetriesExhausted { attempts, source } => {
                write!(f, "giving up after {} attempts: {}", attempts, source)
            }
            Self::Io { path, source } => {
                write!(f, "file operation failed for {}: {}", path.display(), source)
            }
            Self::Sink(source) => write!(f, "failed to write output: {}", source),
            Self::Cancelled => write!(f, "download cancelled"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(source) => Some(source),
            Self::RetriesExhausted { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Sink(source) => Some(source),
            _ => None,
        }
    }
}

impl From<TransportError> for DownloadError {
    fn from(source: TransportError) -> Self {
        Self::Transport(source)
    }
}
