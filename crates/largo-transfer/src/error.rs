//! Discovery and conduit errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while discovering pointer files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A file or directory could not be read.
    #[error("unable to read {path:?}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The directory walk failed.
    #[error("unable to walk {path:?}: {message}")]
    Walk {
        /// Path being walked.
        path: PathBuf,
        /// Walker failure description.
        message: String,
    },
    /// A file declares the pointer version but its body is invalid.
    #[error("malformed pointer {path:?}: {reason}")]
    Malformed {
        /// Pointer file path.
        path: PathBuf,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The scan task ended without a result.
    #[error("pointer scan task failed: {message}")]
    Task {
        /// Join failure description.
        message: String,
    },
}

/// Convenience alias for scan results.
pub type ScanResult<T> = Result<T, ScanError>;

/// Terminal outcome of a pointer stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The producer reported a scan failure.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The producer went away without reporting an outcome.
    #[error("pointer producer aborted without reporting an outcome")]
    ProducerAborted,
    /// `wait` was called before every pointer had been consumed.
    #[error("pointer stream waited on with {remaining} undrained pointers")]
    Undrained {
        /// Pointers discarded while draining.
        remaining: usize,
        /// Scan failure the producer reported, if any.
        scan: Option<ScanError>,
    },
}
