//! Error taxonomy shared by the transfer pipeline and the lock coordinator.
//!
//! # Design
//! - One enum per failure category so callers can branch on the category, not on text.
//! - Transfer errors carry their own retry classification.
//! - A lock conflict is an expected outcome and carries the existing lock.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::Lock;

/// Failures while resolving a user-supplied path to a repository path. Always fatal.
#[derive(Debug, Error)]
pub enum PathError {
    /// The working directory could not be determined or canonicalised.
    #[error("could not resolve working directory")]
    WorkingDirectory {
        /// Underlying IO error.
        source: io::Error,
    },
    /// A path could not be canonicalised (missing file or broken symlink).
    #[error("unable to canonicalize path {path:?}")]
    Canonicalize {
        /// Path that failed to resolve.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The resolved path is outside the repository root.
    #[error("unable to canonicalize path {path:?}: outside of repository")]
    OutsideRepository {
        /// Relative path that escapes the root.
        path: String,
    },
    /// The resolved path is a directory; locks are file-scoped.
    #[error("cannot lock directory: {path}")]
    Directory {
        /// User-supplied path.
        path: String,
    },
}

/// Failures negotiating a batch with the remote.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The remote refused the batch request.
    #[error("batch request rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status returned by the remote.
        status: u16,
        /// Message reported by the remote.
        message: String,
        /// Remote request identifier, when reported.
        request_id: Option<String>,
    },
    /// The remote answered with a response that does not follow the protocol.
    #[error("malformed batch response: {reason}")]
    Malformed {
        /// What was wrong with the response.
        reason: String,
    },
    /// The batch request never produced a response.
    #[error("batch request failed: {message}")]
    Unreachable {
        /// Transport failure description.
        message: String,
    },
}

impl ProtocolError {
    /// True when the remote refused the request for lack of authorization, as opposed
    /// to a malformed or unsupported request.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403, .. })
    }
}

/// Per-object failures while executing a transfer action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Network failure, timeout, 5xx, or throttling; eligible for retry.
    #[error("transient transfer failure: {message}")]
    Transient {
        /// Failure description.
        message: String,
        /// Server-requested delay before the next attempt.
        retry_after: Option<Duration>,
    },
    /// The remote refused the action with a non-retriable status.
    #[error("transfer rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status returned by the remote.
        status: u16,
        /// Message reported by the remote.
        message: String,
    },
    /// The remote reported an error for this object in the batch response.
    #[error("remote reported object error {code}: {message}")]
    Object {
        /// Error code from the batch response.
        code: i64,
        /// Message from the batch response.
        message: String,
    },
    /// Downloaded bytes do not hash to the expected object identifier.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Object identifier that was requested.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },
    /// Received byte count does not match the declared size.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Declared object size.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },
    /// The object to upload is absent from local storage.
    #[error("object {oid} is missing from local storage")]
    MissingObject {
        /// Object identifier.
        oid: String,
    },
    /// Local storage IO failed.
    #[error("local storage failure during {operation}: {message}")]
    Storage {
        /// Operation that failed.
        operation: &'static str,
        /// Failure description.
        message: String,
    },
    /// The adapter does not implement the requested operation.
    #[error("transfer operation not supported: {operation}")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Every retry attempt failed transiently.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Description of the final failure.
        last: String,
    },
    /// The action expired and could not be renewed.
    #[error("action expired and could not be renewed")]
    Expired,
    /// The object was never negotiated because its batch failed or the run stopped.
    #[error("batch negotiation failed: {message}")]
    Unnegotiated {
        /// Reason the batch was not negotiated.
        message: String,
    },
    /// The run was cancelled before the action started.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Classify a non-success HTTP status from an action endpoint.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            Self::Transient {
                message: format!("status {status}: {message}"),
                retry_after,
            }
        } else {
            Self::Rejected { status, message }
        }
    }

    /// Build a transient error from a transport failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the executor may retry the action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Failures confirming an upload. The upload itself stands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The verify endpoint answered with a non-2xx status.
    #[error("verify of {oid} failed with status {status}: {message}")]
    Status {
        /// Object identifier.
        oid: String,
        /// HTTP status returned.
        status: u16,
        /// Message reported by the remote.
        message: String,
    },
    /// The verify request never produced a response.
    #[error("verify of {oid} failed: {message}")]
    Transport {
        /// Object identifier.
        oid: String,
        /// Transport failure description.
        message: String,
    },
}

/// Failures of a lock operation.
#[derive(Debug, Error)]
pub enum LockError {
    /// The path could not be resolved.
    #[error(transparent)]
    Path(#[from] PathError),
    /// Another holder owns the lock.
    #[error("already locked by {}", .existing.owner_name())]
    Conflict {
        /// Lock currently held on the path.
        existing: Box<Lock>,
    },
    /// The remote refused the lock request.
    #[error("lock request rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status returned by the remote.
        status: u16,
        /// Message reported by the remote.
        message: String,
    },
    /// The remote answered with a response that does not follow the protocol.
    #[error("malformed lock response: {reason}")]
    Malformed {
        /// What was wrong with the response.
        reason: String,
    },
    /// The lock request never produced a response.
    #[error("lock request failed: {message}")]
    Transport {
        /// Transport failure description.
        message: String,
    },
    /// No lock matched the requested path or identifier.
    #[error("no lock found for {target}")]
    NotFound {
        /// Path or identifier that was looked up.
        target: String,
    },
}

impl LockError {
    /// Conflicts are expected outcomes rather than failures of the client.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Convenience alias for transfer results.
pub type TransferResult<T> = Result<T, TransferError>;

/// Convenience alias for lock results.
pub type LockResult<T> = Result<T, LockError>;
