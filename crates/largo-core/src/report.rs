//! Per-object outcomes collected by the transfer queue.

use std::path::PathBuf;

use crate::error::{ProtocolError, TransferError, VerifyError};
use crate::model::{Direction, Transfer};

/// Final state of one object's primary action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// The action ran and moved `bytes` bytes.
    Completed {
        /// Bytes transferred.
        bytes: u64,
    },
    /// The remote offered no action for this direction; nothing to do.
    Skipped,
    /// The object failed permanently.
    Failed(TransferError),
}

/// Outcome of the post-upload confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    /// No verify action was offered, or the transfer did not upload.
    NotRequested,
    /// The verify budget was exhausted; treated as success.
    BudgetExhausted,
    /// The remote confirmed the upload.
    Verified,
    /// The remote did not confirm the upload.
    Failed(VerifyError),
}

/// Exactly-once report for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Object identifier.
    pub oid: String,
    /// Declared size.
    pub size: u64,
    /// Working-tree path of the pointer.
    pub path: PathBuf,
    /// Transfer direction.
    pub direction: Direction,
    /// Primary action outcome.
    pub status: TransferStatus,
    /// Verification outcome.
    pub verify: VerifyStatus,
    /// Attempts made for the primary action.
    pub attempts: u32,
}

impl TransferReport {
    /// Report for a transfer whose primary action finished.
    #[must_use]
    pub fn for_transfer(transfer: &Transfer, direction: Direction, status: TransferStatus) -> Self {
        Self {
            oid: transfer.oid.clone(),
            size: transfer.size,
            path: transfer.path.clone(),
            direction,
            status,
            verify: VerifyStatus::NotRequested,
            attempts: 0,
        }
    }

    /// True when the primary action succeeded (or was a no-op) and verification did not fail.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.status, TransferStatus::Failed(_))
            && !matches!(self.verify, VerifyStatus::Failed(_))
    }
}

/// Aggregate result of one transfer queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// One report per distinct object.
    pub reports: Vec<TransferReport>,
    /// First batch negotiation failure, when one stopped the run.
    pub protocol_error: Option<ProtocolError>,
}

impl TransferSummary {
    /// Reports that ended in success or a no-op.
    pub fn succeeded(&self) -> impl Iterator<Item = &TransferReport> {
        self.reports.iter().filter(|report| report.is_success())
    }

    /// Reports that failed the primary action or verification.
    pub fn failed(&self) -> impl Iterator<Item = &TransferReport> {
        self.reports.iter().filter(|report| !report.is_success())
    }

    /// True when every object succeeded and no batch failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.protocol_error.is_none() && self.reports.iter().all(TransferReport::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionSet, Pointer};

    fn report(status: TransferStatus, verify: VerifyStatus) -> TransferReport {
        let transfer = Transfer::from_pointer(&Pointer::new("abc", 3, "a.bin"), ActionSet::default());
        let mut report = TransferReport::for_transfer(&transfer, Direction::Upload, status);
        report.verify = verify;
        report
    }

    #[test]
    fn verify_failure_marks_report_failed_without_touching_status() {
        let failed_verify = report(
            TransferStatus::Completed { bytes: 3 },
            VerifyStatus::Failed(VerifyError::Status {
                oid: "abc".into(),
                status: 500,
                message: "boom".into(),
            }),
        );
        assert!(!failed_verify.is_success());
        assert_eq!(failed_verify.status, TransferStatus::Completed { bytes: 3 });

        let skipped = report(TransferStatus::Skipped, VerifyStatus::BudgetExhausted);
        assert!(skipped.is_success());
    }

    #[test]
    fn summary_partitions_reports() {
        let summary = TransferSummary {
            reports: vec![
                report(TransferStatus::Completed { bytes: 3 }, VerifyStatus::Verified),
                report(
                    TransferStatus::Failed(TransferError::Cancelled),
                    VerifyStatus::NotRequested,
                ),
            ],
            protocol_error: None,
        };
        assert_eq!(summary.succeeded().count(), 1);
        assert_eq!(summary.failed().count(), 1);
        assert!(!summary.is_success());
        assert!(TransferSummary::default().is_success());
    }
}
