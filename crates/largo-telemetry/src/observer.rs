//! Progress observer that records transfer outcomes into [`Metrics`].

use largo_core::{ProgressObserver, TransferError, TransferReport, TransferStatus, VerifyStatus};
use tracing::warn;

use crate::metrics::Metrics;

/// Feeds every final report and retry into a metrics registry.
#[derive(Clone)]
pub struct MetricsObserver {
    metrics: Metrics,
}

impl MetricsObserver {
    /// Observer recording into `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Registry the observer records into.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl ProgressObserver for MetricsObserver {
    fn on_complete(&self, report: &TransferReport) {
        let direction = report.direction.as_str();
        let outcome = match &report.status {
            TransferStatus::Completed { bytes } => {
                self.metrics.add_bytes(direction, *bytes);
                "completed"
            }
            TransferStatus::Skipped => "skipped",
            TransferStatus::Failed(_) => "failed",
        };
        self.metrics.inc_transfer(direction, outcome);

        match &report.verify {
            VerifyStatus::NotRequested => {}
            VerifyStatus::BudgetExhausted => self.metrics.inc_verify("budget_exhausted"),
            VerifyStatus::Verified => self.metrics.inc_verify("verified"),
            VerifyStatus::Failed(err) => {
                warn!(oid = %report.oid, error = %err, "upload was not verified");
                self.metrics.inc_verify("failed");
            }
        }
    }

    fn on_retry(&self, oid: &str, attempt: u32, error: &TransferError) {
        warn!(oid, attempt, error = %error, "retrying transfer");
        self.metrics.inc_retry();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use largo_core::{ActionSet, Direction, Pointer, Transfer, VerifyError};

    fn report(direction: Direction, status: TransferStatus, verify: VerifyStatus) -> TransferReport {
        let transfer = Transfer::from_pointer(&Pointer::new("abc", 10, "a.bin"), ActionSet::default());
        let mut report = TransferReport::for_transfer(&transfer, direction, status);
        report.verify = verify;
        report
    }

    #[test]
    fn reports_and_retries_are_counted() -> Result<()> {
        let observer = MetricsObserver::new(Metrics::new()?);
        observer.on_complete(&report(
            Direction::Upload,
            TransferStatus::Completed { bytes: 10 },
            VerifyStatus::Verified,
        ));
        observer.on_complete(&report(
            Direction::Upload,
            TransferStatus::Completed { bytes: 10 },
            VerifyStatus::Failed(VerifyError::Status {
                oid: "abc".into(),
                status: 500,
                message: "boom".into(),
            }),
        ));
        observer.on_complete(&report(
            Direction::Download,
            TransferStatus::Skipped,
            VerifyStatus::NotRequested,
        ));
        observer.on_retry("abc", 1, &TransferError::transient("reset"));

        let snapshot = observer.metrics().snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.bytes_uploaded, 20);
        assert_eq!(snapshot.verified, 1);
        assert_eq!(snapshot.verify_failed, 1);
        assert_eq!(snapshot.retries, 1);
        Ok(())
    }
}
