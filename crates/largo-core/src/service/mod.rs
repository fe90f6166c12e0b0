//! Seams implemented by transport adapters and progress consumers.

use async_trait::async_trait;

use crate::error::{TransferError, TransferResult};
use crate::model::{Action, Direction, Transfer};
use crate::report::TransferReport;

/// Performs a single server-issued transfer action.
///
/// Adapters own the byte movement only; retries, timeouts, and verification are the
/// executor's responsibility.
#[async_trait]
pub trait TransferAdapter: Send + Sync {
    /// Adapter name advertised in batch requests (e.g. `basic`).
    fn name(&self) -> &'static str;

    /// Send the object for `transfer` to the action target. Returns bytes sent.
    async fn upload(&self, transfer: &Transfer, action: &Action) -> TransferResult<u64> {
        let _ = (transfer, action);
        Err(TransferError::Unsupported {
            operation: "upload",
        })
    }

    /// Fetch the object for `transfer` from the action target. Returns bytes received.
    async fn download(&self, transfer: &Transfer, action: &Action) -> TransferResult<u64> {
        let _ = (transfer, action);
        Err(TransferError::Unsupported {
            operation: "download",
        })
    }

    /// Dispatch to the direction-specific operation.
    async fn perform(
        &self,
        direction: Direction,
        transfer: &Transfer,
        action: &Action,
    ) -> TransferResult<u64> {
        match direction {
            Direction::Upload => self.upload(transfer, action).await,
            Direction::Download => self.download(transfer, action).await,
        }
    }
}

/// Receives progress from the executor.
pub trait ProgressObserver: Send + Sync {
    /// Called exactly once per object when its outcome is final.
    fn on_complete(&self, report: &TransferReport);

    /// Called before a transient failure is retried.
    fn on_retry(&self, oid: &str, attempt: u32, error: &TransferError) {
        let _ = (oid, attempt, error);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_complete(&self, _report: &TransferReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionSet, Pointer};

    struct DownloadOnly;

    #[async_trait]
    impl TransferAdapter for DownloadOnly {
        fn name(&self) -> &'static str {
            "download-only"
        }

        async fn download(&self, transfer: &Transfer, _action: &Action) -> TransferResult<u64> {
            Ok(transfer.size)
        }
    }

    #[tokio::test]
    async fn adapter_default_methods_report_unsupported() {
        let adapter = DownloadOnly;
        let transfer =
            Transfer::from_pointer(&Pointer::new("abc", 7, "a.bin"), ActionSet::default());
        let action = Action::new("https://example.test/abc");

        assert_eq!(
            adapter
                .perform(Direction::Download, &transfer, &action)
                .await,
            Ok(7)
        );
        assert_eq!(
            adapter.perform(Direction::Upload, &transfer, &action).await,
            Err(TransferError::Unsupported {
                operation: "upload"
            })
        );
    }
}
