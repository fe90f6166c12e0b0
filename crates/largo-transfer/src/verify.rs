//! Post-upload verification.
//!
//! # Design
//! - The budget is one counter per invocation, passed in explicitly; every verify
//!   request (including retries) consumes one unit via decrement-if-positive.
//! - An exhausted budget is a silent success; the upload already stands.
//! - The access mode comes from the verify href itself, so a verify endpoint marked
//!   `none` never receives credentials even when its host requires them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use largo_core::{Action, Transfer, VerifyStatus};
use largo_remote::{ApiClient, MEDIA_TYPE, RemoteError, RemoteResult, status_error, with_headers};
use reqwest::header::CONTENT_TYPE;
use reqwest::Request;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::retry::{RetryPolicy, backoff};

/// Process-scoped count of verify requests still allowed.
#[derive(Debug)]
pub struct VerifyBudget {
    remaining: AtomicU64,
}

impl VerifyBudget {
    /// Budget allowing `limit` verify requests.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            remaining: AtomicU64::new(limit),
        }
    }

    /// Consume one unit if any remain.
    pub fn try_acquire(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    /// Units left.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    oid: &'a str,
    size: u64,
}

/// Confirms uploads through the `verify` action.
#[derive(Clone)]
pub struct Verifier {
    client: ApiClient,
    budget: Arc<VerifyBudget>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Verifier {
    /// Verifier drawing from `budget`.
    #[must_use]
    pub const fn new(
        client: ApiClient,
        budget: Arc<VerifyBudget>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            budget,
            retry,
            timeout,
        }
    }

    /// Budget shared by this verifier.
    #[must_use]
    pub fn budget(&self) -> &VerifyBudget {
        &self.budget
    }

    /// Build the verify request for `transfer`: `POST href` with `{oid,size}`, the
    /// action headers, and the protocol content type. Credentials are not attached here.
    ///
    /// # Errors
    ///
    /// Returns an error when the href or a header is invalid.
    pub fn request(&self, transfer: &Transfer, action: &Action) -> RemoteResult<Request> {
        let url = reqwest::Url::parse(&action.href).map_err(|err| RemoteError::Build {
            message: format!("invalid verify href: {err}"),
        })?;
        let body = VerifyBody {
            oid: &transfer.oid,
            size: transfer.size,
        };
        let request = self
            .client
            .json_request(reqwest::Method::POST, &url, Some(&body), &action.header)?;
        with_headers(request, [(CONTENT_TYPE.as_str(), MEDIA_TYPE)])
    }

    /// Verify `transfer` if the remote asked for it.
    pub async fn verify(&self, transfer: &Transfer) -> VerifyStatus {
        let (_keep_open, cancel) = watch::channel(false);
        self.verify_until_cancelled(transfer, cancel).await
    }

    /// Like [`Verifier::verify`], but stops retrying once `cancel` turns `true` and
    /// reports the last failure.
    pub async fn verify_until_cancelled(
        &self,
        transfer: &Transfer,
        mut cancel: watch::Receiver<bool>,
    ) -> VerifyStatus {
        let Some(action) = transfer.actions.verify.as_ref() else {
            return VerifyStatus::NotRequested;
        };

        let mut attempts = 0_u32;
        let mut last_error: Option<RemoteError> = None;
        loop {
            if !self.budget.try_acquire() {
                return match last_error {
                    Some(err) => {
                        warn!(oid = %transfer.oid, attempts, error = %err, "verify budget ran out while retrying");
                        VerifyStatus::Failed(err.into_verify(&transfer.oid))
                    }
                    None => {
                        debug!(oid = %transfer.oid, "verify budget exhausted; skipping");
                        VerifyStatus::BudgetExhausted
                    }
                };
            }
            attempts += 1;

            let err = match self.attempt(transfer, action).await {
                Ok(()) => {
                    debug!(oid = %transfer.oid, attempts, "upload verified");
                    return VerifyStatus::Verified;
                }
                Err(err) => err,
            };
            let retry_after = match &err {
                RemoteError::Status { retry_after, .. } => *retry_after,
                _ => None,
            };
            if !err.is_transient() || !self.retry.allows_retry(attempts) {
                warn!(oid = %transfer.oid, attempts, error = %err, "verify failed");
                return VerifyStatus::Failed(err.into_verify(&transfer.oid));
            }
            debug!(oid = %transfer.oid, attempts, error = %err, "verify failed; retrying");
            let delay = self.retry.delay(attempts, retry_after);
            if !backoff(delay, &mut cancel).await {
                debug!(oid = %transfer.oid, attempts, "verify retries cancelled");
                return VerifyStatus::Failed(err.into_verify(&transfer.oid));
            }
            last_error = Some(err);
        }
    }

    async fn attempt(&self, transfer: &Transfer, action: &Action) -> RemoteResult<()> {
        let exchange = self
            .client
            .execute(|| async { self.request(transfer, action) });
        let response = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(RemoteError::Transport {
                    url: action.href.clone(),
                    message: format!("no response within {:?}", self.timeout),
                    timeout: true,
                });
            }
        };
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}
