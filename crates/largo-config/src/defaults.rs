//! Default tuning values for the transfer queue.
//!
//! # Design
//! - Centralize defaults so the CLI, tests, and settings parsing agree.

/// Concurrent transfer workers.
pub(crate) const CONCURRENT_TRANSFERS: usize = 8;
/// Retries after the first attempt of a transient failure.
pub(crate) const MAX_RETRIES: u32 = 8;
/// Ceiling on the exponential retry delay, in seconds.
pub(crate) const MAX_RETRY_DELAY_SECS: u64 = 10;
/// Verify requests allowed per process invocation.
pub(crate) const MAX_VERIFIES: u64 = 3;
/// Objects per batch negotiation.
pub(crate) const BATCH_SIZE: usize = 100;
/// Per-action timeout, in seconds.
pub(crate) const ACTIVITY_TIMEOUT_SECS: u64 = 30;
/// Initial retry delay, in milliseconds.
pub(crate) const BASE_RETRY_DELAY_MS: u64 = 250;
/// Remote used when nothing else is configured.
pub(crate) const DEFAULT_REMOTE: &str = "origin";
