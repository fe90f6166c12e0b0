//! Typed settings derived from a configuration snapshot.
//!
//! # Design
//! - `LfsSettings` is computed once per command from the snapshot and passed down
//!   explicitly; nothing here is ambient global state.
//! - Invalid tuning values are errors, not silent defaults.

use std::time::Duration;

use largo_core::{Direction, Ref, RefUpdate};
use tracing::{debug, warn};
use url::Url;

use crate::access::{AccessMode, AccessResolver, AccessRule};
use crate::defaults::{
    ACTIVITY_TIMEOUT_SECS, BASE_RETRY_DELAY_MS, BATCH_SIZE, CONCURRENT_TRANSFERS, DEFAULT_REMOTE,
    MAX_RETRIES, MAX_RETRY_DELAY_SECS, MAX_VERIFIES,
};
use crate::endpoint::endpoint_from_remote_url;
use crate::error::{ConfigError, ConfigResult};
use crate::snapshot::ConfigSnapshot;
use crate::validate::{parse_bool, parse_positive, parse_u32, parse_u64};

/// Tuning knobs for the transfer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Worker pool size; never below one.
    pub concurrency: usize,
    /// Objects per batch negotiation.
    pub batch_size: usize,
    /// Retries after the first attempt of a transient failure.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub base_retry_delay: Duration,
    /// Ceiling on the retry delay.
    pub max_retry_delay: Duration,
    /// Verify requests allowed for the whole invocation.
    pub max_verifies: u64,
    /// Per-action timeout.
    pub activity_timeout: Duration,
    /// Stop starting new work after the first permanent failure.
    pub fail_fast: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            concurrency: CONCURRENT_TRANSFERS,
            batch_size: BATCH_SIZE,
            max_retries: MAX_RETRIES,
            base_retry_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max_retry_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
            max_verifies: MAX_VERIFIES,
            activity_timeout: Duration::from_secs(ACTIVITY_TIMEOUT_SECS),
            fail_fast: false,
        }
    }
}

impl TransferSettings {
    /// Override the pool size, clamping to the minimum of one worker.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Settings view over a git configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct LfsSettings {
    snapshot: ConfigSnapshot,
    endpoint_override: Option<String>,
}

impl LfsSettings {
    /// Wrap a snapshot.
    #[must_use]
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot,
            endpoint_override: None,
        }
    }

    /// Force every remote onto `endpoint` (e.g. from `LARGO_URL`).
    #[must_use]
    pub fn with_endpoint_override(mut self, endpoint: Option<String>) -> Self {
        self.endpoint_override = endpoint.filter(|value| !value.trim().is_empty());
        self
    }

    /// Underlying snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    /// Transfer queue tuning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a tuning key holds an invalid value.
    pub fn transfer(&self) -> ConfigResult<TransferSettings> {
        let defaults = TransferSettings::default();
        Ok(TransferSettings {
            concurrency: parse_positive(
                &self.snapshot,
                "lfs.concurrenttransfers",
                defaults.concurrency,
            )?,
            batch_size: parse_positive(&self.snapshot, "lfs.transfer.batchsize", defaults.batch_size)?,
            max_retries: parse_u32(&self.snapshot, "lfs.transfer.maxretries", defaults.max_retries)?,
            base_retry_delay: defaults.base_retry_delay,
            max_retry_delay: Duration::from_secs(parse_u64(
                &self.snapshot,
                "lfs.transfer.maxretrydelay",
                defaults.max_retry_delay.as_secs(),
            )?),
            max_verifies: parse_u64(
                &self.snapshot,
                "lfs.transfer.maxverifies",
                defaults.max_verifies,
            )?,
            activity_timeout: Duration::from_secs(
                parse_u64(
                    &self.snapshot,
                    "lfs.activitytimeout",
                    defaults.activity_timeout.as_secs(),
                )?
                .max(1),
            ),
            fail_fast: parse_bool(&self.snapshot, "lfs.transfer.failfast", defaults.fail_fast)?,
        })
    }

    /// Access rules from every `lfs.<url>.access` key. Unrecognised modes fall back
    /// to [`AccessMode::Empty`] for their URL.
    ///
    /// # Errors
    ///
    /// Returns an error when a rule URL is invalid.
    pub fn access_resolver(&self) -> ConfigResult<AccessResolver> {
        let mut rules = Vec::new();
        for (prefix, value) in self.snapshot.subsections("lfs", "access") {
            let mode = value.parse::<AccessMode>().unwrap_or_else(|err| {
                warn!(key = %format!("lfs.{prefix}.access"), error = %err, "unsupported access mode; using the default");
                AccessMode::Empty
            });
            rules.push(AccessRule::new(prefix, mode)?);
        }
        Ok(AccessResolver::new(rules))
    }

    /// Remote that pushes from `branch` go to.
    #[must_use]
    pub fn push_remote(&self, branch: Option<&str>) -> String {
        let branch_key = |variable: &str| {
            branch.and_then(|name| self.snapshot.get(&format!("branch.{name}.{variable}")))
        };
        branch_key("pushRemote")
            .or_else(|| self.snapshot.get("remote.pushDefault"))
            .or_else(|| branch_key("remote"))
            .unwrap_or(DEFAULT_REMOTE)
            .to_string()
    }

    /// Endpoint for `remote` in `direction`.
    ///
    /// Precedence: override, `lfs.pushurl`/`remote.<r>.lfspushurl` (uploads only),
    /// `lfs.url`, `remote.<r>.lfsurl`, then derived from `remote.<r>.url`.
    ///
    /// # Errors
    ///
    /// Returns an error when no endpoint can be determined or a URL is invalid.
    pub fn endpoint(&self, remote: &str, direction: Direction) -> ConfigResult<Url> {
        let explicit = self.endpoint_override.clone().or_else(|| {
            let push = match direction {
                Direction::Upload => self
                    .snapshot
                    .get("lfs.pushurl")
                    .or_else(|| self.snapshot.get(&format!("remote.{remote}.lfspushurl"))),
                Direction::Download => None,
            };
            push.or_else(|| self.snapshot.get("lfs.url"))
                .or_else(|| self.snapshot.get(&format!("remote.{remote}.lfsurl")))
                .map(str::to_string)
        });

        if let Some(explicit) = explicit {
            debug!(remote, endpoint = %explicit, "using configured endpoint");
            return Url::parse(explicit.trim_end_matches('/')).map_err(|source| {
                ConfigError::InvalidUrl {
                    value: explicit,
                    source,
                }
            });
        }

        let remote_url = self
            .snapshot
            .get(&format!("remote.{remote}.url"))
            .ok_or_else(|| ConfigError::MissingRemote {
                remote: remote.to_string(),
            })?;
        endpoint_from_remote_url(remote_url)
    }

    /// Pair `local` with the remote ref lock and transfer operations are scoped to.
    ///
    /// A branch with a configured `branch.<b>.merge` uses it unless `push.default` is
    /// `current` or `matching`; otherwise the remote ref carries the local name.
    #[must_use]
    pub fn ref_update(&self, local: Ref) -> RefUpdate {
        let push_default = self
            .snapshot
            .get("push.default")
            .map(str::to_ascii_lowercase);
        let follows_upstream = !matches!(push_default.as_deref(), Some("current" | "matching"));
        let right = local
            .name
            .strip_prefix("refs/heads/")
            .filter(|_| follows_upstream)
            .and_then(|branch| self.snapshot.get(&format!("branch.{branch}.merge")))
            .map_or_else(|| Ref::new(local.name.clone()), Ref::new);
        RefUpdate::new(local, right)
    }
}
