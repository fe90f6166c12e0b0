//! Lock flows for one command invocation.
//!
//! # Design
//! - A lock request walks `ResolvingPath -> NegotiatingRef -> RequestingLock` and ends
//!   `Locked`, `Conflict` or `Failed`; each transition is traced.
//! - The tracking ref is computed once per invocation and passed in; coordinators
//!   share no mutable state.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use largo_core::{Lock, LockError, LockResult, Ref, RefUpdate};
use tracing::{debug, info, warn};

use crate::client::{LockClient, LockPartition, LockQuery};
use crate::path::canonical_lock_path;

/// Phase of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Turning the user path into a repository path.
    ResolvingPath,
    /// Picking the remote ref the lock is scoped to.
    NegotiatingRef,
    /// Waiting for the remote authority.
    RequestingLock,
    /// The lock is held.
    Locked,
    /// Someone else holds the lock.
    Conflict,
    /// The request failed.
    Failed,
}

impl LockState {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResolvingPath => "resolving_path",
            Self::NegotiatingRef => "negotiating_ref",
            Self::RequestingLock => "requesting_lock",
            Self::Locked => "locked",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Terminal state for a finished request.
    #[must_use]
    pub const fn of<T>(result: &LockResult<T>) -> Self {
        match result {
            Ok(_) => Self::Locked,
            Err(LockError::Conflict { .. }) => Self::Conflict,
            Err(_) => Self::Failed,
        }
    }
}

impl Display for LockState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Resolves paths and talks to the lock API on behalf of one command.
#[derive(Clone)]
pub struct LockCoordinator {
    client: LockClient,
    repo_root: PathBuf,
    working_dir: PathBuf,
    remote_ref: Option<Ref>,
}

impl LockCoordinator {
    /// Coordinator for the repository at `repo_root`, invoked from `working_dir`.
    #[must_use]
    pub const fn new(client: LockClient, repo_root: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            client,
            repo_root,
            working_dir,
            remote_ref: None,
        }
    }

    /// Scope requests to the tracking side of `update`.
    #[must_use]
    pub fn with_ref_update(mut self, update: Option<&RefUpdate>) -> Self {
        self.remote_ref = update.map(|update| update.right().clone());
        self
    }

    /// Tracking ref requests are scoped to.
    #[must_use]
    pub const fn remote_ref(&self) -> Option<&Ref> {
        self.remote_ref.as_ref()
    }

    fn enter(state: LockState, target: &str) {
        debug!(state = %state, target, "lock state");
    }

    /// Resolve `input` to its canonical repository path.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Path`] when the path cannot be resolved.
    pub fn resolve(&self, input: &str) -> LockResult<String> {
        Ok(canonical_lock_path(&self.repo_root, &self.working_dir, input)?)
    }

    /// Lock the file at `input`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Conflict`] when another holder owns the lock, and any other
    /// [`LockError`] when the path or the request fails.
    pub async fn lock(&self, input: &str) -> LockResult<Lock> {
        let result = self.request_lock(input).await;
        let state = LockState::of(&result);
        match &result {
            Ok(lock) => info!(state = %state, path = %lock.path, id = %lock.id, "locked"),
            Err(err) => warn!(state = %state, input, error = %err, "lock not acquired"),
        }
        result
    }

    async fn request_lock(&self, input: &str) -> LockResult<Lock> {
        Self::enter(LockState::ResolvingPath, input);
        let path = self.resolve(input)?;

        Self::enter(LockState::NegotiatingRef, &path);
        let remote_ref = self.remote_ref.as_ref();
        if remote_ref.is_none() {
            debug!(path = %path, "no tracking ref; requesting an unscoped lock");
        }

        Self::enter(LockState::RequestingLock, &path);
        self.client.create(&path, remote_ref).await
    }

    /// Release the lock on the file at `input`, looking its id up first.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotFound`] when no lock covers the path, and any other
    /// [`LockError`] when resolution or a request fails.
    pub async fn unlock_path(&self, input: &str, force: bool) -> LockResult<Lock> {
        let path = self.resolve(input)?;
        let query = LockQuery {
            path: Some(path.clone()),
            ..LockQuery::default()
        };
        let lock = self
            .client
            .list(&query, self.remote_ref())
            .await?
            .into_iter()
            .find(|lock| lock.path == path)
            .ok_or_else(|| LockError::NotFound {
                target: path.clone(),
            })?;
        self.unlock_id(&lock.id, force).await
    }

    /// Release lock `id`.
    ///
    /// # Errors
    ///
    /// Returns the remote's refusal or a transport failure.
    pub async fn unlock_id(&self, id: &str, force: bool) -> LockResult<Lock> {
        self.client.unlock(id, force, self.remote_ref()).await
    }

    /// Locks matching `query` on the tracking ref. A `query.path` is resolved first.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Path`] for an unresolvable path filter, or the request failure.
    pub async fn locks(&self, mut query: LockQuery) -> LockResult<Vec<Lock>> {
        if let Some(input) = query.path.take() {
            query.path = Some(self.resolve(&input)?);
        }
        self.client.list(&query, self.remote_ref()).await
    }

    /// Split locks on the tracking ref into ours and theirs.
    ///
    /// # Errors
    ///
    /// Returns the request failure.
    pub async fn verify(&self) -> LockResult<LockPartition> {
        self.client.verify(self.remote_ref()).await
    }
}
