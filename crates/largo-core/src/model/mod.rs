//! Pointer, action, transfer, and lock data carriers.
//!
//! # Design
//! - Pure data carriers; IO and wire negotiation live in the transfer and locking crates.
//! - Server-offered actions are an enumerated set so "not offered" is a `None`, not a
//!   missing map key.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a negotiated transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local object is sent to the remote store.
    Upload,
    /// Remote object is fetched into local storage.
    Download,
}

impl Direction {
    /// Wire name used in batch requests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    /// Action kind that performs the primary work for this direction.
    #[must_use]
    pub const fn action_kind(self) -> ActionKind {
        match self {
            Self::Upload => ActionKind::Upload,
            Self::Download => ActionKind::Download,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One large-object candidate discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    /// Content hash identifying the object.
    pub oid: String,
    /// Object size in bytes.
    pub size: u64,
    /// Working-tree path the pointer was found at.
    pub path: PathBuf,
}

impl Pointer {
    /// Build a pointer from its parts.
    #[must_use]
    pub fn new(oid: impl Into<String>, size: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            oid: oid.into(),
            size,
            path: path.into(),
        }
    }
}

/// Names of the actions a remote may offer for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Write the object to the remote store.
    Upload,
    /// Read the object from the remote store.
    Download,
    /// Confirm a completed upload.
    Verify,
}

impl ActionKind {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Verify => "verify",
        }
    }
}

/// Server-issued, time-bounded capability for one network operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Target URL.
    pub href: String,
    /// Extra request headers; names compare case-insensitively.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    /// Relative lifetime in seconds, as sent by the remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Absolute expiry, as sent by the remote or anchored from `expires_in`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Action {
    /// Build an action with no headers and no expiry.
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            header: BTreeMap::new(),
            expires_in: None,
            expires_at: None,
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }

    /// Set an absolute expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Look up a header value ignoring name case.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Resolve `expires_in` against the time the action was received, keeping the
    /// earlier of the relative and absolute expiries.
    #[must_use]
    pub fn anchored(mut self, received_at: DateTime<Utc>) -> Self {
        let relative = self
            .expires_in
            .filter(|seconds| *seconds != 0)
            .and_then(ChronoDuration::try_seconds)
            .and_then(|delta| received_at.checked_add_signed(delta));
        self.expires_at = match (self.expires_at, relative) {
            (Some(absolute), Some(relative)) => Some(absolute.min(relative)),
            (absolute, relative) => absolute.or(relative),
        };
        self.expires_in = None;
        self
    }

    /// Whether the action expires before `now + window`.
    #[must_use]
    pub fn is_expired_within(&self, now: DateTime<Utc>, window: ChronoDuration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + window)
    }
}

/// Actions offered by the remote for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    /// Upload capability, when the remote wants the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<Action>,
    /// Download capability, when the remote has the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<Action>,
    /// Post-upload confirmation capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<Action>,
}

impl ActionSet {
    /// Fetch the action of the given kind.
    #[must_use]
    pub const fn get(&self, kind: ActionKind) -> Option<&Action> {
        match kind {
            ActionKind::Upload => self.upload.as_ref(),
            ActionKind::Download => self.download.as_ref(),
            ActionKind::Verify => self.verify.as_ref(),
        }
    }

    /// Fetch the action that performs the primary work for `direction`.
    #[must_use]
    pub const fn primary(&self, direction: Direction) -> Option<&Action> {
        self.get(direction.action_kind())
    }

    /// Anchor every offered action to the time the batch response arrived.
    #[must_use]
    pub fn anchored(self, received_at: DateTime<Utc>) -> Self {
        Self {
            upload: self.upload.map(|action| action.anchored(received_at)),
            download: self.download.map(|action| action.anchored(received_at)),
            verify: self.verify.map(|action| action.anchored(received_at)),
        }
    }

    /// True when no action was offered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.upload.is_none() && self.download.is_none() && self.verify.is_none()
    }
}

/// One unit of work resolved from a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Object identifier.
    pub oid: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Working-tree path of the originating pointer.
    pub path: PathBuf,
    /// Whether the remote marked the actions as pre-authenticated.
    #[serde(default)]
    pub authenticated: bool,
    /// Actions offered by the remote.
    #[serde(default)]
    pub actions: ActionSet,
}

impl Transfer {
    /// Build a transfer for `pointer` with the offered actions.
    #[must_use]
    pub fn from_pointer(pointer: &Pointer, actions: ActionSet) -> Self {
        Self {
            oid: pointer.oid.clone(),
            size: pointer.size,
            path: pointer.path.clone(),
            authenticated: false,
            actions,
        }
    }

    /// Pointer this transfer was negotiated for, used when re-batching.
    #[must_use]
    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.oid.clone(), self.size, self.path.clone())
    }
}

/// A git ref, optionally pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    /// Fully qualified name, e.g. `refs/heads/main`.
    pub name: String,
    /// Commit the ref pointed at when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl Ref {
    /// Build a ref from a fully qualified or short branch name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = if name.starts_with("refs/") {
            name
        } else {
            format!("refs/heads/{name}")
        };
        Self { name, sha: None }
    }

    /// Attach the commit the ref points at.
    #[must_use]
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Name without the `refs/heads/` or `refs/remotes/<remote>/` prefix.
    #[must_use]
    pub fn short_name(&self) -> &str {
        if let Some(branch) = self.name.strip_prefix("refs/heads/") {
            return branch;
        }
        if let Some(rest) = self.name.strip_prefix("refs/remotes/") {
            return rest.split_once('/').map_or(rest, |(_, branch)| branch);
        }
        self.name.strip_prefix("refs/tags/").unwrap_or(&self.name)
    }
}

impl Display for Ref {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)
    }
}

/// Local ref paired with the remote-tracking ref operations are scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    left: Ref,
    right: Ref,
}

impl RefUpdate {
    /// Pair a local ref with its remote-tracking ref.
    #[must_use]
    pub const fn new(left: Ref, right: Ref) -> Self {
        Self { left, right }
    }

    /// Local ref.
    #[must_use]
    pub const fn left(&self) -> &Ref {
        &self.left
    }

    /// Remote-tracking ref sent to the remote authority.
    #[must_use]
    pub const fn right(&self) -> &Ref {
        &self.right
    }
}

/// Identity recorded as the holder of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    /// Display name of the holder.
    pub name: String,
}

/// Exclusive claim on a repository path held by the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Identifier assigned by the remote.
    pub id: String,
    /// Canonical repository-relative path, always `/`-separated.
    pub path: String,
    /// Holder of the lock when reported by the remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<LockOwner>,
    /// Creation time reported by the remote.
    pub locked_at: DateTime<Utc>,
    /// Remote ref the lock was negotiated against.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<Ref>,
}

impl Lock {
    /// Holder name, or `unknown` when the remote did not report one.
    #[must_use]
    pub fn owner_name(&self) -> &str {
        self.owner.as_ref().map_or("unknown", |owner| owner.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ref_normalises_short_branch_names() {
        let branch = Ref::new("main");
        assert_eq!(branch.name, "refs/heads/main");
        assert_eq!(branch.short_name(), "main");

        let tracking = Ref::new("refs/remotes/origin/feature/x");
        assert_eq!(tracking.short_name(), "feature/x");
        assert_eq!(Ref::new("refs/tags/v1").short_name(), "v1");
    }

    #[test]
    fn action_headers_are_case_insensitive() {
        let action = Action::new("https://example.test/obj").with_header("Foo", "bar");
        assert_eq!(action.header_value("foo"), Some("bar"));
        assert_eq!(action.header_value("FOO"), Some("bar"));
        assert_eq!(action.header_value("missing"), None);
    }

    #[test]
    fn anchored_action_keeps_the_earliest_expiry() {
        let received = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("timestamp");
        let mut action = Action::new("https://example.test/obj")
            .with_expires_at(received + ChronoDuration::seconds(600));
        action.expires_in = Some(60);

        let anchored = action.anchored(received);
        assert_eq!(anchored.expires_at, Some(received + ChronoDuration::seconds(60)));
        assert_eq!(anchored.expires_in, None);
        assert!(!anchored.is_expired_within(received, ChronoDuration::seconds(5)));
        assert!(anchored.is_expired_within(
            received + ChronoDuration::seconds(56),
            ChronoDuration::seconds(5)
        ));
    }

    #[test]
    fn action_without_expiry_never_expires() {
        let action = Action::new("https://example.test/obj").anchored(Utc::now());
        assert!(!action.is_expired_within(Utc::now(), ChronoDuration::days(365)));
    }

    #[test]
    fn action_set_selects_primary_action_by_direction() {
        let actions = ActionSet {
            upload: Some(Action::new("https://example.test/up")),
            download: None,
            verify: Some(Action::new("https://example.test/verify")),
        };
        assert_eq!(
            actions.primary(Direction::Upload).map(|a| a.href.as_str()),
            Some("https://example.test/up")
        );
        assert!(actions.primary(Direction::Download).is_none());
        assert!(!actions.is_empty());
        assert!(ActionSet::default().is_empty());
    }

    #[test]
    fn action_set_ignores_unknown_actions_on_the_wire() -> anyhow::Result<()> {
        let actions: ActionSet = serde_json::from_value(serde_json::json!({
            "download": {"href": "https://example.test/dl", "header": {"Authorization": "t"}},
            "mirror": {"href": "https://example.test/mirror"}
        }))?;
        assert!(actions.upload.is_none());
        let download = actions.download.expect("download offered");
        assert_eq!(download.header_value("authorization"), Some("t"));
        Ok(())
    }

    #[test]
    fn lock_round_trips_remote_payload() -> anyhow::Result<()> {
        let lock: Lock = serde_json::from_value(serde_json::json!({
            "id": "42",
            "path": "assets/logo.psd",
            "owner": {"name": "Jane"},
            "locked_at": "2024-01-01T00:00:00Z"
        }))?;
        assert_eq!(lock.owner_name(), "Jane");
        assert!(lock.remote_ref.is_none());

        let rendered = serde_json::to_value(&lock)?;
        assert!(rendered.get("ref").is_none());
        Ok(())
    }
}
