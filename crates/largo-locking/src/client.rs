//! Client for the remote `/locks` endpoints.

use std::collections::HashSet;

use largo_core::{Lock, LockError, LockResult, Ref};
use largo_remote::{ApiClient, RemoteError, decode, join_endpoint, status_error};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Filters for listing locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockQuery {
    /// Only locks on this canonical path.
    pub path: Option<String>,
    /// Only the lock with this identifier.
    pub id: Option<String>,
    /// Stop after this many locks.
    pub limit: Option<usize>,
}

/// Locks held against a ref, split by holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockPartition {
    /// Locks held by the authenticated user.
    pub ours: Vec<Lock>,
    /// Locks held by anybody else.
    pub theirs: Vec<Lock>,
}

#[derive(Serialize)]
struct RefBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    path: &'a str,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    remote_ref: Option<RefBody<'a>>,
}

#[derive(Serialize)]
struct UnlockRequest<'a> {
    force: bool,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    remote_ref: Option<RefBody<'a>>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    remote_ref: Option<RefBody<'a>>,
}

#[derive(Deserialize)]
struct LockBody {
    #[serde(default)]
    lock: Option<Lock>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ListBody {
    #[serde(default)]
    locks: Vec<Lock>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct VerifyBody {
    #[serde(default)]
    ours: Vec<Lock>,
    #[serde(default)]
    theirs: Vec<Lock>,
    #[serde(default)]
    next_cursor: Option<String>,
}

fn ref_body(remote_ref: Option<&Ref>) -> Option<RefBody<'_>> {
    remote_ref.map(|remote_ref| RefBody {
        name: &remote_ref.name,
    })
}

/// Pagination cursors handed out so far in one listing.
#[derive(Default)]
struct Cursors {
    seen: HashSet<String>,
}

impl Cursors {
    /// Cursor for the next page, or `None` on the last one. A cursor the remote
    /// already handed out would restart the walk, so it is an error.
    fn advance(&mut self, next: Option<String>) -> LockResult<Option<String>> {
        let Some(next) = next.filter(|cursor| !cursor.is_empty()) else {
            return Ok(None);
        };
        if !self.seen.insert(next.clone()) {
            return Err(LockError::Malformed {
                reason: format!("remote repeated pagination cursor {next:?}"),
            });
        }
        Ok(Some(next))
    }
}

/// Client for `<endpoint>/locks`.
#[derive(Clone)]
pub struct LockClient {
    client: ApiClient,
    endpoint: Url,
}

impl LockClient {
    /// Client for the lock API under `endpoint`.
    #[must_use]
    pub const fn new(client: ApiClient, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    fn url(&self, segments: &[&str]) -> LockResult<Url> {
        let invalid = |reason: String| LockError::Transport {
            message: format!("invalid lock endpoint {}: {reason}", self.endpoint),
        };
        let mut url = join_endpoint(&self.endpoint, "locks").map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot carry a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    /// Create a lock on `path` (already canonical).
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Conflict`] carrying the existing lock when someone holds
    /// it, and [`LockError::Rejected`], [`LockError::Malformed`] or
    /// [`LockError::Transport`] for other failures.
    pub async fn create(&self, path: &str, remote_ref: Option<&Ref>) -> LockResult<Lock> {
        let url = self.url(&[])?;
        let body = CreateRequest {
            path,
            remote_ref: ref_body(remote_ref),
        };
        let response = self
            .client
            .send_json(Method::POST, &url, Some(&body))
            .await?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body: LockBody = decode(response).await?;
            return Err(match body.lock {
                Some(existing) => LockError::Conflict {
                    existing: Box::new(existing),
                },
                None => LockError::Rejected {
                    status: status.as_u16(),
                    message: body.message.unwrap_or_else(|| "lock already exists".to_string()),
                },
            });
        }
        if !status.is_success() {
            return Err(status_error(response).await.into());
        }
        let mut lock = Self::lock_from(decode(response).await?)?;
        if lock.remote_ref.is_none() {
            lock.remote_ref = remote_ref.cloned();
        }
        info!(path = %lock.path, id = %lock.id, "lock created");
        Ok(lock)
    }

    /// Release lock `id`; `force` breaks a lock held by someone else.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Rejected`] when the remote refuses, and
    /// [`LockError::Malformed`] or [`LockError::Transport`] for protocol failures.
    pub async fn unlock(&self, id: &str, force: bool, remote_ref: Option<&Ref>) -> LockResult<Lock> {
        let url = self.url(&[id, "unlock"])?;
        let body = UnlockRequest {
            force,
            remote_ref: ref_body(remote_ref),
        };
        let lock = match self
            .client
            .call_json::<_, LockBody>(Method::POST, &url, Some(&body))
            .await
        {
            Ok(body) => Self::lock_from(body)?,
            Err(RemoteError::Status { status: 404, .. }) => {
                return Err(LockError::NotFound {
                    target: id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        info!(path = %lock.path, id = %lock.id, force, "lock released");
        Ok(lock)
    }

    /// List locks matching `query`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Rejected`], [`LockError::Malformed`] or
    /// [`LockError::Transport`] when a page cannot be fetched.
    pub async fn list(&self, query: &LockQuery, remote_ref: Option<&Ref>) -> LockResult<Vec<Lock>> {
        let mut locks = Vec::new();
        let mut cursors = Cursors::default();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = self.url(&[])?;
            {
                let mut pairs = url.query_pairs_mut();
                if let Some(path) = &query.path {
                    pairs.append_pair("path", path);
                }
                if let Some(id) = &query.id {
                    pairs.append_pair("id", id);
                }
                if let Some(limit) = query.limit {
                    pairs.append_pair("limit", &limit.to_string());
                }
                if let Some(cursor) = &cursor {
                    pairs.append_pair("cursor", cursor);
                }
                if let Some(remote_ref) = remote_ref {
                    pairs.append_pair("refspec", &remote_ref.name);
                }
            }
            if url.query() == Some("") {
                url.set_query(None);
            }
            let page: ListBody = self.client.call_json::<(), _>(Method::GET, &url, None).await?;
            debug!(locks = page.locks.len(), "received lock page");
            locks.extend(page.locks);
            if let Some(limit) = query.limit
                && locks.len() >= limit
            {
                locks.truncate(limit);
                break;
            }
            match cursors.advance(page.next_cursor)? {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(locks)
    }

    /// Partition every lock held against `remote_ref` into ours and theirs.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Rejected`], [`LockError::Malformed`] or
    /// [`LockError::Transport`] when a page cannot be fetched.
    pub async fn verify(&self, remote_ref: Option<&Ref>) -> LockResult<LockPartition> {
        let url = self.url(&["verify"])?;
        let mut partition = LockPartition::default();
        let mut cursors = Cursors::default();
        let mut cursor: Option<String> = None;
        loop {
            let body = VerifyRequest {
                cursor: cursor.as_deref(),
                remote_ref: ref_body(remote_ref),
            };
            let page: VerifyBody = self
                .client
                .call_json(Method::POST, &url, Some(&body))
                .await?;
            partition.ours.extend(page.ours);
            partition.theirs.extend(page.theirs);
            match cursors.advance(page.next_cursor)? {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(
            ours = partition.ours.len(),
            theirs = partition.theirs.len(),
            "verified locks"
        );
        Ok(partition)
    }

    fn lock_from(body: LockBody) -> LockResult<Lock> {
        body.lock.ok_or_else(|| LockError::Malformed {
            reason: body
                .message
                .map_or_else(|| "response carries no lock".to_string(), |message| {
                    format!("response carries no lock: {message}")
                }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::prelude::*;
    use largo_config::AccessResolver;
    use largo_remote::StaticCredentials;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn lock_json(id: &str, path: &str, owner: &str) -> Value {
        json!({"id": id, "path": path, "owner": {"name": owner}, "locked_at": "2024-03-01T12:00:00Z"})
    }

    fn client(server: &MockServer) -> Result<LockClient> {
        let api = ApiClient::new(
            reqwest::Client::new(),
            AccessResolver::default(),
            Arc::new(StaticCredentials::none()),
        );
        Ok(LockClient::new(api, Url::parse(&server.url("/repo.git/info/lfs"))?))
    }

    #[tokio::test]
    async fn create_sends_path_and_ref() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/repo.git/info/lfs/locks")
                .json_body(json!({"path": "art/hero.psd", "ref": {"name": "refs/heads/main"}}));
            then.status(201)
                .json_body(json!({"lock": lock_json("17", "art/hero.psd", "alice")}));
        });

        let lock = client(&server)?
            .create("art/hero.psd", Some(&Ref::new("main")))
            .await?;
        mock.assert();
        assert_eq!(lock.id, "17");
        assert_eq!(lock.owner_name(), "alice");
        assert_eq!(lock.remote_ref, Some(Ref::new("main")));
        Ok(())
    }

    #[tokio::test]
    async fn created_lock_keeps_the_ref_the_remote_reported() -> Result<()> {
        let server = MockServer::start_async().await;
        let mut echoed = lock_json("18", "art/logo.psd", "alice");
        echoed["ref"] = json!({"name": "refs/heads/release"});
        server.mock(|when, then| {
            when.method(POST).path("/repo.git/info/lfs/locks");
            then.status(201).json_body(json!({"lock": echoed.clone()}));
        });

        let lock = client(&server)?
            .create("art/logo.psd", Some(&Ref::new("main")))
            .await?;
        assert_eq!(lock.remote_ref, Some(Ref::new("release")));
        Ok(())
    }

    #[tokio::test]
    async fn conflict_carries_the_existing_lock() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/repo.git/info/lfs/locks");
            then.status(409).json_body(json!({
                "lock": lock_json("3", "art/hero.psd", "bob"),
                "message": "already created lock"
            }));
        });

        let err = client(&server)?
            .create("art/hero.psd", None)
            .await
            .expect_err("conflict");
        let LockError::Conflict { existing } = err else {
            panic!("expected conflict, got {err:?}");
        };
        assert_eq!(existing.owner_name(), "bob");
        assert_eq!(
            LockError::Conflict { existing }.to_string(),
            "already locked by bob"
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejection_and_malformed_bodies_are_distinct() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/repo.git/info/lfs/locks")
                .json_body(json!({"path": "denied.bin"}));
            then.status(403).json_body(json!({"message": "no write access"}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/repo.git/info/lfs/locks")
                .json_body(json!({"path": "weird.bin"}));
            then.status(201).json_body(json!({"message": "created"}));
        });
        let client = client(&server)?;

        let denied = client.create("denied.bin", None).await.expect_err("denied");
        assert!(matches!(denied, LockError::Rejected { status: 403, ref message } if message.contains("no write access")));
        let weird = client.create("weird.bin", None).await.expect_err("malformed");
        assert!(matches!(weird, LockError::Malformed { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn unlock_posts_force_and_ref() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/repo.git/info/lfs/locks/17/unlock")
                .json_body(json!({"force": true, "ref": {"name": "refs/heads/main"}}));
            then.status(200)
                .json_body(json!({"lock": lock_json("17", "art/hero.psd", "bob")}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/repo.git/info/lfs/locks/99/unlock");
            then.status(404).json_body(json!({"message": "not found"}));
        });
        let client = client(&server)?;

        let lock = client.unlock("17", true, Some(&Ref::new("main"))).await?;
        mock.assert();
        assert_eq!(lock.path, "art/hero.psd");
        let missing = client.unlock("99", false, None).await.expect_err("missing");
        assert!(matches!(missing, LockError::NotFound { ref target } if target == "99"));
        Ok(())
    }

    #[tokio::test]
    async fn list_follows_cursors_and_honours_limit() -> Result<()> {
        let server = MockServer::start_async().await;
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/repo.git/info/lfs/locks")
                .query_param("refspec", "refs/heads/main")
                .query_param_missing("cursor");
            then.status(200).json_body(json!({
                "locks": [lock_json("1", "a.bin", "alice"), lock_json("2", "b.bin", "bob")],
                "next_cursor": "page-2"
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/repo.git/info/lfs/locks")
                .query_param("cursor", "page-2");
            then.status(200).json_body(json!({
                "locks": [lock_json("3", "c.bin", "carol")],
                "next_cursor": ""
            }));
        });
        let client = client(&server)?;
        let main = Ref::new("main");

        let all = client.list(&LockQuery::default(), Some(&main)).await?;
        assert_eq!(
            all.iter().map(|lock| lock.id.as_str()).collect::<Vec<_>>(),
            ["1", "2", "3"]
        );
        first.assert();
        second.assert();

        let limited = client
            .list(
                &LockQuery {
                    limit: Some(1),
                    ..LockQuery::default()
                },
                Some(&main),
            )
            .await?;
        assert_eq!(limited.len(), 1);
        second.assert_calls(1);
        Ok(())
    }

    #[tokio::test]
    async fn verify_partitions_ours_and_theirs() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/repo.git/info/lfs/locks/verify")
                .json_body(json!({"ref": {"name": "refs/heads/main"}}));
            then.status(200).json_body(json!({
                "ours": [lock_json("1", "a.bin", "alice")],
                "theirs": [lock_json("2", "b.bin", "bob"), lock_json("3", "c.bin", "carol")]
            }));
        });

        let partition = client(&server)?.verify(Some(&Ref::new("main"))).await?;
        mock.assert();
        assert_eq!(partition.ours.len(), 1);
        assert_eq!(partition.theirs.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_cursor_ends_pagination() -> Result<()> {
        let server = MockServer::start_async().await;
        let list = server.mock(|when, then| {
            when.method(GET).path("/repo.git/info/lfs/locks");
            then.status(200).json_body(json!({"locks": [], "next_cursor": "same"}));
        });
        let verify = server.mock(|when, then| {
            when.method(POST).path("/repo.git/info/lfs/locks/verify");
            then.status(200)
                .json_body(json!({"ours": [], "theirs": [], "next_cursor": "same"}));
        });
        let client = client(&server)?;

        let listed = client.list(&LockQuery::default(), None).await;
        assert!(matches!(listed, Err(LockError::Malformed { ref reason }) if reason.contains("same")));
        list.assert_calls(2);

        let verified = client.verify(None).await;
        assert!(matches!(verified, Err(LockError::Malformed { .. })));
        verify.assert_calls(2);
        Ok(())
    }
}
