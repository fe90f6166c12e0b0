//! `lock`, `unlock`, and `locks`.

use largo_locking::LockQuery;

use crate::cli::{LockArgs, LocksArgs, UnlockArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::{render_lock, render_locks, render_partition, render_unlock};

pub(crate) async fn handle_lock(ctx: &AppContext, args: LockArgs) -> CliResult<()> {
    let lock = ctx.locks()?.lock(&args.path).await?;
    render_lock(&lock, ctx.json)
}

pub(crate) async fn handle_unlock(ctx: &AppContext, args: UnlockArgs) -> CliResult<()> {
    let coordinator = ctx.locks()?;
    let lock = match (args.path, args.id) {
        (Some(path), _) => coordinator.unlock_path(&path, args.force).await?,
        (None, Some(id)) => coordinator.unlock_id(&id, args.force).await?,
        (None, None) => return Err(CliError::validation("unlock needs a path or --id")),
    };
    render_unlock(&lock, ctx.json)
}

pub(crate) async fn handle_locks(ctx: &AppContext, args: LocksArgs) -> CliResult<()> {
    let coordinator = ctx.locks()?;
    if args.verify {
        let partition = coordinator.verify().await?;
        return render_partition(&partition, ctx.json);
    }
    let query = LockQuery {
        path: args.path,
        id: args.id,
        limit: args.limit,
    };
    let locks = coordinator.locks(query).await?;
    render_locks(&locks, ctx.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::prelude::*;
    use serde_json::{Value, json};
    use std::fs;

    fn lock_json(id: &str, path: &str, owner: &str) -> Value {
        json!({"id": id, "path": path, "owner": {"name": owner}, "locked_at": "2024-03-01T12:00:00Z"})
    }

    fn context(server: &MockServer, root: &std::path::Path) -> Result<AppContext> {
        fs::create_dir_all(root.join(".git"))?;
        AppContext::for_tests(root, &server.url("/lfs"))
    }

    #[tokio::test]
    async fn lock_posts_the_repository_path() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/lfs/locks")
                .json_body(json!({"path": "hero.psd", "ref": {"name": "refs/heads/main"}}));
            then.status(201)
                .json_body(json!({"lock": lock_json("1", "hero.psd", "alice")}));
        });

        let ctx = context(&server, repo.path())?;
        let result = handle_lock(
            &ctx,
            LockArgs {
                path: "hero.psd".to_string(),
            },
        )
        .await;
        assert!(result.is_ok());
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn conflicts_exit_as_failures() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/lfs/locks");
            then.status(409).json_body(json!({
                "lock": lock_json("9", "hero.psd", "bob"),
                "message": "already created lock"
            }));
        });

        let ctx = context(&server, repo.path())?;
        let err = handle_lock(
            &ctx,
            LockArgs {
                path: "hero.psd".to_string(),
            },
        )
        .await
        .expect_err("conflict");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "already locked by bob");
        Ok(())
    }

    #[tokio::test]
    async fn paths_outside_the_repository_are_validation_errors() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/lfs/locks");
            then.status(201);
        });

        let ctx = context(&server, repo.path())?;
        let err = handle_lock(
            &ctx,
            LockArgs {
                path: "../elsewhere.psd".to_string(),
            },
        )
        .await
        .expect_err("outside");
        assert_eq!(err.exit_code(), 2);
        mock.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn unlock_by_id_skips_the_lookup() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        let list = server.mock(|when, then| {
            when.method(GET).path("/lfs/locks");
            then.status(200).json_body(json!({"locks": []}));
        });
        let unlock = server.mock(|when, then| {
            when.method(POST)
                .path("/lfs/locks/7/unlock")
                .json_body(json!({"force": true, "ref": {"name": "refs/heads/main"}}));
            then.status(200)
                .json_body(json!({"lock": lock_json("7", "hero.psd", "bob")}));
        });

        let ctx = context(&server, repo.path())?;
        let args = UnlockArgs {
            path: None,
            id: Some("7".to_string()),
            force: true,
        };
        assert!(handle_unlock(&ctx, args).await.is_ok());
        unlock.assert();
        list.assert_calls(0);
        Ok(())
    }

    #[tokio::test]
    async fn locks_verify_splits_ours_and_theirs() -> Result<()> {
        let repo = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        let verify = server.mock(|when, then| {
            when.method(POST).path("/lfs/locks/verify");
            then.status(200).json_body(json!({
                "ours": [lock_json("1", "a.psd", "alice")],
                "theirs": [lock_json("2", "b.psd", "bob")]
            }));
        });

        let ctx = context(&server, repo.path())?;
        let args = LocksArgs {
            verify: true,
            ..LocksArgs::default()
        };
        assert!(handle_locks(&ctx, args).await.is_ok());
        verify.assert();
        Ok(())
    }
}
