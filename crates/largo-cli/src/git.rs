//! Thin wrappers around the `git` binary: repository discovery, configuration, the
//! current ref, and `git credential` as a credential provider.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use largo_config::ConfigSnapshot;
use largo_core::Ref;
use largo_remote::{CredentialProvider, Credentials, RemoteResult, StaticCredentials};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use url::Url;

/// Repository the command runs in.
#[derive(Debug, Clone)]
pub(crate) struct GitRepo {
    root: PathBuf,
    git_dir: PathBuf,
    working_dir: PathBuf,
}

impl GitRepo {
    /// Locate the repository containing `working_dir`.
    pub(crate) async fn discover(working_dir: PathBuf) -> Result<Self> {
        let root = git(&working_dir, &["rev-parse", "--show-toplevel"]).await?;
        let git_dir = git(&working_dir, &["rev-parse", "--absolute-git-dir"]).await?;
        Ok(Self {
            root: PathBuf::from(root),
            git_dir: PathBuf::from(git_dir),
            working_dir,
        })
    }

    #[cfg(test)]
    pub(crate) const fn from_parts(root: PathBuf, git_dir: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            root,
            git_dir,
            working_dir,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub(crate) fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Every configuration entry visible from the repository.
    pub(crate) async fn config(&self) -> Result<ConfigSnapshot> {
        let listing = git(&self.root, &["config", "--list", "--null"]).await?;
        let snapshot = ConfigSnapshot::parse_list_nul(&listing);
        debug!(entries = snapshot.len(), "loaded git configuration");
        Ok(snapshot)
    }

    /// Branch `HEAD` points at, or `None` when detached.
    pub(crate) async fn current_ref(&self) -> Result<Option<Ref>> {
        let output = git_output(&self.root, &["symbolic-ref", "--quiet", "HEAD"], None).await?;
        if !output.status.success() {
            debug!("HEAD is detached; no tracking ref");
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(Ref::new(name)))
    }
}

async fn git_output(dir: &Path, args: &[&str], stdin: Option<&str>) -> Result<Output> {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .context("failed to write to git")?;
    }
    child
        .wait_with_output()
        .await
        .with_context(|| format!("git {} did not finish", args.join(" ")))
}

async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = git_output(dir, args, None).await?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let text = String::from_utf8(output.stdout).context("git produced non-UTF-8 output")?;
    Ok(text.trim_end_matches('\n').to_string())
}

/// Credential provider that asks `git credential` after URL and environment sources.
pub(crate) struct GitCredentials {
    dir: PathBuf,
    environment: StaticCredentials,
}

impl GitCredentials {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            environment: StaticCredentials::from_env(),
        }
    }

    async fn helper(&self, action: &str, input: &str) -> Result<String> {
        let output = git_output(&self.dir, &["credential", action], Some(input)).await?;
        if !output.status.success() {
            bail!(
                "git credential {action} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CredentialProvider for GitCredentials {
    async fn fill(&self, url: &Url) -> RemoteResult<Option<Credentials>> {
        if let Some(credentials) = Credentials::from_url(url) {
            return Ok(Some(credentials));
        }
        if let Some(credentials) = self.environment.fill(url).await? {
            return Ok(Some(credentials));
        }
        match self.helper("fill", &credential_input(url, None)).await {
            Ok(output) => Ok(parse_credential_output(&output)),
            Err(err) => {
                debug!(error = %err, "no credentials from git credential helper");
                Ok(None)
            }
        }
    }

    async fn approve(&self, url: &Url, credentials: &Credentials) {
        if let Err(err) = self
            .helper("approve", &credential_input(url, Some(credentials)))
            .await
        {
            debug!(error = %err, "git credential approve failed");
        }
    }

    async fn reject(&self, url: &Url, credentials: &Credentials) {
        if let Err(err) = self
            .helper("reject", &credential_input(url, Some(credentials)))
            .await
        {
            debug!(error = %err, "git credential reject failed");
        }
    }
}

/// Request body for `git credential`, terminated by a blank line.
pub(crate) fn credential_input(url: &Url, credentials: Option<&Credentials>) -> String {
    let mut input = format!("protocol={}\n", url.scheme());
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => input.push_str(&format!("host={host}:{port}\n")),
            None => input.push_str(&format!("host={host}\n")),
        }
    }
    let path = url.path().trim_start_matches('/');
    if !path.is_empty() {
        input.push_str(&format!("path={path}\n"));
    }
    if let Some(credentials) = credentials {
        input.push_str(&format!(
            "username={}\npassword={}\n",
            credentials.username, credentials.password
        ));
    }
    input.push('\n');
    input
}

/// Credentials from a `git credential fill` answer, when it carries both parts.
pub(crate) fn parse_credential_output(output: &str) -> Option<Credentials> {
    let mut username = None;
    let mut password = None;
    for line in output.lines() {
        match line.split_once('=') {
            Some(("username", value)) => username = Some(value),
            Some(("password", value)) => password = Some(value),
            _ => {}
        }
    }
    Some(Credentials::new(username?, password?))
}
