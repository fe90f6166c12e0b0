//! Shared errors, dependencies, and per-invocation context for the CLI.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use largo_config::{ConfigError, LfsSettings};
use largo_core::{Direction, LockError, RefUpdate};
use largo_locking::{LockClient, LockCoordinator};
use largo_remote::ApiClient;
use largo_telemetry::Metrics;
use reqwest::Client;

use crate::cli::Cli;
use crate::git::{GitCredentials, GitRepo};

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::validation(format!("invalid configuration: {err}"))
    }
}

impl From<LockError> for CliError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Path(_) | LockError::NotFound { .. } => Self::validation(err.to_string()),
            other => Self::failure(other),
        }
    }
}

/// Dependencies constructed from environment flags and CLI options.
#[derive(Clone)]
pub(crate) struct CliDependencies {
    pub(crate) http: Client,
    pub(crate) metrics: Metrics,
}

impl CliDependencies {
    /// Construct the HTTP client and metrics registry for one invocation.
    pub(crate) fn from_env(cli: &Cli) -> CliResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cli.timeout))
            .user_agent(concat!("largo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;
        let metrics = Metrics::new()
            .map_err(|err| CliError::failure(anyhow!("failed to build metrics registry: {err}")))?;
        Ok(Self { http, metrics })
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) repo: GitRepo,
    pub(crate) settings: LfsSettings,
    pub(crate) remote: String,
    pub(crate) ref_update: Option<RefUpdate>,
    pub(crate) api: ApiClient,
    pub(crate) metrics: Metrics,
    pub(crate) json: bool,
}

impl AppContext {
    /// Discover the repository around the current directory and resolve its settings.
    pub(crate) async fn discover(
        cli: &Cli,
        deps: &CliDependencies,
        endpoint_override: Option<String>,
    ) -> CliResult<Self> {
        let working_dir = std::env::current_dir()
            .map_err(|err| CliError::failure(anyhow!("unable to read working directory: {err}")))?;
        let repo = GitRepo::discover(working_dir)
            .await
            .map_err(|err| CliError::validation(format!("not inside a git repository: {err:#}")))?;
        let snapshot = repo.config().await.map_err(CliError::failure)?;
        let settings = LfsSettings::new(snapshot).with_endpoint_override(endpoint_override);
        let local_ref = repo.current_ref().await.map_err(CliError::failure)?;
        let branch = local_ref.as_ref().map(|local| local.short_name().to_string());
        let remote = cli
            .remote
            .clone()
            .unwrap_or_else(|| settings.push_remote(branch.as_deref()));
        let ref_update = local_ref.map(|local| settings.ref_update(local));

        let credentials = Arc::new(GitCredentials::new(repo.root().to_path_buf()));
        let api = ApiClient::new(deps.http.clone(), settings.access_resolver()?, credentials);

        Ok(Self {
            repo,
            settings,
            remote,
            ref_update,
            api,
            metrics: deps.metrics.clone(),
            json: cli.json,
        })
    }

    /// Lock coordinator scoped to the tracking ref of the current branch.
    pub(crate) fn locks(&self) -> CliResult<LockCoordinator> {
        let endpoint = self.settings.endpoint(&self.remote, Direction::Upload)?;
        let client = LockClient::new(self.api.clone(), endpoint);
        Ok(LockCoordinator::new(
            client,
            self.repo.root().to_path_buf(),
            self.repo.working_dir().to_path_buf(),
        )
        .with_ref_update(self.ref_update.as_ref()))
    }
}

#[cfg(test)]
impl AppContext {
    /// Context for a repository at `root` talking to `endpoint` without retries.
    pub(crate) fn for_tests(root: &std::path::Path, endpoint: &str) -> anyhow::Result<Self> {
        use largo_config::ConfigSnapshot;
        use largo_core::Ref;
        use largo_remote::StaticCredentials;

        let snapshot = ConfigSnapshot::from_pairs([
            ("lfs.url", endpoint),
            ("lfs.transfer.maxretries", "0"),
            ("lfs.concurrenttransfers", "2"),
        ]);
        let settings = LfsSettings::new(snapshot);
        let api = ApiClient::new(
            Client::new(),
            settings.access_resolver()?,
            Arc::new(StaticCredentials::none()),
        );
        Ok(Self {
            repo: crate::git::GitRepo::from_parts(
                root.to_path_buf(),
                root.join(".git"),
                root.to_path_buf(),
            ),
            settings,
            remote: "origin".to_string(),
            ref_update: Some(RefUpdate::new(Ref::new("main"), Ref::new("main"))),
            api,
            metrics: Metrics::new()?,
            json: false,
        })
    }
}
