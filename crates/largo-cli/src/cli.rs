//! Argument parsing, logging setup, and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use largo_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use url::Url;

use crate::client::{AppContext, CliDependencies, CliResult};
use crate::commands::locks::{handle_lock, handle_locks, handle_unlock};
use crate::commands::transfer::{handle_fetch, handle_push};
use crate::output::render_metrics;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parses CLI arguments, executes the requested command, and reports failures.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: LogFormat::for_output(cli.json),
        build_sha: option_env!("LARGO_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging unavailable: {err}");
    }

    let deps = match CliDependencies::from_env(&cli) {
        Ok(deps) => deps,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let show_metrics = cli.metrics;
    let result = dispatch(cli, &deps).await;
    if show_metrics {
        render_metrics(&deps.metrics);
    }

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli, deps: &CliDependencies) -> CliResult<()> {
    let endpoint = cli.url.as_ref().map(Url::to_string);
    let ctx = AppContext::discover(&cli, deps, endpoint).await?;

    match cli.command {
        Command::Lock(args) => handle_lock(&ctx, args).await,
        Command::Unlock(args) => handle_unlock(&ctx, args).await,
        Command::Locks(args) => handle_locks(&ctx, args).await,
        Command::Push(args) => handle_push(&ctx, args).await,
        Command::Fetch(args) => handle_fetch(&ctx, args).await,
    }
}

#[derive(Parser)]
#[command(
    name = "largo",
    version,
    about = "Large-object transfer and file locking for git repositories"
)]
pub(crate) struct Cli {
    #[arg(long, short = 'r', global = true, env = "LARGO_REMOTE")]
    pub(crate) remote: Option<String>,
    #[arg(
        long,
        global = true,
        env = "LARGO_URL",
        value_parser = parse_url,
        help = "Use this endpoint instead of the one configured for the remote"
    )]
    pub(crate) url: Option<Url>,
    #[arg(long, global = true, help = "Render results and logs as JSON")]
    pub(crate) json: bool,
    #[arg(
        long,
        global = true,
        env = "LARGO_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[arg(long, global = true, env = "LARGO_LOG", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(
        long,
        global = true,
        help = "Print transfer metrics to stderr when the command finishes"
    )]
    pub(crate) metrics: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Lock a file on the remote.
    Lock(LockArgs),
    /// Release a lock by path or identifier.
    Unlock(UnlockArgs),
    /// List locks held on the remote.
    Locks(LocksArgs),
    /// Upload the objects referenced by pointer files under the given paths.
    Push(TransferArgs),
    /// Download the objects referenced by pointer files under the given paths.
    Fetch(TransferArgs),
}

#[derive(Args)]
pub(crate) struct LockArgs {
    #[arg(help = "File to lock, relative to the working directory")]
    pub(crate) path: String,
}

#[derive(Args)]
pub(crate) struct UnlockArgs {
    #[arg(help = "File to unlock", required_unless_present = "id", conflicts_with = "id")]
    pub(crate) path: Option<String>,
    #[arg(long, help = "Lock identifier to release")]
    pub(crate) id: Option<String>,
    #[arg(long, help = "Release a lock held by someone else")]
    pub(crate) force: bool,
}

#[derive(Args, Default)]
pub(crate) struct LocksArgs {
    #[arg(long)]
    pub(crate) path: Option<String>,
    #[arg(long)]
    pub(crate) id: Option<String>,
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    #[arg(long, help = "Split locks into ours and theirs")]
    pub(crate) verify: bool,
}

#[derive(Args, Default)]
pub(crate) struct TransferArgs {
    #[arg(help = "Paths to scan for pointer files (defaults to the repository root)")]
    pub(crate) paths: Vec<PathBuf>,
}

pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    Url::parse(input).map_err(|err| format!("invalid URL '{input}': {err}"))
}
