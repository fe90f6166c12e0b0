//! `push` and `fetch`: scan pointer files and run them through the transfer queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use largo_core::{Direction, TransferSummary};
use largo_telemetry::MetricsObserver;
use largo_transfer::{
    BasicAdapter, BatchClient, ObjectStore, PointerStream, RetryPolicy, ScanError, StreamError,
    TransferQueue, VerifyBudget, Verifier, pointer_channel, spawn_scan,
};
use tracing::{debug, info};

use crate::cli::TransferArgs;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_summary;

pub(crate) async fn handle_push(ctx: &AppContext, args: TransferArgs) -> CliResult<()> {
    let summary = run_transfer(ctx, Direction::Upload, &args.paths).await?;
    finish(&summary, ctx.json)
}

pub(crate) async fn handle_fetch(ctx: &AppContext, args: TransferArgs) -> CliResult<()> {
    let summary = run_transfer(ctx, Direction::Download, &args.paths).await?;
    finish(&summary, ctx.json)
}

async fn run_transfer(
    ctx: &AppContext,
    direction: Direction,
    inputs: &[PathBuf],
) -> CliResult<TransferSummary> {
    let settings = ctx.settings.transfer()?;
    let endpoint = ctx.settings.endpoint(&ctx.remote, direction)?;
    let roots = scan_roots(ctx.repo.root(), ctx.repo.working_dir(), inputs)?;
    let store = ObjectStore::for_git_dir(ctx.repo.git_dir());

    let adapter = Arc::new(BasicAdapter::new(ctx.api.clone(), store.clone()));
    let batch = BatchClient::new(ctx.api.clone(), endpoint.clone());
    let mut queue = TransferQueue::new(direction, batch, adapter, settings.clone())
        .with_observer(Arc::new(MetricsObserver::new(ctx.metrics.clone())))
        .with_ref(
            ctx.ref_update
                .as_ref()
                .map(|update| update.right().clone()),
        );

    let scan = spawn_scan(ctx.repo.root().to_path_buf(), roots, settings.batch_size);
    let stream = match direction {
        Direction::Upload => {
            queue = queue.with_verifier(Verifier::new(
                ctx.api.clone(),
                Arc::new(VerifyBudget::new(settings.max_verifies)),
                RetryPolicy::from_settings(&settings),
                settings.activity_timeout,
            ));
            scan
        }
        Direction::Download => skip_present(scan, store, settings.batch_size),
    };

    info!(
        direction = direction.as_str(),
        remote = %ctx.remote,
        endpoint = %endpoint,
        "starting transfer"
    );
    queue
        .run_stream(stream)
        .await
        .map_err(|err| CliError::failure(anyhow!(err).context("pointer scan failed")))
}

/// Scan roots relative to the repository root for `inputs` given relative to the
/// working directory. No inputs means the whole repository.
fn scan_roots(root: &Path, working_dir: &Path, inputs: &[PathBuf]) -> CliResult<Vec<PathBuf>> {
    if inputs.is_empty() {
        return Ok(vec![PathBuf::new()]);
    }
    let root = root
        .canonicalize()
        .map_err(|err| CliError::failure(anyhow!("unable to resolve repository root: {err}")))?;
    inputs
        .iter()
        .map(|input| {
            let absolute = working_dir.join(input).canonicalize().map_err(|err| {
                CliError::validation(format!("cannot read {}: {err}", input.display()))
            })?;
            absolute
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .map_err(|_| {
                    CliError::validation(format!(
                        "{} is outside the repository",
                        input.display()
                    ))
                })
        })
        .collect()
}

/// Forward only pointers whose objects are not stored locally yet.
fn skip_present(mut scan: PointerStream, store: ObjectStore, capacity: usize) -> PointerStream {
    let (tx, stream) = pointer_channel(capacity);
    tokio::spawn(async move {
        while let Some(pointer) = scan.next_pointer().await {
            if store.contains(&pointer.oid, pointer.size).await {
                debug!(oid = %pointer.oid, path = %pointer.path.display(), "object already present");
                continue;
            }
            if !tx.send(pointer).await {
                break;
            }
        }
        let outcome = match scan.wait().await {
            Ok(()) => Ok(()),
            Err(StreamError::Scan(err)) => Err(err),
            Err(other) => Err(ScanError::Task {
                message: other.to_string(),
            }),
        };
        tx.finish(outcome);
    });
    stream
}

fn finish(summary: &TransferSummary, json: bool) -> CliResult<()> {
    render_summary(summary, json)?;
    if let Some(err) = &summary.protocol_error {
        return Err(CliError::failure(anyhow::Error::new(err.clone())));
    }
    let failed = summary.failed().count();
    if failed > 0 {
        return Err(CliError::failure(anyhow!(
            "{failed} of {} objects failed",
            summary.reports.len()
        )));
    }
    Ok(())
}
