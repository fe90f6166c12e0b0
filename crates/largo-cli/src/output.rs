//! Output renderers and formatting helpers for CLI commands.

use std::path::Path;

use anyhow::anyhow;
use largo_core::{
    Direction, Lock, TransferReport, TransferStatus, TransferSummary, VerifyStatus,
};
use largo_locking::LockPartition;
use largo_telemetry::Metrics;
use serde::Serialize;

use crate::client::{CliError, CliResult};

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_lock(lock: &Lock, json: bool) -> CliResult<()> {
    if json {
        return print_json(lock);
    }
    println!("Locked {}", lock.path);
    Ok(())
}

pub(crate) fn render_unlock(lock: &Lock, json: bool) -> CliResult<()> {
    if json {
        return print_json(lock);
    }
    println!("Unlocked {}", lock.path);
    Ok(())
}

pub(crate) fn render_locks(locks: &[Lock], json: bool) -> CliResult<()> {
    if json {
        return print_json(locks);
    }
    for line in lock_lines(locks) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn render_partition(partition: &LockPartition, json: bool) -> CliResult<()> {
    if json {
        return print_json(partition);
    }
    println!("ours:");
    for line in lock_lines(&partition.ours) {
        println!("  {line}");
    }
    println!("theirs:");
    for line in lock_lines(&partition.theirs) {
        println!("  {line}");
    }
    Ok(())
}

#[must_use]
pub(crate) fn lock_lines(locks: &[Lock]) -> Vec<String> {
    let width = locks.iter().map(|lock| lock.path.len()).max().unwrap_or(0);
    locks
        .iter()
        .map(|lock| {
            format!(
                "{:<width$}  {:<16}  ID:{}",
                lock.path,
                lock.owner_name(),
                lock.id
            )
        })
        .collect()
}

pub(crate) fn render_summary(summary: &TransferSummary, json: bool) -> CliResult<()> {
    if json {
        return print_json(&SummaryView::from(summary));
    }
    for line in summary_lines(summary) {
        println!("{line}");
    }
    Ok(())
}

/// Human readable summary. Failures are listed after every success.
#[must_use]
pub(crate) fn summary_lines(summary: &TransferSummary) -> Vec<String> {
    let succeeded: Vec<&TransferReport> = summary.succeeded().collect();
    let failed: Vec<&TransferReport> = summary.failed().collect();
    let mut lines = vec![format!(
        "{} succeeded, {} failed",
        succeeded.len(),
        failed.len()
    )];
    for report in succeeded {
        lines.push(format!(
            "  {:<10} {} ({})",
            success_label(report),
            report.path.display(),
            format_bytes(report.size)
        ));
    }
    if !failed.is_empty() {
        lines.push("failed:".to_string());
        for report in failed {
            lines.push(format!(
                "  {}: {}",
                report.path.display(),
                failure_reason(report).unwrap_or_default()
            ));
        }
    }
    if let Some(err) = &summary.protocol_error {
        lines.push(format!("batch error: {err}"));
    }
    lines
}

const fn success_label(report: &TransferReport) -> &'static str {
    match (&report.status, report.direction) {
        (TransferStatus::Skipped, _) => "up-to-date",
        (_, Direction::Upload) => "uploaded",
        (_, Direction::Download) => "downloaded",
    }
}

fn failure_reason(report: &TransferReport) -> Option<String> {
    match (&report.status, &report.verify) {
        (TransferStatus::Failed(err), _) => Some(err.to_string()),
        (_, VerifyStatus::Failed(err)) => Some(err.to_string()),
        _ => None,
    }
}

#[derive(Serialize)]
struct SummaryView<'a> {
    succeeded: Vec<ReportView<'a>>,
    failed: Vec<ReportView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol_error: Option<String>,
}

impl<'a> From<&'a TransferSummary> for SummaryView<'a> {
    fn from(summary: &'a TransferSummary) -> Self {
        Self {
            succeeded: summary.succeeded().map(ReportView::from).collect(),
            failed: summary.failed().map(ReportView::from).collect(),
            protocol_error: summary.protocol_error.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    oid: &'a str,
    size: u64,
    path: &'a Path,
    direction: Direction,
    status: &'static str,
    verify: &'static str,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a TransferReport> for ReportView<'a> {
    fn from(report: &'a TransferReport) -> Self {
        Self {
            oid: &report.oid,
            size: report.size,
            path: &report.path,
            direction: report.direction,
            status: status_to_str(&report.status),
            verify: verify_to_str(&report.verify),
            attempts: report.attempts,
            error: failure_reason(report),
        }
    }
}

#[must_use]
pub(crate) const fn status_to_str(status: &TransferStatus) -> &'static str {
    match status {
        TransferStatus::Completed { .. } => "completed",
        TransferStatus::Skipped => "skipped",
        TransferStatus::Failed(_) => "failed",
    }
}

#[must_use]
pub(crate) const fn verify_to_str(verify: &VerifyStatus) -> &'static str {
    match verify {
        VerifyStatus::NotRequested => "not_requested",
        VerifyStatus::BudgetExhausted => "budget_exhausted",
        VerifyStatus::Verified => "verified",
        VerifyStatus::Failed(_) => "failed",
    }
}

/// Dump the metrics registry to stderr so stdout stays parseable.
pub(crate) fn render_metrics(metrics: &Metrics) {
    match metrics.render() {
        Ok(text) => eprint!("{text}"),
        Err(err) => eprintln!("warning: unable to render metrics: {err}"),
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}
