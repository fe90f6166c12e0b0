//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration stays private; callers record through typed methods.
//! - Label values are fixed strings so cardinality is bounded by direction and outcome.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Metrics registry for one invocation.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    transfers_total: IntCounterVec,
    transfer_bytes_total: IntCounterVec,
    transfer_retries_total: IntCounter,
    verify_requests_total: IntCounterVec,
}

/// Point-in-time view of the transfer counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Objects whose primary action completed.
    pub completed: u64,
    /// Objects that needed no action.
    pub skipped: u64,
    /// Objects that failed permanently.
    pub failed: u64,
    /// Bytes sent by uploads.
    pub bytes_uploaded: u64,
    /// Bytes received by downloads.
    pub bytes_downloaded: u64,
    /// Transient failures that were retried.
    pub retries: u64,
    /// Verify requests the remote confirmed.
    pub verified: u64,
    /// Verify requests that failed.
    pub verify_failed: u64,
    /// Verifications skipped because the budget ran out.
    pub verify_skipped: u64,
}

const DIRECTIONS: [&str; 2] = ["upload", "download"];

impl Metrics {
    /// Construct a registry with the transfer collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let transfers_total = counter_vec(
            "transfers_total",
            "Objects finished by direction and outcome",
            &["direction", "outcome"],
        )?;
        let transfer_bytes_total = counter_vec(
            "transfer_bytes_total",
            "Object bytes moved by direction",
            &["direction"],
        )?;
        let transfer_retries_total = IntCounter::with_opts(Opts::new(
            "transfer_retries_total",
            "Transient transfer failures that were retried",
        ))
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "transfer_retries_total",
            source,
        })?;
        let verify_requests_total = counter_vec(
            "verify_requests_total",
            "Post-upload verifications by outcome",
            &["outcome"],
        )?;

        register(&registry, "transfers_total", &transfers_total)?;
        register(&registry, "transfer_bytes_total", &transfer_bytes_total)?;
        register(&registry, "transfer_retries_total", &transfer_retries_total)?;
        register(&registry, "verify_requests_total", &verify_requests_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                transfers_total,
                transfer_bytes_total,
                transfer_retries_total,
                verify_requests_total,
            }),
        })
    }

    /// Count one finished object. `outcome` is `completed`, `skipped`, or `failed`.
    pub fn inc_transfer(&self, direction: &str, outcome: &str) {
        self.inner
            .transfers_total
            .with_label_values(&[direction, outcome])
            .inc();
    }

    /// Add moved bytes for `direction`.
    pub fn add_bytes(&self, direction: &str, bytes: u64) {
        self.inner
            .transfer_bytes_total
            .with_label_values(&[direction])
            .inc_by(bytes);
    }

    /// Count one retried transient failure.
    pub fn inc_retry(&self) {
        self.inner.transfer_retries_total.inc();
    }

    /// Count one verification. `outcome` is `verified`, `failed`, or `budget_exhausted`.
    pub fn inc_verify(&self, outcome: &str) {
        self.inner
            .verify_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a snapshot of the transfer counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let transfers = |outcome: &str| -> u64 {
            DIRECTIONS
                .iter()
                .map(|direction| {
                    self.inner
                        .transfers_total
                        .with_label_values(&[*direction, outcome])
                        .get()
                })
                .sum()
        };
        let bytes = |direction: &str| {
            self.inner
                .transfer_bytes_total
                .with_label_values(&[direction])
                .get()
        };
        let verify = |outcome: &str| {
            self.inner
                .verify_requests_total
                .with_label_values(&[outcome])
                .get()
        };
        MetricsSnapshot {
            completed: transfers("completed"),
            skipped: transfers("skipped"),
            failed: transfers("failed"),
            bytes_uploaded: bytes("upload"),
            bytes_downloaded: bytes("download"),
            retries: self.inner.transfer_retries_total.get(),
            verified: verify("verified"),
            verify_failed: verify("failed"),
            verify_skipped: verify("budget_exhausted"),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
