#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Logging and metrics shared across the Largo workspace.
//!
//! Layout: `init.rs` (subscriber installation, build identifier), `metrics.rs`
//! (Prometheus registry and snapshot), `observer.rs` (progress observer feeding the
//! registry), `error.rs` (`TelemetryError`).

pub mod error;
pub mod init;
pub mod metrics;
pub mod observer;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
pub use observer::MetricsObserver;
