#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Transfer orchestration: pointer discovery, batch negotiation, concurrent action
//! execution, and post-upload verification.
//!
//! Layout: `stream.rs` (bounded pointer conduit), `scan.rs` (pointer file discovery),
//! `batch.rs` (batch protocol client), `store.rs` (local object storage),
//! `adapter.rs` (basic HTTP adapter), `retry.rs` (backoff policy), `verify.rs`
//! (verify budget and verifier), `queue.rs` (worker pool and coordinator),
//! `error.rs` (`ScanError`, `StreamError`).

pub mod adapter;
pub mod batch;
pub mod error;
pub mod queue;
pub mod retry;
pub mod scan;
pub mod store;
pub mod stream;
pub mod verify;

pub use adapter::BasicAdapter;
pub use batch::{BatchClient, BatchItem};
pub use error::{ScanError, ScanResult, StreamError};
pub use queue::TransferQueue;
pub use retry::RetryPolicy;
pub use scan::{format_pointer, parse_pointer, spawn_scan};
pub use store::{ObjectStore, sha256_hex};
pub use stream::{PointerSender, PointerStream, collect_pointers, pointer_channel};
pub use verify::{VerifyBudget, Verifier};
