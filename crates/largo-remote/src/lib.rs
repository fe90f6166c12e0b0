#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! HTTP plumbing shared by the batch, transfer, verify, and lock clients.
//!
//! Layout: `client.rs` (`ApiClient`, access-mode aware request execution),
//! `credentials.rs` (credential providers), `wire.rs` (media type, error bodies,
//! `Retry-After`), `error.rs` (`RemoteError` and conversions into the core taxonomy).

pub mod client;
pub mod credentials;
pub mod error;
pub mod wire;

pub use client::{ApiClient, decode, status_error, with_headers};
pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use error::{RemoteError, RemoteResult};
pub use wire::{ApiErrorBody, MEDIA_TYPE, join_endpoint, parse_retry_after};
