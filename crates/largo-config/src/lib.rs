#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Typed settings derived from a git-config snapshot.
//!
//! Layout: `snapshot.rs` (key/value parsing), `access.rs` (per-URL access modes),
//! `endpoint.rs` (remote → endpoint URL), `model.rs` (`LfsSettings`, transfer tuning),
//! `validate.rs` (value parsers), `defaults.rs` (tuning defaults).

pub mod access;
mod defaults;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod snapshot;
mod validate;

pub use access::{AccessMode, AccessResolver, AccessRule};
pub use endpoint::endpoint_from_remote_url;
pub use error::{ConfigError, ConfigResult};
pub use model::{LfsSettings, TransferSettings};
pub use snapshot::ConfigSnapshot;
