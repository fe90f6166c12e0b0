#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Remote file locking: path canonicalisation, the lock API client, and the
//! coordinator that ties a lock to the current branch's tracking ref.
//!
//! Layout: `path.rs` (working-tree path to repository path), `client.rs` (`/locks`
//! endpoints), `coordinator.rs` (lock/unlock/list/verify flows).

pub mod client;
pub mod coordinator;
pub mod path;

pub use client::{LockClient, LockPartition, LockQuery};
pub use coordinator::{LockCoordinator, LockState};
pub use path::canonical_lock_path;
