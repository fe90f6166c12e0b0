#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Transport-agnostic transfer and locking types shared by the Largo workspace.
//!
//! Layout: `model/` (pointers, actions, transfers, locks, refs), `report.rs`
//! (per-object outcomes), `error.rs` (the shared error taxonomy), `service/`
//! (adapter and observer seams).

pub mod error;
pub mod model;
pub mod report;
pub mod service;

pub use error::{
    LockError, LockResult, PathError, ProtocolError, TransferError, TransferResult, VerifyError,
};
pub use model::{
    Action, ActionKind, ActionSet, Direction, Lock, LockOwner, Pointer, Ref, RefUpdate, Transfer,
};
pub use report::{TransferReport, TransferStatus, TransferSummary, VerifyStatus};
pub use service::{NoopObserver, ProgressObserver, TransferAdapter};
