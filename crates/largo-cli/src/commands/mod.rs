//! Command handlers grouped by concern.

pub(crate) mod locks;
pub(crate) mod transfer;
