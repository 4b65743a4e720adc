//! Sync Module
//!
//! Tracks drift between local entities and the remote catalog: the status
//! state machine, the reconciler that drives it, and the pull/import/push
//! actions built on top.

mod reconciler;
mod service;
mod status;

pub use reconciler::{reconcile, Reconciler};
pub use service::{PullFailure, PullReport, SyncService};
pub use status::SyncStatus;
