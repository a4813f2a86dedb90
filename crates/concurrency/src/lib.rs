//! Change tracking for docshape
//!
//! This crate implements the unit of work over resource instances:
//! - ChangeTracker: buffers create/update/delete against tracked resources
//! - PendingChange: one buffered change, replayed in recorded order
//! - SaveResult: per-kind counts of applied operations
//!
//! Replay stops at the first store failure; earlier writes are kept.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tracker;

pub use tracker::{ChangeKind, ChangeTracker, PendingChange, ResourceHandle, SaveResult};
