//! Storage layer for docshape
//!
//! This crate defines the native side of the system:
//! - DocumentStore: the contract every backend implements
//! - NativeQuery / NativeExpr / SortKey: executable native queries
//! - eval: strict filter evaluation and ordering
//! - MemoryStore: in-process store with natural-order scans and read counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod eval;
pub mod memory;
pub mod query;
pub mod traits;

pub use memory::{MemoryStore, StoreStats};
pub use query::{CompareOp, NativeExpr, NativeQuery, ScanOrder, SortKey};
pub use traits::{DocumentCursor, DocumentStore};
