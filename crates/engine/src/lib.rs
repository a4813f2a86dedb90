//! Metadata engine for docshape
//!
//! This crate ties the lower layers together:
//! - Schema inference: sampled documents → resource model + provider types
//! - MetadataCache: one populated metadata entry per store identity
//! - DocumentProvider: metadata lookups, query execution, change tracking
//! - ResourceStream: lazily converted query results
//!
//! The engine is the only component that knows about:
//! - When metadata is populated and when it is refreshed
//! - Dynamic discovery from documents read at query time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod inference;
pub mod provider;
pub mod stream;

pub use cache::MetadataCache;
pub use inference::{fold_into, infer_metadata};
pub use provider::{DocumentProvider, QueryOutcome};
pub use stream::ResourceStream;
