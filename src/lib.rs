//! docshape - typed metadata and query translation over schemaless document stores
//!
//! docshape infers a typed resource model from sampled documents and
//! translates property-based queries into native store queries.
//!
//! # Quick Start
//!
//! ```ignore
//! use docshape::{DocumentProvider, Expr, MemoryStore, MetadataConfig, QueryExpr};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert_json("Products", serde_json::json!({"Name": "Bread", "Price": 2.5}))?;
//!
//! let provider = DocumentProvider::open(store, MetadataConfig::default())?;
//! let cheap = QueryExpr::new("Products").filter(Expr::prop("Price").lt(Expr::constant(3)));
//! for product in provider.query(&cheap)? {
//!     println!("{:?}", product?.get("Name")?);
//! }
//! ```
//!
//! # Architecture
//!
//! Everything goes through [`DocumentProvider`]: metadata lookups, queries
//! (returned as lazily converted [`ResourceStream`]s) and change tracking.
//! Metadata is populated once per store identity and shared through the
//! [`MetadataCache`].

pub use docshape_concurrency::{
    ChangeKind, ChangeTracker, PendingChange, ResourceHandle, SaveResult,
};
pub use docshape_core::{
    Document, Error, Metadata, MetadataConfig, NativeType, NativeValue, ObjectId, PrimitiveType,
    PropertyKind, PropertyValue, ResourceInstance, ResourceModel, ResourceProperty, ResourceSet,
    ResourceType, ResourceTypeKind, Result, ValueType,
};
pub use docshape_engine::{DocumentProvider, MetadataCache, QueryOutcome, ResourceStream};
pub use docshape_query::{BinaryOp, Expr, QueryExpr, QueryOp};
pub use docshape_storage::{DocumentStore, MemoryStore};
