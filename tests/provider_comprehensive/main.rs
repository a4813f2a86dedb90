//! Provider Comprehensive Test Suite
//!
//! End-to-end coverage of the public API: metadata inference, query
//! translation and execution against `MemoryStore`, and change tracking.
//!
//! ## Modules
//!
//! - `grocery`: the Bread/Milk/Wine scenario, filters and projections
//! - `discovery`: prefetch settings, dynamic discovery, key invariants
//! - `translation`: native typing of filters, ordering, legacy comparison shims
//! - `conversion`: document round-trips and model cloning
//! - `changes`: unit of work against a live store
//! - `cache`: cache sharing, reset and failure handling
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test provider_comprehensive
//!
//! # Run one module
//! cargo test --test provider_comprehensive translation::
//! ```

use std::sync::Arc;

use docshape::{
    DocumentProvider, MemoryStore, MetadataCache, MetadataConfig, PropertyValue, ResourceInstance,
    Result,
};
use serde_json::json;

pub mod cache;
pub mod changes;
pub mod conversion;
pub mod discovery;
pub mod grocery;
pub mod translation;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Route log output through the test harness (first call wins)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Store with the three grocery products
pub fn grocery_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (id, name) in [(1, "Bread"), (2, "Milk"), (3, "Wine")] {
        store
            .insert_json("Products", json!({"ID": id, "Name": name}))
            .expect("insert product");
    }
    store
}

/// Provider over a private cache so tests never share metadata
pub fn open(store: Arc<MemoryStore>, config: MetadataConfig) -> DocumentProvider {
    init_tracing();
    DocumentProvider::open_with_cache(store, config, Arc::new(MetadataCache::new()))
        .expect("open provider")
}

/// Drain a stream into instances
pub fn collect(stream: docshape::ResourceStream) -> Vec<ResourceInstance> {
    stream
        .collect::<Result<Vec<_>>>()
        .expect("stream should convert every document")
}

/// String value of a property
pub fn text(instance: &ResourceInstance, property: &str) -> String {
    match instance.get(property).expect("property should exist") {
        PropertyValue::String(s) => s.clone(),
        other => panic!("expected string for {}, got {:?}", property, other),
    }
}
