//! Cache Tests
//!
//! Providers over the same store share one populated entry.

use super::*;
use docshape::DocumentStore;

fn layered(store: &MemoryStore) {
    store.insert_json("layers", json!({"A": 1})).unwrap();
    store.insert_json("layers", json!({"A": 2, "B": "b"})).unwrap();
}

#[test]
fn test_shared_cache_populates_once() {
    init_tracing();
    let store = grocery_store();
    let cache = Arc::new(MetadataCache::new());
    let first =
        DocumentProvider::open_with_cache(store.clone(), MetadataConfig::default(), cache.clone())
            .unwrap();
    let scans = store.stats().scans();
    assert!(scans > 0);

    let second =
        DocumentProvider::open_with_cache(store.clone(), MetadataConfig::default(), cache.clone())
            .unwrap();
    assert_eq!(store.stats().scans(), scans);
    assert_eq!(cache.len(), 1);
    assert_eq!(first.metadata().model, second.metadata().model);
}

#[test]
fn test_first_configuration_wins() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    layered(&store);
    let cache = Arc::new(MetadataCache::new());
    let narrow = DocumentProvider::open_with_cache(
        store.clone(),
        MetadataConfig::with_prefetch(1),
        cache.clone(),
    )
    .unwrap();
    let wide =
        DocumentProvider::open_with_cache(store, MetadataConfig::default(), cache).unwrap();

    assert!(narrow.resolve_property("Docshape.layers", "B").is_none());
    assert!(wide.resolve_property("Docshape.layers", "B").is_none());
}

#[test]
fn test_reset_forces_repopulation() {
    let store = grocery_store();
    let provider = open(store.clone(), MetadataConfig::default());
    assert!(provider.resolve_set("Customers").is_none());

    store
        .insert_json("Customers", json!({"Name": "Ann"}))
        .unwrap();
    // Metadata is not rebuilt on its own
    assert!(provider.resolve_set("Customers").is_none());

    assert!(provider.cache().reset(provider.identity()));
    assert!(!provider.cache().contains(provider.identity()));
    assert!(provider.resolve_set("Customers").is_some());
    assert!(provider.cache().contains(provider.identity()));
}

#[test]
fn test_built_models_are_frozen() {
    let store = grocery_store();
    let cache = MetadataCache::new();
    let model = cache
        .build_metadata(store.as_ref(), &MetadataConfig::default())
        .unwrap();
    assert!(model.is_frozen());
    assert!(model.resolve_set("Products").is_some());

    // The cached original stays mutable for discovery
    let (_, shared) = cache.current(store.identity()).unwrap();
    assert!(!shared.model.is_frozen());
}

#[test]
fn test_global_cache_is_shared() {
    let a = MetadataCache::global();
    let b = MetadataCache::global();
    assert!(Arc::ptr_eq(&a, &b));
}
