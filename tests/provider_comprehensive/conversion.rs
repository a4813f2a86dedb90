//! Conversion Tests
//!
//! Documents survive conversion to resource instances and back; frozen
//! models clone into identical, independent copies.

use super::*;
use docshape::{Document, QueryExpr, ResourceTypeKind};
use docshape_core::{to_document, to_resource_instance};
use proptest::prelude::*;

fn orders_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_json(
            "orders",
            json!({
                "customer": "Ann",
                "total": {"$numberLong": "9000000000"},
                "placed": {"$date": 1_700_000_000_000_i64},
                "address": {"city": "Oslo", "zip": "0150"},
                "lines": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 3}],
                "tags": ["gift", "express"],
                "paid": true
            }),
        )
        .unwrap();
    store
        .insert_json("orders", json!({"customer": "Bob", "total": {"$numberLong": "12"}}))
        .unwrap();
    store
}

#[test]
fn test_documents_round_trip_through_instances() {
    let store = orders_store();
    let provider = open(store.clone(), MetadataConfig::default());
    let metadata = provider.metadata();

    for document in store.documents("orders") {
        let instance = to_resource_instance(&document, &metadata, "orders").unwrap();
        let back = to_document(&instance, &metadata, "orders").unwrap();
        assert_eq!(back, document);
    }
}

#[test]
fn test_missing_fields_read_as_null() {
    let provider = open(orders_store(), MetadataConfig::default());
    let rows = collect(provider.query(&QueryExpr::new("orders")).unwrap());
    assert_eq!(text(&rows[1], "customer"), "Bob");
    assert!(rows[1].get("address").unwrap().is_null());
    assert!(rows[1].get("paid").unwrap().is_null());

    let address = rows[0].get("address").unwrap().as_complex().unwrap();
    assert_eq!(text(address, "city"), "Oslo");
    assert_eq!(rows[0].get("total").unwrap().as_i64(), Some(9_000_000_000));
}

#[test]
fn test_clone_model_is_idempotent() {
    let store = orders_store();
    store.insert_json("empty_shell", json!({"meta": {}})).unwrap();
    let provider = open(store, MetadataConfig::default());
    let frozen = provider.metadata();
    assert!(frozen.model.is_frozen());

    let first = frozen.model.clone_model();
    let second = frozen.model.clone_model();
    assert_eq!(first, second);
    assert!(!first.is_frozen());

    // Empty complex types stay representable
    let shell = first
        .types()
        .find(|t| t.kind() == ResourceTypeKind::Complex && t.name() == "empty_shell_meta")
        .unwrap();
    assert_eq!(shell.properties().len(), 1);
    assert_eq!(shell.properties()[0].name(), "empty_content");

    // Cloning a clone changes nothing further
    assert_eq!(first.clone_model(), second);
}

proptest! {
    #[test]
    fn prop_scalar_documents_round_trip(
        name in "[a-z]{1,12}",
        count in proptest::num::i64::ANY,
        ratio in -1.0e9f64..1.0e9,
        flag in proptest::bool::ANY,
    ) {
        let store = Arc::new(MemoryStore::new());
        // Seed one document so every field's native type is known
        store
            .insert_json("items", json!({
                "name": "seed",
                "count": {"$numberLong": "0"},
                "ratio": 0.5,
                "flag": false
            }))
            .unwrap();
        let provider = open(store, MetadataConfig::default());
        let metadata = provider.metadata();

        let mut document = Document::new();
        document.insert("_id", docshape::ObjectId::new());
        document.insert("name", name);
        document.insert("count", count);
        document.insert("ratio", ratio);
        document.insert("flag", flag);

        let instance = to_resource_instance(&document, &metadata, "items").unwrap();
        let back = to_document(&instance, &metadata, "items").unwrap();
        prop_assert_eq!(back, document);
    }
}
