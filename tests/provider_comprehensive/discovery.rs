//! Discovery Tests
//!
//! How much of a collection's structure the metadata exposes under each
//! prefetch setting, and the key invariants that hold regardless.

use super::*;
use docshape::{
    Expr, NativeValue, PrimitiveType, PropertyKind, QueryExpr, ResourceTypeKind, ValueType,
};
use docshape_core::{to_document, to_resource_instance};

/// Documents with one, two, then three distinct fields
fn layered_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_json("layers", json!({"A": 1})).unwrap();
    store.insert_json("layers", json!({"A": 2, "B": "b"})).unwrap();
    store
        .insert_json("layers", json!({"A": 3, "B": "b", "C": true}))
        .unwrap();
    store
}

fn exposed_fields(provider: &DocumentProvider) -> Vec<String> {
    let entity = provider.resolve_type("Docshape.layers").expect("entity type");
    entity
        .properties()
        .iter()
        .filter(|p| p.kind() != PropertyKind::Key)
        .map(|p| p.name().to_string())
        .collect()
}

#[test]
fn test_prefetch_exposes_fields_monotonically() {
    let cases: [(i64, &[&str]); 3] = [(1, &["A"]), (2, &["A", "B"]), (-1, &["A", "B", "C"])];
    for (prefetch, expected) in cases {
        let provider = open(layered_store(), MetadataConfig::with_prefetch(prefetch));
        assert_eq!(exposed_fields(&provider), expected, "prefetch {}", prefetch);
    }
}

#[test]
fn test_prefetch_zero_discovers_while_querying() {
    let config = MetadataConfig {
        update_dynamically: true,
        ..MetadataConfig::with_prefetch(0)
    };
    let provider = open(layered_store(), config);
    assert!(exposed_fields(&provider).is_empty());

    let rows = collect(provider.query(&QueryExpr::new("layers")).unwrap());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("C").unwrap(), &PropertyValue::Boolean(true));
    assert_eq!(exposed_fields(&provider), vec!["A", "B", "C"]);
}

#[test]
fn test_static_metadata_ignores_unseen_fields() {
    let provider = open(layered_store(), MetadataConfig::with_prefetch(1));
    let rows = collect(provider.query(&QueryExpr::new("layers")).unwrap());
    // Unknown fields in later documents are not surfaced
    assert!(rows[2].get("C").unwrap_err().is_structural_mismatch());
    assert_eq!(rows[2].get("A").unwrap(), &PropertyValue::Int32(3));
}

#[test]
fn test_exactly_one_key_per_entity_type() {
    let store = layered_store();
    store.insert_json("people", json!({"_id": "ann", "age": 40})).unwrap();
    store
        .insert_json("orders", json!({"address": {"city": "Oslo"}}))
        .unwrap();
    let provider = open(store, MetadataConfig::default());
    let metadata = provider.metadata();

    for ty in metadata.model.types() {
        let keys = ty
            .properties()
            .iter()
            .filter(|p| p.kind() == PropertyKind::Key)
            .count();
        match ty.kind() {
            ResourceTypeKind::Entity => assert_eq!(keys, 1, "{}", ty.full_name()),
            ResourceTypeKind::Complex => assert_eq!(keys, 0, "{}", ty.full_name()),
        }
    }

    let natural = provider
        .resolve_property("Docshape.people", "db_id")
        .unwrap();
    assert_eq!(
        natural.value_type(),
        &ValueType::Primitive(PrimitiveType::String)
    );
    let rows = collect(provider.query(&QueryExpr::new("people")).unwrap());
    assert_eq!(text(&rows[0], "db_id"), "ann");
}

#[test]
fn test_system_collections_are_not_exposed() {
    let store = layered_store();
    store
        .insert_json("system.profile", json!({"op": "query"}))
        .unwrap();
    let provider = open(store, MetadataConfig::default());
    assert!(provider.resolve_set("system.profile").is_none());
    assert!(provider.resolve_set("layers").is_some());
}

fn global_names() -> MetadataConfig {
    MetadataConfig {
        use_global_complex_type_names: true,
        ..MetadataConfig::default()
    }
}

#[test]
fn test_global_names_with_self_nested_objects() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_json("trees", json!({"node": {"node": {"node": {"v": 1}}}}))
        .unwrap();
    let provider = open(store, global_names());

    let node = provider
        .resolve_property("Docshape.trees", "node")
        .unwrap();
    assert_eq!(node.value_type(), &ValueType::Complex("Docshape.node".into()));
    let inner = provider.resolve_property("Docshape.node", "node").unwrap();
    assert_eq!(inner.value_type(), &ValueType::Complex("Docshape.node_node".into()));

    let rows = collect(provider.query(&QueryExpr::new("trees")).unwrap());
    let leaf = rows[0]
        .get("node")
        .unwrap()
        .as_complex()
        .unwrap()
        .get("node")
        .unwrap()
        .as_complex()
        .unwrap()
        .get("node")
        .unwrap()
        .as_complex()
        .unwrap();
    assert_eq!(leaf.get("v").unwrap(), &PropertyValue::Int32(1));
}

#[test]
fn test_global_names_with_mutually_nested_objects() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_json("graph", json!({"a": {"b": {"a": {"v": 1}}}}))
        .unwrap();
    store
        .insert_json("graph", json!({"b": {"a": {"w": 2}}}))
        .unwrap();
    let provider = open(store, global_names());
    let metadata = provider.metadata();

    // Both documents share `a` and `b`; the repeat below `b` gets its own type
    assert_eq!(
        provider.resolve_property("Docshape.a", "b").unwrap().value_type(),
        &ValueType::Complex("Docshape.b".into())
    );
    assert_eq!(
        provider.resolve_property("Docshape.b", "a").unwrap().value_type(),
        &ValueType::Complex("Docshape.b_a".into())
    );
    for ty in metadata.model.types() {
        for property in ty.properties() {
            if let ValueType::Complex(nested) = property.value_type() {
                assert!(!metadata.model.embeds(nested, ty.full_name()), "{}", nested);
            }
        }
    }
    assert_eq!(collect(provider.query(&QueryExpr::new("graph")).unwrap()).len(), 2);
}

#[test]
fn test_fields_with_colliding_names_both_convert() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_json("items", json!({"a-b": 1, "a_b": "x"}))
        .unwrap();
    let provider = open(store.clone(), MetadataConfig::default());
    let metadata = provider.metadata();

    let rows = collect(provider.query(&QueryExpr::new("items")).unwrap());
    assert_eq!(rows[0].get("a_b").unwrap(), &PropertyValue::Int32(1));
    assert_eq!(text(&rows[0], "a_b_1"), "x");

    let documents = store.documents("items");
    let document = &documents[0];
    let instance = to_resource_instance(document, &metadata, "items").unwrap();
    assert_eq!(&to_document(&instance, &metadata, "items").unwrap(), document);
}

#[test]
fn test_prefetch_zero_takes_key_type_from_first_document() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_json("people", json!({"_id": 7, "name": "Ann"}))
        .unwrap();
    let config = MetadataConfig {
        update_dynamically: true,
        ..MetadataConfig::with_prefetch(0)
    };
    let provider = open(store.clone(), config);
    collect(provider.query(&QueryExpr::new("people")).unwrap());

    assert_eq!(
        provider
            .resolve_property("Docshape.people", "db_id")
            .unwrap()
            .value_type(),
        &ValueType::Primitive(PrimitiveType::Int32)
    );
    let by_key = QueryExpr::new("people").filter(Expr::prop("db_id").eq(Expr::constant(7)));
    assert_eq!(provider.count(&by_key).unwrap(), 1);

    let ann = collect(provider.query(&by_key).unwrap()).remove(0);
    let mut changes = provider.begin_changes();
    let handle = changes.get_resource("people", &ann).unwrap();
    changes.set_value(handle, "name", "Bo").unwrap();
    assert_eq!(changes.save_changes().unwrap().updated, 1);
    assert_eq!(
        store.documents("people")[0].get("name"),
        Some(&NativeValue::from("Bo"))
    );
}
