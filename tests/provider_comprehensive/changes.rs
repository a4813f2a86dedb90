//! Change Tracking Tests
//!
//! Units of work opened from a provider and replayed against the store.

use super::*;
use docshape::{ChangeKind, Error, Expr, QueryExpr};

fn by_name(provider: &DocumentProvider, name: &str) -> ResourceInstance {
    let query = QueryExpr::new("Products").filter(Expr::prop("Name").eq(Expr::constant(name)));
    let mut rows = collect(provider.query(&query).unwrap());
    assert_eq!(rows.len(), 1, "{} should match once", name);
    rows.remove(0)
}

#[test]
fn test_insert_update_delete_round_trip() {
    let store = grocery_store();
    let provider = open(store.clone(), MetadataConfig::default());

    let mut changes = provider.begin_changes();
    let cheese = changes.create_resource("Products").unwrap();
    changes.set_value(cheese, "ID", 4).unwrap();
    changes.set_value(cheese, "Name", "Cheese").unwrap();

    let milk = changes
        .get_resource("Products", &by_name(&provider, "Milk"))
        .unwrap();
    changes.set_value(milk, "Name", "Oat milk").unwrap();

    let wine = changes
        .get_resource("Products", &by_name(&provider, "Wine"))
        .unwrap();
    changes.delete_resource(wine).unwrap();

    let kinds: Vec<ChangeKind> = changes.pending_changes().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
    );

    let saved = changes.save_changes().unwrap();
    assert_eq!((saved.inserted, saved.updated, saved.deleted), (1, 1, 1));
    assert!(!changes.has_changes());

    let names: Vec<String> = collect(provider.query(&QueryExpr::new("Products")).unwrap())
        .iter()
        .map(|r| text(r, "Name"))
        .collect();
    assert_eq!(names, vec!["Bread", "Oat milk", "Cheese"]);

    // The inserted resource now carries its store-assigned key
    let stored = by_name(&provider, "Cheese");
    assert_eq!(
        changes.resolve_resource(cheese).unwrap().get("db_id").unwrap(),
        stored.get("db_id").unwrap()
    );
}

#[test]
fn test_setting_null_removes_field() {
    let store = grocery_store();
    let provider = open(store.clone(), MetadataConfig::default());
    let mut changes = provider.begin_changes();
    let bread = changes
        .get_resource("Products", &by_name(&provider, "Bread"))
        .unwrap();
    changes.set_value(bread, "ID", PropertyValue::Null).unwrap();
    changes.save_changes().unwrap();

    let documents = store.documents("Products");
    assert!(!documents[0].contains_key("ID"));
    assert!(by_name(&provider, "Bread").get("ID").unwrap().is_null());
}

#[test]
fn test_clear_changes_discards_everything() {
    let store = grocery_store();
    let provider = open(store.clone(), MetadataConfig::default());
    let mut changes = provider.begin_changes();
    let extra = changes.create_resource("Products").unwrap();
    changes.set_value(extra, "Name", "Jam").unwrap();
    changes.clear_changes();

    assert_eq!(changes.save_changes().unwrap().total(), 0);
    assert_eq!(store.documents("Products").len(), 3);
}

#[test]
fn test_invalid_changes_are_rejected() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let mut changes = provider.begin_changes();
    assert!(matches!(
        changes.create_resource("Customers"),
        Err(Error::UnknownResourceSet(_))
    ));

    let bread = changes
        .get_resource("Products", &by_name(&provider, "Bread"))
        .unwrap();
    assert!(changes
        .set_value(bread, "Price", 1)
        .unwrap_err()
        .is_structural_mismatch());
    assert!(matches!(
        changes.set_value(bread, "Name", 5),
        Err(Error::InvalidPropertyType { .. })
    ));
    assert!(!changes.has_changes());
}
