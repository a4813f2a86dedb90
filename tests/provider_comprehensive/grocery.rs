//! Grocery Scenario Tests
//!
//! Three products `{ID, Name}`: Bread, Milk, Wine.

use super::*;
use docshape::{Error, Expr, QueryExpr};

#[test]
fn test_filter_by_name_returns_single_instance() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let query = QueryExpr::new("Products").filter(Expr::prop("Name").eq(Expr::constant("Milk")));

    let rows = collect(provider.query(&query).unwrap());

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ID").unwrap(), &PropertyValue::Int32(2));
    assert_eq!(text(&rows[0], "Name"), "Milk");
}

#[test]
fn test_projection_without_id_rejects_reading_id() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let query = QueryExpr::new("Products").select(vec![Expr::prop("Name")]);

    let rows = collect(provider.query(&query).unwrap());

    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.len(), 1);
        let err = row.get("ID").unwrap_err();
        assert!(err.is_structural_mismatch(), "got {:?}", err);
    }
    let names: Vec<String> = rows.iter().map(|r| text(r, "Name")).collect();
    assert_eq!(names, vec!["Bread", "Milk", "Wine"]);
}

#[test]
fn test_every_row_carries_synthetic_key() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let rows = collect(provider.query(&QueryExpr::new("Products")).unwrap());
    for row in &rows {
        let key = text(row, "db_id");
        assert_eq!(key.len(), 24, "object id hex: {}", key);
    }
}

#[test]
fn test_unknown_property_fails_before_store_access() {
    let store = grocery_store();
    let provider = open(store.clone(), MetadataConfig::default());
    store.stats().reset();

    let query = QueryExpr::new("Products").filter(Expr::prop("Price").gt(Expr::constant(1)));
    let err = provider.query(&query).unwrap_err();

    assert!(err.is_structural_mismatch());
    assert_eq!(store.stats().queries(), 0);
}

#[test]
fn test_unknown_set_is_reported() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let err = provider.query(&QueryExpr::new("Customers")).unwrap_err();
    assert!(matches!(err, Error::UnknownResourceSet(ref name) if name == "Customers"));
}

#[test]
fn test_paging_and_count() {
    let provider = open(grocery_store(), MetadataConfig::default());
    let page = QueryExpr::new("Products")
        .order_by_desc(Expr::prop("ID"))
        .skip(1)
        .take(5);
    let names: Vec<String> = collect(provider.query(&page).unwrap())
        .iter()
        .map(|r| text(r, "Name"))
        .collect();
    assert_eq!(names, vec!["Milk", "Bread"]);

    let not_milk =
        QueryExpr::new("Products").filter(Expr::prop("Name").ne(Expr::constant("Milk")));
    assert_eq!(provider.count(&not_milk).unwrap(), 2);
}
