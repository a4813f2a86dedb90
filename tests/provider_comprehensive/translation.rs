//! Translation Tests
//!
//! Filters and orderings as the store sees them.

use super::*;
use docshape::{Error, Expr, MetadataConfig, NativeValue, QueryExpr};
use docshape_storage::{CompareOp, NativeExpr, SortKey};

fn inventory() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let rows = [
        ("Bread", 5_i64, "bakery"),
        ("Milk", 12, "dairy"),
        ("Butter", 5, "dairy"),
        ("Wine", 4_000_000_000, "cellar"),
        ("Cheese", 12, "dairy"),
    ];
    for (name, stock, aisle) in rows {
        store
            .insert_json(
                "stock",
                json!({"Name": name, "Count": {"$numberLong": stock.to_string()}, "Aisle": aisle}),
            )
            .unwrap();
    }
    store
}

fn names(provider: &DocumentProvider, query: &QueryExpr) -> Vec<String> {
    collect(provider.query(query).unwrap())
        .iter()
        .map(|r| text(r, "Name"))
        .collect()
}

#[test]
fn test_int64_filter_uses_native_type() {
    let provider = open(inventory(), MetadataConfig::default());
    let query = QueryExpr::new("stock").filter(Expr::prop("Count").eq(Expr::constant(5)));

    let translated = provider.translate(&query).unwrap();
    assert_eq!(
        translated.native.filter,
        Some(NativeExpr::compare(
            vec!["Count".to_string()],
            CompareOp::Eq,
            NativeValue::Int64(5)
        ))
    );
    assert_eq!(names(&provider, &query), vec!["Bread", "Butter"]);

    let big = QueryExpr::new("stock")
        .filter(Expr::prop("Count").gt(Expr::constant(3_000_000_000_i64)));
    assert_eq!(names(&provider, &big), vec!["Wine"]);
}

#[test]
fn test_natural_tiebreak_elision_preserves_order() {
    let elided = open(inventory(), MetadataConfig::default());
    let explicit = open(
        inventory(),
        MetadataConfig {
            elide_natural_tiebreak: false,
            ..MetadataConfig::default()
        },
    );
    let with_tiebreak = QueryExpr::new("stock")
        .order_by(Expr::prop("Aisle"))
        .then_by(Expr::prop("db_id"));
    let plain = QueryExpr::new("stock").order_by(Expr::prop("Aisle"));

    let sorted = elided.translate(&with_tiebreak).unwrap();
    assert_eq!(sorted.native.sort, vec![SortKey::asc(vec!["Aisle".to_string()])]);
    let kept = explicit.translate(&with_tiebreak).unwrap();
    assert_eq!(kept.native.sort.len(), 2);
    assert!(kept.native.sort[1].is_natural());

    let expected = vec!["Bread", "Wine", "Milk", "Butter", "Cheese"];
    assert_eq!(names(&elided, &with_tiebreak), expected);
    assert_eq!(names(&elided, &plain), expected);
    assert_eq!(names(&explicit, &with_tiebreak), expected);
}

#[test]
fn test_keys_after_natural_tiebreak_do_not_reorder() {
    let elided = open(inventory(), MetadataConfig::default());
    let explicit = open(
        inventory(),
        MetadataConfig {
            elide_natural_tiebreak: false,
            ..MetadataConfig::default()
        },
    );
    let query = QueryExpr::new("stock")
        .order_by(Expr::prop("Aisle"))
        .then_by(Expr::prop("db_id"))
        .then_by(Expr::prop("Name"));

    let expected = vec!["Bread", "Wine", "Milk", "Butter", "Cheese"];
    assert_eq!(names(&elided, &query), expected);
    assert_eq!(names(&explicit, &query), expected);
    assert_eq!(elided.translate(&query).unwrap().native.sort.len(), 1);
}

#[test]
fn test_fractional_bounds_on_integer_fields() {
    let provider = open(inventory(), MetadataConfig::default());
    let above = QueryExpr::new("stock").filter(Expr::prop("Count").gt(Expr::constant(11.5)));
    assert_eq!(
        provider.translate(&above).unwrap().native.filter,
        Some(NativeExpr::compare(
            vec!["Count".to_string()],
            CompareOp::Ge,
            NativeValue::Int64(12)
        ))
    );
    assert_eq!(names(&provider, &above), vec!["Milk", "Wine", "Cheese"]);

    let below = QueryExpr::new("stock").filter(Expr::prop("Count").lt(Expr::constant(5.5)));
    assert_eq!(names(&provider, &below), vec!["Bread", "Butter"]);

    let exact = QueryExpr::new("stock").filter(Expr::prop("Count").eq(Expr::constant(5.5)));
    assert_eq!(provider.count(&exact).unwrap(), 0);

    let mismatched = QueryExpr::new("stock").filter(Expr::prop("Count").eq(Expr::constant("5")));
    assert!(matches!(
        provider.query(&mismatched),
        Err(Error::UnsupportedExpression(_))
    ));
}

#[test]
fn test_legacy_comparison_shims() {
    let provider = open(inventory(), MetadataConfig::default());
    let shim = QueryExpr::new("stock").filter(Expr::call(
        "ConditionalCompareObjectEqual",
        vec![Expr::prop("Aisle"), Expr::constant("dairy"), Expr::constant(false)],
    ));
    assert_eq!(names(&provider, &shim), vec!["Milk", "Butter", "Cheese"]);

    let compare_string = QueryExpr::new("stock").filter(
        Expr::call(
            "CompareString",
            vec![Expr::prop("Name"), Expr::constant("C"), Expr::constant(false)],
        )
        .lt(Expr::constant(0)),
    );
    assert_eq!(names(&provider, &compare_string), vec!["Bread", "Butter"]);
}

#[test]
fn test_redundant_null_guard_and_boolean_comparison() {
    let provider = open(inventory(), MetadataConfig::default());
    let guarded = QueryExpr::new("stock").filter(
        Expr::prop("Count")
            .ne(Expr::null())
            .and(Expr::prop("Count").ge(Expr::constant(12)))
            .eq(Expr::constant(true)),
    );
    let translated = provider.translate(&guarded).unwrap();
    assert_eq!(
        translated.native.filter,
        Some(NativeExpr::compare(
            vec!["Count".to_string()],
            CompareOp::Ge,
            NativeValue::Int64(12)
        ))
    );
    assert_eq!(names(&provider, &guarded), vec!["Milk", "Wine", "Cheese"]);
}

#[test]
fn test_unsupported_shapes_are_rejected() {
    let provider = open(inventory(), MetadataConfig::default());
    let field_vs_field =
        QueryExpr::new("stock").filter(Expr::prop("Name").eq(Expr::prop("Aisle")));
    assert!(matches!(
        provider.query(&field_vs_field),
        Err(Error::UnsupportedExpression(_))
    ));

    let filter_after_take = QueryExpr::new("stock")
        .take(2)
        .filter(Expr::prop("Name").eq(Expr::constant("Milk")));
    assert!(matches!(
        provider.query(&filter_after_take),
        Err(Error::UnsupportedExpression(_))
    ));
}
