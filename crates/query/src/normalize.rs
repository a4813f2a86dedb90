//! Method-call normalization
//!
//! Base pass every query goes through first:
//! - `GetValue` / `GetCollectionValue` accessor calls become direct property access
//! - `TypeIs` is decided statically (no inheritance: a resource is exactly its type)
//! - `Convert` is erased; conversions of constants are folded into the constant

use crate::expr::{convert_constant, Expr};
use docshape_core::{Error, ResourceModel, ResourceType, Result, ValueType};

/// Context the normalization pass resolves types against
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Model of the queried set
    pub model: &'a ResourceModel,
    /// Entity type bound to the lambda parameter
    pub entity: &'a ResourceType,
}

/// Normalize an expression
pub fn normalize(expr: Expr, ctx: &NormalizeContext<'_>) -> Result<Expr> {
    match expr {
        Expr::GetValue { source, name } | Expr::GetCollectionValue { source, name } => {
            Ok(Expr::Property {
                source: Box::new(normalize(*source, ctx)?),
                name,
            })
        }
        Expr::TypeIs { source, type_name } => {
            let source = normalize(*source, ctx)?;
            let actual = static_type(&source, ctx)?;
            Ok(Expr::constant(matches_type(ctx.model, &actual, &type_name)))
        }
        Expr::Convert { operand, target } => match normalize(*operand, ctx)? {
            Expr::Constant(value) => Ok(Expr::Constant(convert_constant(value, target)?)),
            // One representation type per property: the conversion is a no-op
            other => Ok(other),
        },
        other => other.try_map_children(|child| normalize(child, ctx)),
    }
}

fn matches_type(model: &ResourceModel, actual: &str, requested: &str) -> bool {
    actual == requested || model.qualify(requested) == actual
}

/// Full name of the resource type an expression evaluates to
fn static_type(expr: &Expr, ctx: &NormalizeContext<'_>) -> Result<String> {
    match expr {
        Expr::Parameter => Ok(ctx.entity.full_name().to_string()),
        Expr::Property { source, name } => {
            let owner = static_type(source, ctx)?;
            let property = ctx.model.resolve_property(&owner, name).ok_or_else(|| {
                Error::structural_mismatch(owner.clone(), name.clone())
            })?;
            match property.value_type() {
                ValueType::Complex(complex) => Ok(complex.clone()),
                other => Err(Error::unsupported(format!(
                    "type test on '{}' of non-resource type {}",
                    name, other
                ))),
            }
        }
        other => Err(Error::unsupported(format!(
            "type test on unsupported expression {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshape_core::{PrimitiveType, PropertyValue};

    fn model() -> ResourceModel {
        let mut model = ResourceModel::new("T");
        model.add_entity_type("orders").unwrap();
        model.add_complex_type("orders_address").unwrap();
        model
            .add_key_property("T.orders", "_id", ValueType::Primitive(PrimitiveType::String))
            .unwrap();
        model
            .add_complex_property("T.orders", "address", "T.orders_address")
            .unwrap();
        model
            .add_primitive_property("T.orders", "total", ValueType::Nullable(PrimitiveType::Int64))
            .unwrap();
        model.add_resource_set("orders", "T.orders").unwrap();
        model
    }

    fn run(expr: Expr) -> Result<Expr> {
        let model = model();
        let entity = model.entity_type_of("orders").unwrap();
        normalize(
            expr,
            &NormalizeContext {
                model: &model,
                entity,
            },
        )
    }

    #[test]
    fn test_accessor_calls_become_property_access() {
        let e = Expr::get_value("total").eq(Expr::constant(1));
        assert_eq!(run(e).unwrap(), Expr::prop("total").eq(Expr::constant(1)));
        let c = Expr::get_collection_value("tags");
        assert_eq!(run(c).unwrap(), Expr::prop("tags"));
    }

    #[test]
    fn test_type_is_folds_to_constant() {
        assert_eq!(
            run(Expr::Parameter.type_is("orders")).unwrap(),
            Expr::constant(true)
        );
        assert_eq!(
            run(Expr::Parameter.type_is("T.orders_address")).unwrap(),
            Expr::constant(false)
        );
        assert_eq!(
            run(Expr::prop("address").type_is("orders_address")).unwrap(),
            Expr::constant(true)
        );
        assert!(run(Expr::prop("total").type_is("orders")).is_err());
    }

    #[test]
    fn test_convert_is_erased_and_constants_folded() {
        let e = Expr::prop("total")
            .convert(PrimitiveType::Int64)
            .eq(Expr::constant(5).convert(PrimitiveType::Int64));
        assert_eq!(
            run(e).unwrap(),
            Expr::prop("total").eq(Expr::Constant(PropertyValue::Int64(5)))
        );
    }

    #[test]
    fn test_nested_expressions_are_normalized() {
        let e = Expr::get_value("total")
            .gt(Expr::constant(1))
            .and(Expr::get_value("total").lt(Expr::constant(9)).not());
        let expected = Expr::prop("total")
            .gt(Expr::constant(1))
            .and(Expr::prop("total").lt(Expr::constant(9)).not());
        assert_eq!(run(e).unwrap(), expected);
    }
}
