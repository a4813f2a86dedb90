//! Query IR
//!
//! `Expr` is the expression tree queries are written in: lambdas over one
//! resource parameter, built from property access, constants, comparisons and
//! logical connectives, plus the abstract accessor calls front ends emit
//! (`GetValue`, `GetCollectionValue`, `TypeIs`, `Convert`, named shim calls).
//!
//! Two variants only appear after the native rewrite: `Field` (a native
//! document field with its native type) and `Native` (a constant already in
//! native form).
//!
//! `QueryExpr` is a resource set plus an ordered list of sequence operators.

use docshape_core::{Error, NativeType, NativeValue, PrimitiveType, PropertyValue, Result};

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Logical and
    And,
    /// Logical or
    Or,
}

impl BinaryOp {
    /// True for the six comparison operators
    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Query expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The lambda parameter (current resource)
    Parameter,
    /// Constant value
    Constant(PropertyValue),
    /// Typed property access
    Property {
        /// Owner expression
        source: Box<Expr>,
        /// Property name
        name: String,
    },
    /// Abstract "get property value" accessor
    GetValue {
        /// Owner expression
        source: Box<Expr>,
        /// Property name
        name: String,
    },
    /// Abstract "get collection property value" accessor
    GetCollectionValue {
        /// Owner expression
        source: Box<Expr>,
        /// Property name
        name: String,
    },
    /// Runtime type check
    TypeIs {
        /// Tested expression
        source: Box<Expr>,
        /// Full or short resource type name
        type_name: String,
    },
    /// Type conversion
    Convert {
        /// Converted expression
        operand: Box<Expr>,
        /// Target type
        target: PrimitiveType,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Logical negation
    Not(Box<Expr>),
    /// Named function call
    Call {
        /// Function name
        name: String,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Native document field (after native rewrite)
    Field {
        /// Native field path
        path: Vec<String>,
        /// Native type the field is stored with
        native_type: NativeType,
        /// True if the field is the store-generated key
        synthetic_key: bool,
    },
    /// Constant in native form (after native rewrite)
    Native(NativeValue),
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    /// Constant node
    pub fn constant(value: impl Into<PropertyValue>) -> Expr {
        Expr::Constant(value.into())
    }

    /// Null constant
    pub fn null() -> Expr {
        Expr::Constant(PropertyValue::Null)
    }

    /// Property of the parameter
    pub fn prop(name: impl Into<String>) -> Expr {
        Expr::Parameter.get(name)
    }

    /// Property of this expression
    pub fn get(self, name: impl Into<String>) -> Expr {
        Expr::Property {
            source: Box::new(self),
            name: name.into(),
        }
    }

    /// Abstract accessor on the parameter
    pub fn get_value(name: impl Into<String>) -> Expr {
        Expr::GetValue {
            source: Box::new(Expr::Parameter),
            name: name.into(),
        }
    }

    /// Abstract collection accessor on the parameter
    pub fn get_collection_value(name: impl Into<String>) -> Expr {
        Expr::GetCollectionValue {
            source: Box::new(Expr::Parameter),
            name: name.into(),
        }
    }

    /// Type test
    pub fn type_is(self, type_name: impl Into<String>) -> Expr {
        Expr::TypeIs {
            source: Box::new(self),
            type_name: type_name.into(),
        }
    }

    /// Type conversion
    pub fn convert(self, target: PrimitiveType) -> Expr {
        Expr::Convert {
            operand: Box::new(self),
            target,
        }
    }

    /// Named call
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// Binary node
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `self == other`
    pub fn eq(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    /// `self != other`
    pub fn ne(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Ne, self, other)
    }

    /// `self < other`
    pub fn lt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Lt, self, other)
    }

    /// `self <= other`
    pub fn le(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Le, self, other)
    }

    /// `self > other`
    pub fn gt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Gt, self, other)
    }

    /// `self >= other`
    pub fn ge(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Ge, self, other)
    }

    /// `self && other`
    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::And, self, other)
    }

    /// `self || other`
    pub fn or(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Or, self, other)
    }

    /// `!self`
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Property path if this is a chain of property accesses on the parameter
    pub fn property_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Property { source, name } => {
                let mut path = match source.as_ref() {
                    Expr::Parameter => Vec::new(),
                    other => other.property_path()?,
                };
                path.push(name.clone());
                Some(path)
            }
            _ => None,
        }
    }

    /// Rebuild this node with every direct child passed through `f`
    ///
    /// Leaves are returned unchanged. Passes handle the variants they care
    /// about and delegate everything else here.
    pub fn try_map_children<F>(self, mut f: F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        Ok(match self {
            Expr::Property { source, name } => Expr::Property {
                source: Box::new(f(*source)?),
                name,
            },
            Expr::GetValue { source, name } => Expr::GetValue {
                source: Box::new(f(*source)?),
                name,
            },
            Expr::GetCollectionValue { source, name } => Expr::GetCollectionValue {
                source: Box::new(f(*source)?),
                name,
            },
            Expr::TypeIs { source, type_name } => Expr::TypeIs {
                source: Box::new(f(*source)?),
                type_name,
            },
            Expr::Convert { operand, target } => Expr::Convert {
                operand: Box::new(f(*operand)?),
                target,
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
            },
            Expr::Not(inner) => Expr::Not(Box::new(f(*inner)?)),
            Expr::Call { name, args } => Expr::Call {
                name,
                args: args.into_iter().map(&mut f).collect::<Result<Vec<_>>>()?,
            },
            leaf @ (Expr::Parameter | Expr::Constant(_) | Expr::Field { .. } | Expr::Native(_)) => {
                leaf
            }
        })
    }

    /// Visit every node, parents before children
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Property { source, .. }
            | Expr::GetValue { source, .. }
            | Expr::GetCollectionValue { source, .. }
            | Expr::TypeIs { source, .. } => source.walk(visit),
            Expr::Convert { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Not(inner) => inner.walk(visit),
            Expr::Call { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expr::Parameter | Expr::Constant(_) | Expr::Field { .. } | Expr::Native(_) => {}
        }
    }
}

// =============================================================================
// Sequence operators
// =============================================================================

/// One sequence operator of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    /// Keep resources for which the predicate holds
    Filter(Expr),
    /// Primary ordering (replaces any earlier ordering)
    OrderBy {
        /// Sort key
        key: Expr,
        /// Descending order
        descending: bool,
    },
    /// Secondary ordering
    ThenBy {
        /// Sort key
        key: Expr,
        /// Descending order
        descending: bool,
    },
    /// Skip a number of resources
    Skip(u64),
    /// Return at most a number of resources
    Take(u64),
    /// Keep only the selected property paths
    Select(Vec<Expr>),
    /// Return the number of matching resources
    Count,
}

/// Query over one resource set
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpr {
    /// Resource set name
    pub set: String,
    /// Operators in application order
    pub ops: Vec<QueryOp>,
}

impl QueryExpr {
    /// Query returning the whole set
    pub fn new(set: impl Into<String>) -> Self {
        QueryExpr {
            set: set.into(),
            ops: Vec::new(),
        }
    }

    /// Append a filter
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.ops.push(QueryOp::Filter(predicate));
        self
    }

    /// Append an ascending primary ordering
    pub fn order_by(mut self, key: Expr) -> Self {
        self.ops.push(QueryOp::OrderBy {
            key,
            descending: false,
        });
        self
    }

    /// Append a descending primary ordering
    pub fn order_by_desc(mut self, key: Expr) -> Self {
        self.ops.push(QueryOp::OrderBy {
            key,
            descending: true,
        });
        self
    }

    /// Append an ascending secondary ordering
    pub fn then_by(mut self, key: Expr) -> Self {
        self.ops.push(QueryOp::ThenBy {
            key,
            descending: false,
        });
        self
    }

    /// Append a descending secondary ordering
    pub fn then_by_desc(mut self, key: Expr) -> Self {
        self.ops.push(QueryOp::ThenBy {
            key,
            descending: true,
        });
        self
    }

    /// Append skip
    pub fn skip(mut self, n: u64) -> Self {
        self.ops.push(QueryOp::Skip(n));
        self
    }

    /// Append take
    pub fn take(mut self, n: u64) -> Self {
        self.ops.push(QueryOp::Take(n));
        self
    }

    /// Append a projection
    pub fn select(mut self, fields: Vec<Expr>) -> Self {
        self.ops.push(QueryOp::Select(fields));
        self
    }

    /// Append count
    pub fn count(mut self) -> Self {
        self.ops.push(QueryOp::Count);
        self
    }
}

/// Fold a constant into a primitive type
///
/// # Errors
///
/// Returns `UnsupportedExpression` if the value has no lossless representation.
pub fn convert_constant(value: PropertyValue, target: PrimitiveType) -> Result<PropertyValue> {
    use PropertyValue as P;
    let converted = match (target, &value) {
        (_, P::Null) => Some(P::Null),
        (PrimitiveType::Boolean, P::Boolean(_))
        | (PrimitiveType::Int32, P::Int32(_))
        | (PrimitiveType::Int64, P::Int64(_))
        | (PrimitiveType::Double, P::Double(_))
        | (PrimitiveType::String, P::String(_))
        | (PrimitiveType::DateTime, P::DateTime(_))
        | (PrimitiveType::Binary, P::Binary(_)) => Some(value.clone()),
        (PrimitiveType::Int32, P::Int64(i)) => i32::try_from(*i).ok().map(P::Int32),
        (PrimitiveType::Int32, P::Double(f)) if f.fract() == 0.0 => {
            i32::try_from(*f as i64).ok().map(P::Int32)
        }
        (PrimitiveType::Int64, P::Int32(i)) => Some(P::Int64(i64::from(*i))),
        (PrimitiveType::Int64, P::Double(f)) if f.fract() == 0.0 => Some(P::Int64(*f as i64)),
        (PrimitiveType::Double, P::Int32(i)) => Some(P::Double(f64::from(*i))),
        (PrimitiveType::Double, P::Int64(i)) => Some(P::Double(*i as f64)),
        (PrimitiveType::String, P::Int32(i)) => Some(P::String(i.to_string())),
        (PrimitiveType::String, P::Int64(i)) => Some(P::String(i.to_string())),
        (PrimitiveType::String, P::Boolean(b)) => Some(P::String(b.to_string())),
        _ => None,
    };
    converted.ok_or_else(|| {
        Error::unsupported(format!(
            "cannot convert {} constant to {}",
            value.type_name(),
            target.name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_path() {
        let e = Expr::prop("address").get("city");
        assert_eq!(
            e.property_path(),
            Some(vec!["address".to_string(), "city".to_string()])
        );
        assert_eq!(Expr::constant(1).property_path(), None);
        let not_rooted = Expr::constant(1).get("x");
        assert_eq!(not_rooted.property_path(), None);
    }

    #[test]
    fn test_try_map_children_rebuilds_node() {
        let e = Expr::prop("a").eq(Expr::constant(1));
        let mapped = e
            .try_map_children(|child| {
                Ok(match child {
                    Expr::Constant(_) => Expr::constant(2),
                    other => other,
                })
            })
            .unwrap();
        assert_eq!(mapped, Expr::prop("a").eq(Expr::constant(2)));
    }

    #[test]
    fn test_walk_visits_all_nodes() {
        let e = Expr::prop("a").eq(Expr::constant(1)).and(Expr::prop("b").not());
        let mut count = 0;
        e.walk(&mut |_| count += 1);
        // and, eq, prop a, param, const, not, prop b, param
        assert_eq!(count, 8);
    }

    #[test]
    fn test_convert_constant() {
        assert_eq!(
            convert_constant(PropertyValue::Int32(3), PrimitiveType::Int64).unwrap(),
            PropertyValue::Int64(3)
        );
        assert!(convert_constant(PropertyValue::Int64(1 << 40), PrimitiveType::Int32).is_err());
        assert!(convert_constant(PropertyValue::from("x"), PrimitiveType::Int32).is_err());
    }

    #[test]
    fn test_builder_records_ops_in_order() {
        let q = QueryExpr::new("products")
            .filter(Expr::prop("Price").gt(Expr::constant(1)))
            .order_by(Expr::prop("Name"))
            .then_by_desc(Expr::prop("db_id"))
            .skip(1)
            .take(2)
            .count();
        assert_eq!(q.ops.len(), 6);
        assert!(matches!(q.ops[2], QueryOp::ThenBy { descending: true, .. }));
        assert_eq!(q.ops[5], QueryOp::Count);
    }
}
