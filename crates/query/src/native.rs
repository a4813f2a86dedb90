//! Native rewrite and lowering
//!
//! The rewrite binds a normalized expression to a structural shape:
//! - property chains on the parameter become native `Field` nodes
//! - constants compared with a field are coerced to the field's recorded
//!   native type, so a nullable 64-bit property filters as `Int64`
//! - VB comparison shims (`CompareObjectEqual`, `ConditionalCompareObjectNotEqual`,
//!   `CompareString(a, b, t) op 0`, ...) become comparison nodes
//! - `(a op b) == true`, `x != null && x op c` and constant operands of logical
//!   connectives are simplified
//!
//! Lowering then turns the rewritten tree into a `NativeExpr` filter or a
//! `SortKey`. Ordering by the synthetic key lowers to the natural-order token.

use crate::expr::{BinaryOp, Expr};
use docshape_core::convert::{coerce_native, default_native};
use docshape_core::{Error, NativeType, NativeValue, PropertyValue, Result, StructuralShape};
use docshape_storage::{CompareOp, NativeExpr, SortKey};

/// Rewrite a normalized expression against a structural shape
pub fn native_rewrite(expr: Expr, shape: &StructuralShape) -> Result<Expr> {
    match expr {
        property @ Expr::Property { .. } => {
            let path = property.property_path().ok_or_else(|| {
                Error::unsupported("property access on a non-resource expression")
            })?;
            field_expr(shape, &path)
        }
        Expr::Call { name, args } => {
            let (op, left, right) = shim_comparison(&name, args)?;
            let left = native_rewrite(left, shape)?;
            let right = native_rewrite(right, shape)?;
            simplify_binary(op, left, right)
        }
        Expr::Binary { op, left, right } => {
            if let Some((a, b)) = compare_string_operands(&left, &right) {
                let left = native_rewrite(a, shape)?;
                let right = native_rewrite(b, shape)?;
                return simplify_binary(op, left, right);
            }
            let left = native_rewrite(*left, shape)?;
            let right = native_rewrite(*right, shape)?;
            simplify_binary(op, left, right)
        }
        Expr::Not(inner) => Ok(negate(native_rewrite(*inner, shape)?)),
        other => other.try_map_children(|child| native_rewrite(child, shape)),
    }
}

fn field_expr(shape: &StructuralShape, path: &[String]) -> Result<Expr> {
    let field = shape.resolve(path)?;
    Ok(Expr::Field {
        path: shape.native_path(path)?,
        native_type: field.native_type,
        synthetic_key: field.synthetic_key,
    })
}

fn shim_operator(name: &str) -> Option<BinaryOp> {
    let base = name.strip_prefix("Conditional").unwrap_or(name);
    match base {
        "CompareObjectEqual" => Some(BinaryOp::Eq),
        "CompareObjectNotEqual" => Some(BinaryOp::Ne),
        "CompareObjectLess" => Some(BinaryOp::Lt),
        "CompareObjectLessEqual" => Some(BinaryOp::Le),
        "CompareObjectGreater" => Some(BinaryOp::Gt),
        "CompareObjectGreaterEqual" => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn shim_comparison(name: &str, args: Vec<Expr>) -> Result<(BinaryOp, Expr, Expr)> {
    let op = shim_operator(name)
        .ok_or_else(|| Error::unsupported(format!("function '{}' is not supported", name)))?;
    // Third argument is the text-compare flag
    if !(2..=3).contains(&args.len()) {
        return Err(Error::unsupported(format!(
            "'{}' expects 2 or 3 arguments, got {}",
            name,
            args.len()
        )));
    }
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(left), Some(right)) => Ok((op, left, right)),
        _ => Err(Error::unsupported(format!("'{}' is missing operands", name))),
    }
}

/// `CompareString(a, b, t) op 0` → operands of `a op b`
fn compare_string_operands(left: &Expr, right: &Expr) -> Option<(Expr, Expr)> {
    match (left, right) {
        (Expr::Call { name, args }, Expr::Constant(PropertyValue::Int32(0)))
            if name == "CompareString" && (2..=3).contains(&args.len()) =>
        {
            Some((args[0].clone(), args[1].clone()))
        }
        _ => None,
    }
}

fn is_compound_predicate(expr: &Expr) -> bool {
    matches!(expr, Expr::Binary { .. } | Expr::Not(_))
}

fn bool_constant(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Constant(PropertyValue::Boolean(b)) | Expr::Native(NativeValue::Boolean(b)) => {
            Some(*b)
        }
        _ => None,
    }
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Not(inner) => *inner,
        Expr::Constant(PropertyValue::Boolean(b)) => Expr::constant(!b),
        other => other.not(),
    }
}

fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

fn simplify_binary(op: BinaryOp, left: Expr, right: Expr) -> Result<Expr> {
    match op {
        BinaryOp::And => Ok(simplify_and(left, right)),
        BinaryOp::Or => Ok(match (bool_constant(&left), bool_constant(&right)) {
            (Some(true), _) | (_, Some(true)) => Expr::constant(true),
            (Some(false), _) => right,
            (_, Some(false)) => left,
            _ => left.or(right),
        }),
        _ => simplify_comparison(op, left, right),
    }
}

fn simplify_comparison(op: BinaryOp, left: Expr, right: Expr) -> Result<Expr> {
    // (a op b) == true and friends
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        let positive = op == BinaryOp::Eq;
        if is_compound_predicate(&left) {
            if let Some(b) = bool_constant(&right) {
                return Ok(if b == positive { left } else { negate(left) });
            }
        }
        if is_compound_predicate(&right) {
            if let Some(b) = bool_constant(&left) {
                return Ok(if b == positive { right } else { negate(right) });
            }
        }
    }
    match (left, right) {
        (field @ Expr::Field { .. }, Expr::Constant(value)) => bind_constant(op, field, &value),
        (Expr::Constant(value), field @ Expr::Field { .. }) => {
            bind_constant(flip(op), field, &value)
        }
        (field @ Expr::Field { .. }, native @ Expr::Native(_)) => {
            Ok(Expr::binary(op, field, native))
        }
        (native @ Expr::Native(_), field @ Expr::Field { .. }) => {
            Ok(Expr::binary(flip(op), field, native))
        }
        (Expr::Constant(a), Expr::Constant(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
            Ok(Expr::constant((a == b) == (op == BinaryOp::Eq)))
        }
        (Expr::Field { path: a, .. }, Expr::Field { path: b, .. }) => Err(Error::unsupported(
            format!(
                "comparison between fields '{}' and '{}'",
                a.join("."),
                b.join(".")
            ),
        )),
        (left, right) => Err(Error::unsupported(format!(
            "comparison {:?} {:?} {:?} has no native form",
            left, op, right
        ))),
    }
}

/// Compare a field with a constant in the field's recorded native type
///
/// A fractional bound on an integer field becomes the equivalent integer
/// bound. A constant no stored value can equal folds `==`/`!=` to a boolean;
/// any other constant without a native form in the field's type is rejected.
fn bind_constant(op: BinaryOp, field: Expr, value: &PropertyValue) -> Result<Expr> {
    let native_type = match &field {
        Expr::Field { native_type, .. } if native_type.is_scalar() => *native_type,
        _ => return Ok(Expr::binary(op, field, Expr::Native(default_native(value)))),
    };
    if let Some(native) = coerce_native(value, native_type) {
        return Ok(Expr::binary(op, field, Expr::Native(native)));
    }
    match (value, native_type) {
        (PropertyValue::Double(f), NativeType::Int32 | NativeType::Int64)
            if f.is_finite() && f.fract() != 0.0 =>
        {
            integer_bound(op, field, *f, native_type)
        }
        (PropertyValue::String(_), NativeType::ObjectId) if op == BinaryOp::Eq => {
            Ok(Expr::constant(false))
        }
        (PropertyValue::String(_), NativeType::ObjectId) if op == BinaryOp::Ne => {
            Ok(Expr::constant(true))
        }
        _ => Err(unrepresentable(&field, value, native_type)),
    }
}

/// `i > 1.5` → `i >= 2`, `i < 1.5` → `i <= 1`
fn integer_bound(op: BinaryOp, field: Expr, f: f64, native_type: NativeType) -> Result<Expr> {
    let (op, bound) = match op {
        BinaryOp::Eq => return Ok(Expr::constant(false)),
        BinaryOp::Ne => return Ok(Expr::constant(true)),
        BinaryOp::Gt | BinaryOp::Ge => (BinaryOp::Ge, f.ceil()),
        BinaryOp::Lt | BinaryOp::Le => (BinaryOp::Le, f.floor()),
        BinaryOp::And | BinaryOp::Or => {
            return Err(Error::unsupported(format!("{:?} is not a comparison", op)))
        }
    };
    let bound = PropertyValue::Double(bound);
    match coerce_native(&bound, native_type) {
        Some(native) => Ok(Expr::binary(op, field, Expr::Native(native))),
        None => Err(unrepresentable(&field, &bound, native_type)),
    }
}

fn unrepresentable(field: &Expr, value: &PropertyValue, native_type: NativeType) -> Error {
    Error::unsupported(format!(
        "{} constant {:?} cannot be compared with {} field '{}'",
        value.type_name(),
        value,
        native_type,
        field_path(field).map(|p| p.join(".")).unwrap_or_default()
    ))
}

fn simplify_and(left: Expr, right: Expr) -> Expr {
    match (bool_constant(&left), bool_constant(&right)) {
        (Some(false), _) | (_, Some(false)) => return Expr::constant(false),
        (Some(true), _) => return right,
        (_, Some(true)) => return left,
        _ => {}
    }
    if is_redundant_null_check(&left, &right) {
        return right;
    }
    if is_redundant_null_check(&right, &left) {
        return left;
    }
    left.and(right)
}

/// `check` is `f != null` and `other` is a comparison on `f` that already
/// excludes missing and null values
fn is_redundant_null_check(check: &Expr, other: &Expr) -> bool {
    let Expr::Binary {
        op: BinaryOp::Ne,
        left: checked,
        right: null,
    } = check
    else {
        return false;
    };
    if !matches!(null.as_ref(), Expr::Native(NativeValue::Null)) {
        return false;
    }
    let Expr::Binary { op, left, right } = other else {
        return false;
    };
    op.is_comparison()
        && *op != BinaryOp::Ne
        && field_path(left) == field_path(checked)
        && field_path(left).is_some()
        && matches!(right.as_ref(), Expr::Native(v) if !v.is_null())
}

fn field_path(expr: &Expr) -> Option<&[String]> {
    match expr {
        Expr::Field { path, .. } => Some(path),
        _ => None,
    }
}

fn compare_op(op: BinaryOp) -> Option<CompareOp> {
    match op {
        BinaryOp::Eq => Some(CompareOp::Eq),
        BinaryOp::Ne => Some(CompareOp::Ne),
        BinaryOp::Lt => Some(CompareOp::Lt),
        BinaryOp::Le => Some(CompareOp::Le),
        BinaryOp::Gt => Some(CompareOp::Gt),
        BinaryOp::Ge => Some(CompareOp::Ge),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

/// Lower a rewritten predicate to a native filter
pub fn to_native_filter(expr: &Expr) -> Result<NativeExpr> {
    match expr {
        Expr::Constant(PropertyValue::Boolean(b)) | Expr::Native(NativeValue::Boolean(b)) => {
            Ok(NativeExpr::Const(*b))
        }
        Expr::Field {
            path,
            native_type: NativeType::Boolean,
            ..
        } => Ok(NativeExpr::compare(path.clone(), CompareOp::Eq, true)),
        Expr::Not(inner) => Ok(NativeExpr::Not(Box::new(to_native_filter(inner)?))),
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => Ok(to_native_filter(left)?.and(to_native_filter(right)?)),
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let mut items = Vec::new();
            for side in [left, right] {
                match to_native_filter(side)? {
                    NativeExpr::Or(nested) => items.extend(nested),
                    other => items.push(other),
                }
            }
            Ok(NativeExpr::Or(items))
        }
        Expr::Binary { op, left, right } => match (left.as_ref(), right.as_ref(), compare_op(*op)) {
            (Expr::Field { path, .. }, Expr::Native(value), Some(op)) => Ok(NativeExpr::Compare {
                path: path.clone(),
                op,
                value: value.clone(),
            }),
            _ => Err(Error::unsupported(format!(
                "predicate {:?} has no native form",
                expr
            ))),
        },
        other => Err(Error::unsupported(format!(
            "expression {:?} is not a predicate",
            other
        ))),
    }
}

/// Lower a rewritten ordering key
pub fn to_sort_key(expr: &Expr, descending: bool) -> Result<SortKey> {
    match expr {
        Expr::Field {
            synthetic_key: true,
            ..
        } => Ok(SortKey::Natural { descending }),
        Expr::Field { path, .. } => Ok(SortKey::Field {
            path: path.clone(),
            descending,
        }),
        other => Err(Error::unsupported(format!(
            "ordering by {:?} is not supported",
            other
        ))),
    }
}
