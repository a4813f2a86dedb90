//! Field discovery
//!
//! Walks a normalized query once, without executing it, and collects every
//! property path it references. The paths select a minimal structural shape
//! out of the collection's full shape; the native rewrite is then bound to
//! that shape.

use crate::expr::Expr;
use docshape_core::{Error, Result, StructuralShape};

/// Property paths a query references and the shape exposing exactly them
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    /// Referenced property paths, first occurrence order
    pub paths: Vec<Vec<String>>,
    /// Minimal shape exposing the paths
    pub shape: StructuralShape,
}

/// Collect referenced paths and synthesize the minimal shape
///
/// # Errors
///
/// `StructuralMismatch` for a path absent from `full`; `UnsupportedExpression`
/// for property access on anything but the parameter or a bare parameter.
pub fn discover_fields<'e, I>(exprs: I, full: &StructuralShape) -> Result<FieldSet>
where
    I: IntoIterator<Item = &'e Expr>,
{
    let mut paths = Vec::new();
    for expr in exprs {
        collect(expr, &mut paths)?;
    }
    let shape = full.select(&paths)?;
    Ok(FieldSet { paths, shape })
}

fn collect(expr: &Expr, paths: &mut Vec<Vec<String>>) -> Result<()> {
    if let Some(path) = expr.property_path() {
        if !paths.contains(&path) {
            paths.push(path);
        }
        return Ok(());
    }
    match expr {
        Expr::Parameter => Err(Error::unsupported(
            "the resource itself cannot be used as a value",
        )),
        Expr::Property { name, .. } => Err(Error::unsupported(format!(
            "property '{}' accessed on a non-resource expression",
            name
        ))),
        Expr::GetValue { name, .. } | Expr::GetCollectionValue { name, .. } => {
            Err(Error::unsupported(format!(
                "accessor call for '{}' was not normalized",
                name
            )))
        }
        Expr::TypeIs { source, .. } => collect(source, paths),
        Expr::Convert { operand, .. } => collect(operand, paths),
        Expr::Binary { left, right, .. } => {
            collect(left, paths)?;
            collect(right, paths)
        }
        Expr::Not(inner) => collect(inner, paths),
        Expr::Call { args, .. } => args.iter().try_for_each(|a| collect(a, paths)),
        Expr::Constant(_) | Expr::Field { .. } | Expr::Native(_) => Ok(()),
    }
}
