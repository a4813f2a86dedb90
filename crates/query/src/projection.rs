//! Client-side projection
//!
//! A select list is compiled once into property paths and applied to every
//! converted resource instance. The projected instance holds only the selected
//! properties (nested paths keep only the selected nested properties), so
//! reading anything else fails with `StructuralMismatch`.

use crate::expr::Expr;
use docshape_core::{Error, PropertyValue, ResourceInstance, Result, StructuralShape};

/// Compiled select accessor
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProjection {
    paths: Vec<Vec<String>>,
}

impl CompiledProjection {
    /// Compile a normalized select list against the shape of the queried set
    ///
    /// # Errors
    ///
    /// `UnsupportedExpression` for anything but property paths on the
    /// parameter; `StructuralMismatch` for paths absent from the shape.
    pub fn compile(fields: &[Expr], shape: &StructuralShape) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::unsupported("select list is empty"));
        }
        let mut paths = Vec::with_capacity(fields.len());
        for field in fields {
            let path = field.property_path().ok_or_else(|| {
                Error::unsupported(format!("only property paths can be selected, got {:?}", field))
            })?;
            shape.resolve(&path)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(CompiledProjection { paths })
    }

    /// Selected property paths
    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    /// Apply the projection to a converted instance
    pub fn apply(&self, instance: &ResourceInstance) -> Result<ResourceInstance> {
        let mut projected = ResourceInstance::new(instance.type_name());
        for path in &self.paths {
            copy_path(instance, &mut projected, path)?;
        }
        Ok(projected)
    }
}

fn copy_path(
    source: &ResourceInstance,
    target: &mut ResourceInstance,
    path: &[String],
) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(());
    };
    let value = source.get(first)?;
    if rest.is_empty() {
        target.set(first.clone(), value.clone());
        return Ok(());
    }
    let PropertyValue::Complex(nested_source) = value else {
        // Null owner: the nested value is null too
        if !target.contains(first) {
            target.set(first.clone(), PropertyValue::Null);
        }
        return Ok(());
    };
    let mut nested_target = match target.remove(first) {
        Some(PropertyValue::Complex(existing)) => existing,
        _ => ResourceInstance::new(nested_source.type_name()),
    };
    copy_path(nested_source, &mut nested_target, rest)?;
    target.set(first.clone(), PropertyValue::Complex(nested_target));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshape_core::{NativeType, ShapeField, ValueType, PrimitiveType};

    fn field(name: &str, nested: Option<StructuralShape>) -> ShapeField {
        ShapeField {
            name: name.to_string(),
            native_name: name.to_string(),
            native_type: if nested.is_some() {
                NativeType::Document
            } else {
                NativeType::String
            },
            value_type: ValueType::Nullable(PrimitiveType::String),
            synthetic_key: false,
            nested,
        }
    }

    fn shape() -> StructuralShape {
        let mut address = StructuralShape::new("T.p_address");
        address.fields.push(field("city", None));
        address.fields.push(field("zip", None));
        let mut shape = StructuralShape::new("T.p");
        shape.fields.push(field("ID", None));
        shape.fields.push(field("Name", None));
        shape.fields.push(field("address", Some(address)));
        shape
    }

    fn instance() -> ResourceInstance {
        let mut address = ResourceInstance::new("T.p_address");
        address.set("city", "Oslo");
        address.set("zip", "0150");
        let mut p = ResourceInstance::new("T.p");
        p.set("ID", 2);
        p.set("Name", "Milk");
        p.set("address", address);
        p
    }

    #[test]
    fn test_projection_hides_unselected_properties() {
        let projection = CompiledProjection::compile(&[Expr::prop("Name")], &shape()).unwrap();
        let projected = projection.apply(&instance()).unwrap();
        assert_eq!(projected.get("Name").unwrap().as_str(), Some("Milk"));
        assert!(projected.get("ID").unwrap_err().is_structural_mismatch());
    }

    #[test]
    fn test_nested_projection_keeps_selected_subfields() {
        let projection = CompiledProjection::compile(
            &[Expr::prop("address").get("city"), Expr::prop("ID")],
            &shape(),
        )
        .unwrap();
        let projected = projection.apply(&instance()).unwrap();
        let address = projected.get("address").unwrap().as_complex().unwrap();
        assert_eq!(address.get("city").unwrap().as_str(), Some("Oslo"));
        assert!(address.get("zip").is_err());
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_null_owner_projects_null() {
        let projection =
            CompiledProjection::compile(&[Expr::prop("address").get("city")], &shape()).unwrap();
        let mut p = instance();
        p.set("address", PropertyValue::Null);
        let projected = projection.apply(&p).unwrap();
        assert!(projected.get("address").unwrap().is_null());
    }

    #[test]
    fn test_compile_rejects_non_paths_and_unknown_fields() {
        let err = CompiledProjection::compile(&[Expr::constant(1)], &shape()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));
        let err = CompiledProjection::compile(&[Expr::prop("Price")], &shape()).unwrap_err();
        assert!(err.is_structural_mismatch());
        assert!(CompiledProjection::compile(&[], &shape()).is_err());
    }
}
