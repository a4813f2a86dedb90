//! Structural shapes
//!
//! A `StructuralShape` is the concrete native layout of a resource type: for
//! every field, its property name, stored field name, native type and (for
//! embedded objects) the nested shape. The native query builder works from a
//! shape instead of a generated type.
//!
//! The metadata keeps one full shape per collection (the generated-type map);
//! field discovery selects the minimal sub-shape a query needs.

use crate::error::{Error, Result};
use crate::model::{PropertyKind, ResourceModel, ResourceType, ValueType};
use crate::names;
use crate::native::NativeType;
use crate::provider_types::ProviderTypeMap;

/// One field of a structural shape
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeField {
    /// Property name
    pub name: String,
    /// Field name in the stored document
    pub native_name: String,
    /// Concrete native type used when building filters
    pub native_type: NativeType,
    /// Declared model type
    pub value_type: ValueType,
    /// True for the synthetic (store-generated) key
    pub synthetic_key: bool,
    /// Layout of an embedded object (or of the items of an object array)
    pub nested: Option<StructuralShape>,
}

/// Concrete native layout of a resource type
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralShape {
    /// Full name of the resource type the shape describes
    pub type_name: String,
    /// Fields in declaration order
    pub fields: Vec<ShapeField>,
}

impl StructuralShape {
    /// Empty shape for a type
    pub fn new(type_name: impl Into<String>) -> Self {
        StructuralShape {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Build the full shape of a collection's entity type
    pub fn for_collection(
        model: &ResourceModel,
        provider_types: &ProviderTypeMap,
        collection: &str,
    ) -> Result<StructuralShape> {
        let entity = model.entity_type_of(collection)?;
        Self::for_type(model, provider_types, entity, collection, &[], &[])
    }

    /// `ancestors` holds the types enclosing `ty`; a type nested in itself is
    /// rejected instead of expanded.
    fn for_type(
        model: &ResourceModel,
        provider_types: &ProviderTypeMap,
        ty: &ResourceType,
        collection: &str,
        prefix: &[&str],
        ancestors: &[&str],
    ) -> Result<StructuralShape> {
        let mut chain = ancestors.to_vec();
        chain.push(ty.full_name());
        let mut shape = StructuralShape::new(ty.full_name());
        for property in ty.properties() {
            let mut path: Vec<&str> = prefix.to_vec();
            path.push(property.native_name());
            let recorded = provider_types.field(collection, &path);

            let nested = match property.value_type() {
                ValueType::Complex(name) => Some(Self::nested(
                    model,
                    provider_types,
                    name,
                    collection,
                    &path,
                    &chain,
                )?),
                ValueType::Collection(item) => match item.as_ref() {
                    ValueType::Complex(name) => Some(Self::nested(
                        model,
                        provider_types,
                        name,
                        collection,
                        &path,
                        &chain,
                    )?),
                    _ => None,
                },
                _ => None,
            };

            let native_type = recorded.unwrap_or_else(|| match property.value_type() {
                ValueType::Primitive(p) | ValueType::Nullable(p) => p.default_native(),
                ValueType::Complex(_) => NativeType::Document,
                ValueType::Collection(_) => NativeType::Array,
            });

            shape.fields.push(ShapeField {
                name: property.name().to_string(),
                native_name: property.native_name().to_string(),
                native_type,
                value_type: property.value_type().clone(),
                synthetic_key: property.kind() == PropertyKind::Key
                    && native_type == NativeType::ObjectId,
                nested,
            });
        }
        Ok(shape)
    }

    fn nested(
        model: &ResourceModel,
        provider_types: &ProviderTypeMap,
        type_name: &str,
        collection: &str,
        path: &[&str],
        ancestors: &[&str],
    ) -> Result<StructuralShape> {
        if ancestors.contains(&type_name) {
            return Err(Error::InvalidModel(format!(
                "type '{}' contains itself at '{}'",
                type_name,
                names::qualified_path(collection, path)
            )));
        }
        let ty = model
            .resolve_type(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
        Self::for_type(model, provider_types, ty, collection, path, ancestors)
    }

    /// Look up a field by property name
    pub fn field(&self, name: &str) -> Option<&ShapeField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a property path to the field it ends on
    ///
    /// # Errors
    ///
    /// Returns `StructuralMismatch` naming the first segment that is missing.
    pub fn resolve(&self, path: &[String]) -> Result<&ShapeField> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| Error::structural_mismatch(&self.type_name, ""))?;
        let field = self
            .field(first)
            .ok_or_else(|| Error::structural_mismatch(&self.type_name, first))?;
        if rest.is_empty() {
            return Ok(field);
        }
        match &field.nested {
            Some(nested) => nested.resolve(rest),
            None => Err(Error::structural_mismatch(&self.type_name, rest[0].clone())),
        }
    }

    /// Native field path for a property path
    pub fn native_path(&self, path: &[String]) -> Result<Vec<String>> {
        let mut native = Vec::with_capacity(path.len());
        let mut current = self;
        for (i, segment) in path.iter().enumerate() {
            let field = current
                .field(segment)
                .ok_or_else(|| Error::structural_mismatch(&current.type_name, segment))?;
            native.push(field.native_name.clone());
            if i + 1 < path.len() {
                current = field
                    .nested
                    .as_ref()
                    .ok_or_else(|| Error::structural_mismatch(&field.name, path[i + 1].clone()))?;
            }
        }
        Ok(native)
    }

    /// Minimal sub-shape exposing exactly the given property paths
    pub fn select(&self, paths: &[Vec<String>]) -> Result<StructuralShape> {
        let mut selected = StructuralShape::new(self.type_name.clone());
        for path in paths {
            self.resolve(path)?;
            selected.merge_path(self, path);
        }
        Ok(selected)
    }

    fn merge_path(&mut self, full: &StructuralShape, path: &[String]) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        let Some(source) = full.field(first) else {
            return;
        };
        let idx = match self.fields.iter().position(|f| &f.name == first) {
            Some(idx) => idx,
            None => {
                let mut field = source.clone();
                field.nested = source
                    .nested
                    .as_ref()
                    .map(|n| StructuralShape::new(n.type_name.clone()));
                self.fields.push(field);
                self.fields.len() - 1
            }
        };
        match (&mut self.fields[idx].nested, &source.nested) {
            (Some(target), Some(nested_source)) if !rest.is_empty() => {
                target.merge_path(nested_source, rest);
            }
            (Some(target), Some(nested_source)) => {
                // Whole embedded object referenced
                *target = nested_source.clone();
            }
            _ => {}
        }
    }

    /// Qualified provider path of a property path within a collection
    pub fn qualified_native_path(&self, collection: &str, path: &[String]) -> Result<String> {
        let native = self.native_path(path)?;
        let refs: Vec<&str> = native.iter().map(String::as_str).collect();
        Ok(names::qualified_path(collection, &refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrimitiveType;

    fn orders() -> (ResourceModel, ProviderTypeMap) {
        let mut model = ResourceModel::new("T");
        model.add_entity_type("orders").unwrap();
        model.add_complex_type("orders_address").unwrap();
        model
            .add_key_property("T.orders", "_id", ValueType::Primitive(PrimitiveType::String))
            .unwrap();
        model
            .add_primitive_property("T.orders", "total", ValueType::Nullable(PrimitiveType::Int64))
            .unwrap();
        model
            .add_complex_property("T.orders", "address", "T.orders_address")
            .unwrap();
        model
            .add_primitive_property(
                "T.orders_address",
                "city",
                ValueType::Nullable(PrimitiveType::String),
            )
            .unwrap();
        model
            .add_primitive_property(
                "T.orders_address",
                "zip",
                ValueType::Nullable(PrimitiveType::String),
            )
            .unwrap();
        model.add_resource_set("orders", "T.orders").unwrap();

        let mut types = ProviderTypeMap::new();
        types.record("orders._id", NativeType::ObjectId);
        types.record("orders.total", NativeType::Int64);
        types.record("orders.address", NativeType::Document);
        types.record("orders.address.city", NativeType::String);
        (model, types)
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_shape_uses_recorded_native_types() {
        let (model, types) = orders();
        let shape = StructuralShape::for_collection(&model, &types, "orders").unwrap();
        let key = shape.field("db_id").unwrap();
        assert_eq!(key.native_type, NativeType::ObjectId);
        assert!(key.synthetic_key);
        assert_eq!(shape.field("total").unwrap().native_type, NativeType::Int64);
        let zip = shape.resolve(&path(&["address", "zip"])).unwrap();
        // Not recorded: falls back to the declared primitive
        assert_eq!(zip.native_type, NativeType::String);
    }

    #[test]
    fn test_native_path_and_missing_segments() {
        let (model, types) = orders();
        let shape = StructuralShape::for_collection(&model, &types, "orders").unwrap();
        assert_eq!(shape.native_path(&path(&["db_id"])).unwrap(), path(&["_id"]));
        assert_eq!(
            shape
                .qualified_native_path("orders", &path(&["address", "city"]))
                .unwrap(),
            "orders.address.city"
        );
        let err = shape.resolve(&path(&["address", "street"])).unwrap_err();
        assert!(err.is_structural_mismatch());
        assert!(shape.resolve(&path(&["total", "x"])).is_err());
    }

    #[test]
    fn test_select_minimal_shape() {
        let (model, types) = orders();
        let shape = StructuralShape::for_collection(&model, &types, "orders").unwrap();
        let minimal = shape
            .select(&[path(&["address", "city"]), path(&["total"])])
            .unwrap();
        assert_eq!(minimal.fields.len(), 2);
        let address = minimal.field("address").unwrap();
        let nested = address.nested.as_ref().unwrap();
        assert_eq!(nested.fields.len(), 1);
        assert_eq!(nested.fields[0].name, "city");
        assert!(minimal.field("db_id").is_none());
    }

    #[test]
    fn test_self_nested_type_is_rejected() {
        let mut model = ResourceModel::new("T");
        model.add_entity_type("trees").unwrap();
        model.add_complex_type("node").unwrap();
        model
            .add_key_property("T.trees", "_id", ValueType::Primitive(PrimitiveType::String))
            .unwrap();
        model.add_complex_property("T.trees", "root", "T.node").unwrap();
        model.add_complex_property("T.node", "child", "T.node").unwrap();
        model.add_resource_set("trees", "T.trees").unwrap();

        let err = StructuralShape::for_collection(&model, &ProviderTypeMap::new(), "trees")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModel(_)));
    }
}
