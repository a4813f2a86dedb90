//! Resource model: the typed metadata graph
//!
//! A `ResourceModel` holds entity and complex type descriptors and the
//! resource sets (one per backing collection) that expose entity types.
//!
//! ## Lifecycle
//!
//! - Mutable until [`ResourceModel::freeze`]; afterwards every mutator fails
//!   with `Error::ReadOnly`
//! - [`ResourceModel::clone_model`] produces an independent, unfrozen copy
//!
//! ## Invariants
//!
//! - Type full names are unique (`<namespace>.<name>`)
//! - Property names are normalized (see [`crate::names`]) and unique per type
//! - An entity type has at most one key property
//! - At most one resource set per entity type
//!
//! All lookups are hash-map based; they run on every request.

use crate::error::{Error, Result};
use crate::names;
use crate::native::NativeType;
use std::collections::HashMap;
use std::fmt;

/// Namespace used for generated types
pub const DEFAULT_NAMESPACE: &str = "Docshape";

/// Property given to complex types that have no properties when cloned
pub const PLACEHOLDER_PROPERTY_NAME: &str = "empty_content";

// =============================================================================
// Value types
// =============================================================================

/// Primitive value types the model can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Boolean
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// IEEE-754 double
    Double,
    /// UTF-8 string
    String,
    /// UTC calendar timestamp
    DateTime,
    /// Raw bytes
    Binary,
}

impl PrimitiveType {
    /// Map a native type to its primitive representation
    ///
    /// Object ids are represented as strings, native timestamps as date-times.
    /// Returns None for null and container types.
    pub fn from_native(native: NativeType) -> Option<Self> {
        match native {
            NativeType::Boolean => Some(PrimitiveType::Boolean),
            NativeType::Int32 => Some(PrimitiveType::Int32),
            NativeType::Int64 => Some(PrimitiveType::Int64),
            NativeType::Double => Some(PrimitiveType::Double),
            NativeType::String | NativeType::ObjectId => Some(PrimitiveType::String),
            NativeType::DateTime | NativeType::Timestamp => Some(PrimitiveType::DateTime),
            NativeType::Binary => Some(PrimitiveType::Binary),
            NativeType::Null | NativeType::Array | NativeType::Document => None,
        }
    }

    /// Native type a value of this primitive is written back as
    pub fn default_native(&self) -> NativeType {
        match self {
            PrimitiveType::Boolean => NativeType::Boolean,
            PrimitiveType::Int32 => NativeType::Int32,
            PrimitiveType::Int64 => NativeType::Int64,
            PrimitiveType::Double => NativeType::Double,
            PrimitiveType::String => NativeType::String,
            PrimitiveType::DateTime => NativeType::DateTime,
            PrimitiveType::Binary => NativeType::Binary,
        }
    }

    /// Type name as a string
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Int32 => "Int32",
            PrimitiveType::Int64 => "Int64",
            PrimitiveType::Double => "Double",
            PrimitiveType::String => "String",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::Binary => "Binary",
        }
    }
}

/// Declared type of a property value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Non-nullable primitive
    Primitive(PrimitiveType),
    /// Nullable primitive
    Nullable(PrimitiveType),
    /// Complex type, by full name
    Complex(String),
    /// Homogeneous sequence
    Collection(Box<ValueType>),
}

impl ValueType {
    /// Underlying primitive, if any
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            ValueType::Primitive(p) | ValueType::Nullable(p) => Some(*p),
            _ => None,
        }
    }

    /// True for nullable primitives, complex types and collections
    pub fn is_nullable(&self) -> bool {
        !matches!(self, ValueType::Primitive(_))
    }

    /// Strip nullability from a primitive
    pub fn non_nullable(&self) -> ValueType {
        match self {
            ValueType::Nullable(p) => ValueType::Primitive(*p),
            other => other.clone(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Primitive(p) => f.write_str(p.name()),
            ValueType::Nullable(p) => write!(f, "{}?", p.name()),
            ValueType::Complex(name) => f.write_str(name),
            ValueType::Collection(item) => write!(f, "Collection({})", item),
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Kind of resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTypeKind {
    /// Exposed through a resource set, carries a key
    Entity,
    /// Embedded structure without identity
    Complex,
}

/// Kind of resource property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Primitive value
    Primitive,
    /// Primitive value carrying key semantics
    Key,
    /// Embedded complex value
    ComplexType,
    /// Sequence of primitives or complex values
    Collection,
    /// Navigation to an entity of another resource set
    Reference,
}

/// A property of a resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceProperty {
    name: String,
    native_name: String,
    kind: PropertyKind,
    value_type: ValueType,
    target_set: Option<String>,
}

impl ResourceProperty {
    /// Normalized property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field name in the stored document
    pub fn native_name(&self) -> &str {
        &self.native_name
    }

    /// Property kind
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Declared value type
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// True if this is the key property
    pub fn is_key(&self) -> bool {
        self.kind == PropertyKind::Key
    }

    /// Target resource set of a reference property
    pub fn target_set(&self) -> Option<&str> {
        self.target_set.as_deref()
    }
}

/// An entity or complex type descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceType {
    name: String,
    full_name: String,
    kind: ResourceTypeKind,
    properties: Vec<ResourceProperty>,
    by_name: HashMap<String, usize>,
    by_native: HashMap<String, usize>,
    read_only: bool,
}

impl ResourceType {
    fn new(name: &str, namespace: &str, kind: ResourceTypeKind) -> Self {
        ResourceType {
            name: name.to_string(),
            full_name: format!("{}.{}", namespace, name),
            kind,
            properties: Vec::new(),
            by_name: HashMap::new(),
            by_native: HashMap::new(),
            read_only: false,
        }
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Entity or complex
    pub fn kind(&self) -> ResourceTypeKind {
        self.kind
    }

    /// Properties in declaration order
    pub fn properties(&self) -> &[ResourceProperty] {
        &self.properties
    }

    /// Look up a property by normalized name
    pub fn property(&self, name: &str) -> Option<&ResourceProperty> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// Look up a property by stored field name
    pub fn property_by_native(&self, native_name: &str) -> Option<&ResourceProperty> {
        self.by_native.get(native_name).map(|&i| &self.properties[i])
    }

    /// The key property of an entity type
    pub fn key_property(&self) -> Option<&ResourceProperty> {
        self.properties.iter().find(|p| p.is_key())
    }

    /// True once the owning model is frozen
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Append a property, returning the name it was registered under
    ///
    /// Distinct stored fields that normalize to the same name get a numeric
    /// suffix (`a_b`, `a_b_1`, ...).
    fn push(&mut self, mut property: ResourceProperty) -> Result<String> {
        if self.by_native.contains_key(&property.native_name) {
            return Err(Error::InvalidModel(format!(
                "field '{}' already exists on '{}'",
                property.native_name, self.full_name
            )));
        }
        if self.by_name.contains_key(&property.name) {
            let base = property.name.clone();
            let mut suffix = 1usize;
            while self.by_name.contains_key(&format!("{}_{}", base, suffix)) {
                suffix += 1;
            }
            property.name = format!("{}_{}", base, suffix);
        }
        let idx = self.properties.len();
        let name = property.name.clone();
        self.by_name.insert(name.clone(), idx);
        self.by_native.insert(property.native_name.clone(), idx);
        self.properties.push(property);
        Ok(name)
    }
}

/// A resource set: one backing collection exposing one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSet {
    name: String,
    entity_type: String,
    read_only: bool,
}

impl ResourceSet {
    /// Set name (equals the backing collection name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full name of the entity type
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// True once the owning model is frozen
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

// =============================================================================
// ResourceModel
// =============================================================================

/// Container of type and set descriptors
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceModel {
    namespace: String,
    types: HashMap<String, ResourceType>,
    type_order: Vec<String>,
    sets: HashMap<String, ResourceSet>,
    set_order: Vec<String>,
    set_by_type: HashMap<String, String>,
    frozen: bool,
}

impl Default for ResourceModel {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl ResourceModel {
    /// Create an empty model for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        ResourceModel {
            namespace: namespace.into(),
            types: HashMap::new(),
            type_order: Vec::new(),
            sets: HashMap::new(),
            set_order: Vec::new(),
            set_by_type: HashMap::new(),
            frozen: false,
        }
    }

    /// Namespace of generated types
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Full name a type called `name` gets in this model
    pub fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.namespace, name)
    }

    /// True once frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.frozen {
            Err(Error::ReadOnly(operation.to_string()))
        } else {
            Ok(())
        }
    }

    fn type_mut(&mut self, full_name: &str) -> Result<&mut ResourceType> {
        self.types
            .get_mut(full_name)
            .ok_or_else(|| Error::UnknownType(full_name.to_string()))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Add an entity type
    pub fn add_entity_type(&mut self, name: &str) -> Result<&ResourceType> {
        self.add_type(name, ResourceTypeKind::Entity)
    }

    /// Add a complex type
    pub fn add_complex_type(&mut self, name: &str) -> Result<&ResourceType> {
        self.add_type(name, ResourceTypeKind::Complex)
    }

    fn add_type(&mut self, name: &str, kind: ResourceTypeKind) -> Result<&ResourceType> {
        self.ensure_mutable("add type")?;
        let name = names::identifier(name);
        let full_name = self.qualify(&name);
        if self.types.contains_key(&full_name) {
            return Err(Error::DuplicateType(full_name));
        }
        self.types
            .insert(full_name.clone(), ResourceType::new(&name, &self.namespace, kind));
        self.type_order.push(full_name.clone());
        Ok(&self.types[&full_name])
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Add the key property of an entity type
    ///
    /// The value type must be a non-nullable primitive.
    pub fn add_key_property(
        &mut self,
        type_name: &str,
        native_name: &str,
        value_type: ValueType,
    ) -> Result<&ResourceProperty> {
        self.ensure_mutable("add key property")?;
        let name = names::property_name(native_name);
        if !matches!(value_type, ValueType::Primitive(_)) {
            return Err(Error::invalid_property_type(
                name,
                format!("key must be a non-nullable primitive, got {}", value_type),
            ));
        }
        let ty = self.type_mut(type_name)?;
        if ty.kind != ResourceTypeKind::Entity {
            return Err(Error::InvalidModel(format!(
                "key property on non-entity type '{}'",
                type_name
            )));
        }
        if ty.key_property().is_some() {
            return Err(Error::InvalidModel(format!(
                "type '{}' already has a key property",
                type_name
            )));
        }
        let name = ty.push(ResourceProperty {
            name,
            native_name: native_name.to_string(),
            kind: PropertyKind::Key,
            value_type,
            target_set: None,
        })?;
        self.property_ref(type_name, &name)
    }

    /// Add a primitive property
    pub fn add_primitive_property(
        &mut self,
        type_name: &str,
        native_name: &str,
        value_type: ValueType,
    ) -> Result<&ResourceProperty> {
        self.ensure_mutable("add primitive property")?;
        let name = names::property_name(native_name);
        if value_type.primitive().is_none() {
            return Err(Error::invalid_property_type(
                name,
                format!("{} is not a primitive type", value_type),
            ));
        }
        let name = self.type_mut(type_name)?.push(ResourceProperty {
            name,
            native_name: native_name.to_string(),
            kind: PropertyKind::Primitive,
            value_type,
            target_set: None,
        })?;
        self.property_ref(type_name, &name)
    }

    /// Add a property holding an embedded complex value
    pub fn add_complex_property(
        &mut self,
        type_name: &str,
        native_name: &str,
        complex_type: &str,
    ) -> Result<&ResourceProperty> {
        self.ensure_mutable("add complex property")?;
        self.ensure_complex(complex_type)?;
        let name = names::property_name(native_name);
        let name = self.type_mut(type_name)?.push(ResourceProperty {
            name,
            native_name: native_name.to_string(),
            kind: PropertyKind::ComplexType,
            value_type: ValueType::Complex(complex_type.to_string()),
            target_set: None,
        })?;
        self.property_ref(type_name, &name)
    }

    /// Add a homogeneous sequence property
    ///
    /// Collections of collections are rejected.
    pub fn add_collection_property(
        &mut self,
        type_name: &str,
        native_name: &str,
        item_type: ValueType,
    ) -> Result<&ResourceProperty> {
        self.ensure_mutable("add collection property")?;
        let name = names::property_name(native_name);
        match &item_type {
            ValueType::Collection(_) => {
                return Err(Error::invalid_property_type(
                    name,
                    "collections of collections are not supported",
                ))
            }
            ValueType::Complex(complex) => self.ensure_complex(complex)?,
            ValueType::Primitive(_) | ValueType::Nullable(_) => {}
        }
        let name = self.type_mut(type_name)?.push(ResourceProperty {
            name,
            native_name: native_name.to_string(),
            kind: PropertyKind::Collection,
            value_type: ValueType::Collection(Box::new(item_type)),
            target_set: None,
        })?;
        self.property_ref(type_name, &name)
    }

    /// Add a navigation property to the entity type of another set
    ///
    /// The stored value is the target's key; the property is typed like it.
    pub fn add_reference_property(
        &mut self,
        type_name: &str,
        native_name: &str,
        target_set: &str,
    ) -> Result<&ResourceProperty> {
        self.ensure_mutable("add reference property")?;
        let set = self
            .sets
            .get(target_set)
            .ok_or_else(|| Error::UnknownResourceSet(target_set.to_string()))?;
        let key_type = self
            .types
            .get(&set.entity_type)
            .and_then(|t| t.key_property())
            .and_then(|k| k.value_type.primitive())
            .ok_or_else(|| {
                Error::InvalidModel(format!("target set '{}' has no key property", target_set))
            })?;
        let name = names::property_name(native_name);
        let name = self.type_mut(type_name)?.push(ResourceProperty {
            name,
            native_name: native_name.to_string(),
            kind: PropertyKind::Reference,
            value_type: ValueType::Nullable(key_type),
            target_set: Some(target_set.to_string()),
        })?;
        self.property_ref(type_name, &name)
    }

    /// Change the value type of an entity type's key property
    ///
    /// Used when the first stored identifier arrives after a key was assumed.
    pub fn set_key_type(&mut self, type_name: &str, value_type: ValueType) -> Result<()> {
        self.ensure_mutable("change key type")?;
        if !matches!(value_type, ValueType::Primitive(_)) {
            return Err(Error::invalid_property_type(
                names::KEY_PROPERTY_NAME,
                format!("key must be a non-nullable primitive, got {}", value_type),
            ));
        }
        let ty = self.type_mut(type_name)?;
        let key = ty
            .properties
            .iter_mut()
            .find(|p| p.is_key())
            .ok_or_else(|| Error::InvalidModel(format!("'{}' has no key property", type_name)))?;
        key.value_type = value_type;
        Ok(())
    }

    /// True if `outer` is `inner` or embeds it through complex or
    /// collection properties, at any depth
    pub fn embeds(&self, outer: &str, inner: &str) -> bool {
        let mut pending = vec![outer];
        let mut seen: Vec<&str> = Vec::new();
        while let Some(name) = pending.pop() {
            if name == inner {
                return true;
            }
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            let Some(ty) = self.types.get(name) else {
                continue;
            };
            for property in &ty.properties {
                match &property.value_type {
                    ValueType::Complex(nested) => pending.push(nested.as_str()),
                    ValueType::Collection(item) => {
                        if let ValueType::Complex(nested) = item.as_ref() {
                            pending.push(nested.as_str());
                        }
                    }
                    _ => {}
                }
            }
        }
        false
    }

    fn ensure_complex(&self, full_name: &str) -> Result<()> {
        match self.types.get(full_name) {
            Some(t) if t.kind == ResourceTypeKind::Complex => Ok(()),
            Some(_) => Err(Error::InvalidModel(format!(
                "'{}' is not a complex type",
                full_name
            ))),
            None => Err(Error::UnknownType(full_name.to_string())),
        }
    }

    fn property_ref(&self, type_name: &str, name: &str) -> Result<&ResourceProperty> {
        self.resolve_property(type_name, name)
            .ok_or_else(|| Error::structural_mismatch(type_name, name))
    }

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    /// Add a resource set exposing an entity type
    pub fn add_resource_set(&mut self, name: &str, entity_type: &str) -> Result<&ResourceSet> {
        self.ensure_mutable("add resource set")?;
        match self.types.get(entity_type) {
            Some(t) if t.kind == ResourceTypeKind::Entity => {}
            Some(_) => {
                return Err(Error::InvalidModel(format!(
                    "'{}' is not an entity type",
                    entity_type
                )))
            }
            None => return Err(Error::UnknownType(entity_type.to_string())),
        }
        if self.sets.contains_key(name) {
            return Err(Error::InvalidModel(format!("resource set '{}' already exists", name)));
        }
        if let Some(existing) = self.set_by_type.get(entity_type) {
            return Err(Error::InvalidModel(format!(
                "type '{}' is already exposed by set '{}'",
                entity_type, existing
            )));
        }
        self.sets.insert(
            name.to_string(),
            ResourceSet {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
                read_only: false,
            },
        );
        self.set_order.push(name.to_string());
        self.set_by_type
            .insert(entity_type.to_string(), name.to_string());
        Ok(&self.sets[name])
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Mark every type and set read-only (idempotent)
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for ty in self.types.values_mut() {
            ty.read_only = true;
        }
        for set in self.sets.values_mut() {
            set.read_only = true;
        }
        self.frozen = true;
    }

    /// Deep copy into an independent, unfrozen model
    ///
    /// Complex types without properties receive a nullable string placeholder
    /// property so that an empty object stays representable.
    pub fn clone_model(&self) -> ResourceModel {
        let mut copy = self.clone();
        copy.frozen = false;
        for ty in copy.types.values_mut() {
            ty.read_only = false;
            if ty.kind == ResourceTypeKind::Complex && ty.properties.is_empty() {
                // Name is fixed and the type is empty, so push cannot collide
                let _ = ty.push(ResourceProperty {
                    name: PLACEHOLDER_PROPERTY_NAME.to_string(),
                    native_name: PLACEHOLDER_PROPERTY_NAME.to_string(),
                    kind: PropertyKind::Primitive,
                    value_type: ValueType::Nullable(PrimitiveType::String),
                    target_set: None,
                });
            }
        }
        for set in copy.sets.values_mut() {
            set.read_only = false;
        }
        copy
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Resolve a type by full name
    pub fn resolve_type(&self, full_name: &str) -> Option<&ResourceType> {
        self.types.get(full_name)
    }

    /// Resolve a resource set by name
    pub fn resolve_set(&self, name: &str) -> Option<&ResourceSet> {
        self.sets.get(name)
    }

    /// Resolve a property of a type
    pub fn resolve_property(&self, type_name: &str, property: &str) -> Option<&ResourceProperty> {
        self.types.get(type_name)?.property(property)
    }

    /// Resource set exposing an entity type
    pub fn resolve_set_for_type(&self, type_name: &str) -> Option<&ResourceSet> {
        self.set_by_type
            .get(type_name)
            .and_then(|name| self.sets.get(name))
    }

    /// Entity type of a resource set
    pub fn entity_type_of(&self, set_name: &str) -> Result<&ResourceType> {
        let set = self
            .sets
            .get(set_name)
            .ok_or_else(|| Error::UnknownResourceSet(set_name.to_string()))?;
        self.types
            .get(&set.entity_type)
            .ok_or_else(|| Error::UnknownType(set.entity_type.clone()))
    }

    /// Types in creation order
    pub fn types(&self) -> impl Iterator<Item = &ResourceType> {
        self.type_order.iter().filter_map(|n| self.types.get(n))
    }

    /// Sets in creation order
    pub fn sets(&self) -> impl Iterator<Item = &ResourceSet> {
        self.set_order.iter().filter_map(|n| self.sets.get(n))
    }
}
