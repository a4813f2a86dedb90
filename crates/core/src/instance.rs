//! Resource instances: dynamic property bags
//!
//! A `ResourceInstance` is one document seen through the resource model: the
//! full name of its resource type plus an ordered name → value map. Values are
//! typed by the parallel model, never by the instance itself.
//!
//! Reading a property that is not present fails with `StructuralMismatch`;
//! this is what a projected instance reports for fields outside the selection.

use crate::error::{Error, Result};
use crate::model::PrimitiveType;
use chrono::{DateTime, Utc};

/// A property value held by a resource instance
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// UTC calendar timestamp
    DateTime(DateTime<Utc>),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Nested complex value
    Complex(ResourceInstance),
    /// Sequence of values
    Collection(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "Null",
            PropertyValue::Boolean(_) => "Boolean",
            PropertyValue::Int32(_) => "Int32",
            PropertyValue::Int64(_) => "Int64",
            PropertyValue::Double(_) => "Double",
            PropertyValue::String(_) => "String",
            PropertyValue::DateTime(_) => "DateTime",
            PropertyValue::Binary(_) => "Binary",
            PropertyValue::Complex(_) => "Complex",
            PropertyValue::Collection(_) => "Collection",
        }
    }

    /// Primitive type of a scalar value
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            PropertyValue::Boolean(_) => Some(PrimitiveType::Boolean),
            PropertyValue::Int32(_) => Some(PrimitiveType::Int32),
            PropertyValue::Int64(_) => Some(PrimitiveType::Int64),
            PropertyValue::Double(_) => Some(PrimitiveType::Double),
            PropertyValue::String(_) => Some(PrimitiveType::String),
            PropertyValue::DateTime(_) => Some(PrimitiveType::DateTime),
            PropertyValue::Binary(_) => Some(PrimitiveType::Binary),
            PropertyValue::Null | PropertyValue::Complex(_) | PropertyValue::Collection(_) => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get an integer value, widening Int32
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int32(i) => Some(i64::from(*i)),
            PropertyValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as nested instance
    pub fn as_complex(&self) -> Option<&ResourceInstance> {
        match self {
            PropertyValue::Complex(c) => Some(c),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Int32(i)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int64(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Double(f)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(dt: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(dt)
    }
}

impl From<ResourceInstance> for PropertyValue {
    fn from(instance: ResourceInstance) -> Self {
        PropertyValue::Complex(instance)
    }
}

/// One document as a typed property bag
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    type_name: String,
    values: Vec<(String, PropertyValue)>,
}

impl ResourceInstance {
    /// Create an empty instance of a resource type (full name)
    pub fn new(type_name: impl Into<String>) -> Self {
        ResourceInstance {
            type_name: type_name.into(),
            values: Vec::new(),
        }
    }

    /// Full name of the resource type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read a property
    ///
    /// # Errors
    ///
    /// Returns `StructuralMismatch` if the property is not present.
    pub fn get(&self, name: &str) -> Result<&PropertyValue> {
        self.try_get(name)
            .ok_or_else(|| Error::structural_mismatch(&self.type_name, name))
    }

    /// Read a property if present
    pub fn try_get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Set a property, returning the previous value
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.values.push((name, value));
                None
            }
        }
    }

    /// Remove a property, returning its value
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        let idx = self.values.iter().position(|(k, _)| k == name)?;
        Some(self.values.remove(idx).1)
    }

    /// Check whether a property is present
    pub fn contains(&self, name: &str) -> bool {
        self.try_get(name).is_some()
    }

    /// Properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Property names in insertion order
    pub fn property_names(&self) -> Vec<&str> {
        self.values.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Number of properties present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no property is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Property order is not significant for equality
impl PartialEq for ResourceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .all(|(k, v)| other.try_get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_structural_mismatch() {
        let instance = ResourceInstance::new("Test.products");
        let err = instance.get("ID").unwrap_err();
        assert!(err.is_structural_mismatch());
    }

    #[test]
    fn test_set_replaces_and_preserves_order() {
        let mut instance = ResourceInstance::new("Test.products");
        instance.set("b", 1);
        instance.set("a", "x");
        assert_eq!(instance.set("b", 2), Some(PropertyValue::Int32(1)));
        assert_eq!(instance.property_names(), vec!["b", "a"]);
        assert_eq!(instance.get("b").unwrap(), &PropertyValue::Int32(2));
    }

    #[test]
    fn test_null_is_a_present_value() {
        let mut instance = ResourceInstance::new("Test.products");
        instance.set("Name", PropertyValue::Null);
        assert!(instance.contains("Name"));
        assert!(instance.get("Name").unwrap().is_null());
    }

    #[test]
    fn test_equality_ignores_order_but_not_type() {
        let mut a = ResourceInstance::new("T.a");
        a.set("x", 1);
        a.set("y", true);
        let mut b = ResourceInstance::new("T.a");
        b.set("y", true);
        b.set("x", 1);
        assert_eq!(a, b);
        let mut c = ResourceInstance::new("T.c");
        c.set("y", true);
        c.set("x", 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(PropertyValue::Int32(4).as_i64(), Some(4));
        assert_eq!(PropertyValue::from("s").as_str(), Some("s"));
        assert_eq!(
            PropertyValue::Int64(1).primitive_type(),
            Some(PrimitiveType::Int64)
        );
        assert!(PropertyValue::Null.primitive_type().is_none());
    }
}
