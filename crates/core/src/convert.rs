//! Document ↔ resource instance conversion
//!
//! ## Reading (`to_resource_instance`)
//!
//! - Fields without a matching property are skipped (not part of the model yet)
//! - Model properties missing from the document read as `Null`
//! - Object ids become hex strings, native date-times and timestamps become
//!   UTC calendar timestamps, binary stays raw bytes. A timestamp keeps only
//!   its seconds: the increment is dropped and written back as 0
//! - Numbers widen into the declared numeric type when lossless; values that
//!   do not fit the declared type read as `Null` (logged at debug)
//!
//! ## Writing (`to_document`)
//!
//! Only non-null properties are emitted. Each value is coerced to the native
//! type recorded in the provider type map, so a key read as a string is
//! written back as the object id it came from.

use crate::error::{Error, Result};
use crate::instance::{PropertyValue, ResourceInstance};
use crate::metadata::Metadata;
use crate::model::{PrimitiveType, ResourceModel, ResourceType, ValueType};
use crate::names;
use crate::native::{Document, NativeType, NativeValue};
use crate::provider_types::ProviderTypeMap;
use chrono::{DateTime, Utc};
use tracing::debug;

// =============================================================================
// Native → resource
// =============================================================================

/// Convert a stored document into a resource instance of a collection's entity type
pub fn to_resource_instance(
    document: &Document,
    metadata: &Metadata,
    collection: &str,
) -> Result<ResourceInstance> {
    let entity = metadata.model.entity_type_of(collection)?;
    Ok(instance_from_document(document, &metadata.model, entity))
}

fn instance_from_document(
    document: &Document,
    model: &ResourceModel,
    ty: &ResourceType,
) -> ResourceInstance {
    let mut instance = ResourceInstance::new(ty.full_name());
    for property in ty.properties() {
        let value = match document.get(property.native_name()) {
            None | Some(NativeValue::Null) => PropertyValue::Null,
            Some(native) => match property_value(native, property.value_type(), model) {
                Some(value) => value,
                None => {
                    debug!(
                        target: "docshape::metadata",
                        type_name = ty.full_name(),
                        property = property.name(),
                        native_type = %native.native_type(),
                        declared = %property.value_type(),
                        "Value does not fit declared type, reading as null"
                    );
                    PropertyValue::Null
                }
            },
        };
        instance.set(property.name(), value);
    }
    instance
}

/// Convert one native value to a property value of the declared type
///
/// Returns None if the value cannot be represented by that type.
pub fn property_value(
    native: &NativeValue,
    declared: &ValueType,
    model: &ResourceModel,
) -> Option<PropertyValue> {
    if native.is_null() {
        return Some(PropertyValue::Null);
    }
    match declared {
        ValueType::Primitive(p) | ValueType::Nullable(p) => primitive_value(native, *p),
        ValueType::Complex(name) => {
            let ty = model.resolve_type(name)?;
            let doc = native.as_document()?;
            Some(PropertyValue::Complex(instance_from_document(doc, model, ty)))
        }
        ValueType::Collection(item) => {
            let items = native.as_array()?;
            let mut values = Vec::with_capacity(items.len());
            for element in items {
                values.push(property_value(element, item, model)?);
            }
            Some(PropertyValue::Collection(values))
        }
    }
}

fn primitive_value(native: &NativeValue, target: PrimitiveType) -> Option<PropertyValue> {
    use NativeValue as N;
    match (target, native) {
        (PrimitiveType::Boolean, N::Boolean(b)) => Some(PropertyValue::Boolean(*b)),

        (PrimitiveType::Int32, N::Int32(i)) => Some(PropertyValue::Int32(*i)),
        (PrimitiveType::Int32, N::Int64(i)) => i32::try_from(*i).ok().map(PropertyValue::Int32),

        (PrimitiveType::Int64, N::Int32(i)) => Some(PropertyValue::Int64(i64::from(*i))),
        (PrimitiveType::Int64, N::Int64(i)) => Some(PropertyValue::Int64(*i)),

        (PrimitiveType::Double, N::Double(f)) => Some(PropertyValue::Double(*f)),
        (PrimitiveType::Double, N::Int32(i)) => Some(PropertyValue::Double(f64::from(*i))),
        (PrimitiveType::Double, N::Int64(i)) => Some(PropertyValue::Double(*i as f64)),

        (PrimitiveType::String, N::String(s)) => Some(PropertyValue::String(s.clone())),
        (PrimitiveType::String, N::ObjectId(id)) => Some(PropertyValue::String(id.to_hex())),
        (PrimitiveType::String, N::Boolean(b)) => Some(PropertyValue::String(b.to_string())),
        (PrimitiveType::String, N::Int32(i)) => Some(PropertyValue::String(i.to_string())),
        (PrimitiveType::String, N::Int64(i)) => Some(PropertyValue::String(i.to_string())),
        (PrimitiveType::String, N::Double(f)) => Some(PropertyValue::String(f.to_string())),
        (PrimitiveType::String, N::DateTime(ms)) => {
            DateTime::<Utc>::from_timestamp_millis(*ms)
                .map(|dt| PropertyValue::String(dt.to_rfc3339()))
        }

        (PrimitiveType::DateTime, N::DateTime(ms)) => {
            DateTime::<Utc>::from_timestamp_millis(*ms).map(PropertyValue::DateTime)
        }
        // Increment has no calendar meaning
        (PrimitiveType::DateTime, N::Timestamp { seconds, .. }) => {
            DateTime::<Utc>::from_timestamp(i64::from(*seconds), 0).map(PropertyValue::DateTime)
        }

        (PrimitiveType::Binary, N::Binary(bytes)) => Some(PropertyValue::Binary(bytes.clone())),

        _ => None,
    }
}

// =============================================================================
// Resource → native
// =============================================================================

/// Convert a resource instance into a stored document
///
/// Only non-null properties are emitted.
pub fn to_document(
    instance: &ResourceInstance,
    metadata: &Metadata,
    collection: &str,
) -> Result<Document> {
    let entity = metadata.model.entity_type_of(collection)?;
    document_from_instance(
        instance,
        &metadata.model,
        &metadata.provider_types,
        collection,
        entity,
        &[],
    )
}

fn document_from_instance(
    instance: &ResourceInstance,
    model: &ResourceModel,
    provider_types: &ProviderTypeMap,
    collection: &str,
    ty: &ResourceType,
    prefix: &[&str],
) -> Result<Document> {
    let mut document = Document::new();
    for property in ty.properties() {
        let value = match instance.try_get(property.name()) {
            None | Some(PropertyValue::Null) => continue,
            Some(value) => value,
        };
        let mut path: Vec<&str> = prefix.to_vec();
        path.push(property.native_name());
        let native = native_for_property(
            value,
            property.value_type(),
            model,
            provider_types,
            collection,
            &path,
        )?;
        document.insert(property.native_name(), native);
    }
    Ok(document)
}

/// Convert a property value into the native value stored for a field
///
/// `path` is the native field path within `collection`.
pub fn native_for_property(
    value: &PropertyValue,
    declared: &ValueType,
    model: &ResourceModel,
    provider_types: &ProviderTypeMap,
    collection: &str,
    path: &[&str],
) -> Result<NativeValue> {
    match (declared, value) {
        (_, PropertyValue::Null) => Ok(NativeValue::Null),
        (ValueType::Complex(name), PropertyValue::Complex(nested)) => {
            let ty = model
                .resolve_type(name)
                .ok_or_else(|| Error::UnknownType(name.clone()))?;
            Ok(NativeValue::Document(document_from_instance(
                nested,
                model,
                provider_types,
                collection,
                ty,
                path,
            )?))
        }
        (ValueType::Collection(item), PropertyValue::Collection(items)) => {
            let mut natives = Vec::with_capacity(items.len());
            for element in items {
                natives.push(native_for_property(
                    element,
                    item,
                    model,
                    provider_types,
                    collection,
                    path,
                )?);
            }
            Ok(NativeValue::Array(natives))
        }
        (ValueType::Primitive(p) | ValueType::Nullable(p), scalar) => {
            let target = match provider_types.field(collection, path) {
                Some(native) if native.is_scalar() => native,
                _ => p.default_native(),
            };
            Ok(coerce_native(scalar, target).unwrap_or_else(|| default_native(scalar)))
        }
        (declared, value) => Err(Error::InvalidOperation(format!(
            "{} value cannot be stored in a {} property at '{}'",
            value.type_name(),
            declared,
            names::qualified_path(collection, path)
        ))),
    }
}

/// Coerce a scalar property value into a specific native type
///
/// Returns None when the value has no lossless representation in `target`.
pub fn coerce_native(value: &PropertyValue, target: NativeType) -> Option<NativeValue> {
    use PropertyValue as P;
    match (target, value) {
        (_, P::Null) => Some(NativeValue::Null),
        (NativeType::Boolean, P::Boolean(b)) => Some(NativeValue::Boolean(*b)),

        (NativeType::Int32, P::Int32(i)) => Some(NativeValue::Int32(*i)),
        (NativeType::Int32, P::Int64(i)) => i32::try_from(*i).ok().map(NativeValue::Int32),
        (NativeType::Int32, P::Double(f)) if f.fract() == 0.0 => {
            let i = *f as i64;
            i32::try_from(i).ok().map(NativeValue::Int32)
        }

        (NativeType::Int64, P::Int32(i)) => Some(NativeValue::Int64(i64::from(*i))),
        (NativeType::Int64, P::Int64(i)) => Some(NativeValue::Int64(*i)),
        (NativeType::Int64, P::Double(f))
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
        {
            Some(NativeValue::Int64(*f as i64))
        }

        (NativeType::Double, P::Double(f)) => Some(NativeValue::Double(*f)),
        (NativeType::Double, P::Int32(i)) => Some(NativeValue::Double(f64::from(*i))),
        (NativeType::Double, P::Int64(i)) => Some(NativeValue::Double(*i as f64)),

        (NativeType::String, P::String(s)) => Some(NativeValue::String(s.clone())),
        (NativeType::ObjectId, P::String(s)) => s.parse().ok().map(NativeValue::ObjectId),

        (NativeType::DateTime, P::DateTime(dt)) => {
            Some(NativeValue::DateTime(dt.timestamp_millis()))
        }
        (NativeType::Timestamp, P::DateTime(dt)) => u32::try_from(dt.timestamp())
            .ok()
            .map(|seconds| NativeValue::Timestamp {
                seconds,
                increment: 0,
            }),

        (NativeType::Binary, P::Binary(bytes)) => Some(NativeValue::Binary(bytes.clone())),
        _ => None,
    }
}

/// Native value for a property value with no recorded native type
pub fn default_native(value: &PropertyValue) -> NativeValue {
    match value {
        PropertyValue::Null => NativeValue::Null,
        PropertyValue::Boolean(b) => NativeValue::Boolean(*b),
        PropertyValue::Int32(i) => NativeValue::Int32(*i),
        PropertyValue::Int64(i) => NativeValue::Int64(*i),
        PropertyValue::Double(f) => NativeValue::Double(*f),
        PropertyValue::String(s) => NativeValue::String(s.clone()),
        PropertyValue::DateTime(dt) => NativeValue::DateTime(dt.timestamp_millis()),
        PropertyValue::Binary(bytes) => NativeValue::Binary(bytes.clone()),
        PropertyValue::Complex(instance) => NativeValue::Document(
            instance
                .properties()
                .map(|(k, v)| (k.to_string(), default_native(v)))
                .collect(),
        ),
        PropertyValue::Collection(items) => {
            NativeValue::Array(items.iter().map(default_native).collect())
        }
    }
}

/// Native identifier for a key value of a collection's entity type
pub fn key_to_native(
    metadata: &Metadata,
    collection: &str,
    key: &PropertyValue,
) -> Result<NativeValue> {
    let entity = metadata.model.entity_type_of(collection)?;
    let key_property = entity
        .key_property()
        .ok_or_else(|| {
            Error::InvalidModel(format!("'{}' has no key property", entity.full_name()))
        })?;
    if key.is_null() {
        return Err(Error::InvalidOperation(format!(
            "null key for resource in '{}'",
            collection
        )));
    }
    let path = [key_property.native_name()];
    match metadata.provider_types.field(collection, &path) {
        Some(native) if native.is_scalar() => coerce_native(key, native).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "{} key cannot identify a document in '{}' keyed by {}",
                key.type_name(),
                collection,
                native
            ))
        }),
        _ => native_for_property(
            key,
            key_property.value_type(),
            &metadata.model,
            &metadata.provider_types,
            collection,
            &path,
        ),
    }
}
