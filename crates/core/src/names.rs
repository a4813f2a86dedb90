//! Identifier normalization
//!
//! Store field and collection names are arbitrary strings; the consuming type
//! system needs identifiers. Normalization rules:
//!
//! - `_id` maps to the key property name [`KEY_PROPERTY_NAME`]
//! - characters outside `[A-Za-z0-9_]` become `_`
//! - a leading `_`, a leading digit, or the reserved [`RESERVED_PREFIX`] gets
//!   the [`INVALID_NAME_PREFIX`] prepended
//!
//! The original field name is kept on the property (`native_name`), so
//! normalization never has to be reversed.

use crate::native::NATIVE_ID_FIELD;

/// Property name the native identifier is exposed as
pub const KEY_PROPERTY_NAME: &str = "db_id";

/// Prefix reserved for names generated by this crate
pub const RESERVED_PREFIX: &str = "db_";

/// Prefix prepended to names that are not safe identifiers
pub const INVALID_NAME_PREFIX: &str = "x";

/// Collections with this prefix belong to the store itself
pub const SYSTEM_COLLECTION_PREFIX: &str = "system.";

/// Normalize a native field name into a property name
pub fn property_name(native: &str) -> String {
    if native == NATIVE_ID_FIELD {
        return KEY_PROPERTY_NAME.to_string();
    }
    identifier(native)
}

/// Normalize a collection or type name fragment
pub fn identifier(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let needs_prefix = match name.chars().next() {
        None => true,
        Some(c) => c == '_' || c.is_ascii_digit() || name.starts_with(RESERVED_PREFIX),
    };
    if needs_prefix {
        name.insert_str(0, INVALID_NAME_PREFIX);
    }
    name
}

/// Name of the complex type generated for an embedded object
///
/// `<collection>_<field>` by default; the field name alone when complex type
/// names are global.
pub fn complex_type_name(owner: &str, field: &str, global: bool) -> String {
    if global {
        identifier(field)
    } else {
        format!("{}_{}", identifier(owner), property_name(field))
    }
}

/// Qualified provider path (`collection.field.sub`)
pub fn qualified_path(collection: &str, fields: &[&str]) -> String {
    let mut path = collection.to_string();
    for field in fields {
        path.push('.');
        path.push_str(field);
    }
    path
}

/// True for collections owned by the store itself (`system.*`)
pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_COLLECTION_PREFIX)
}
