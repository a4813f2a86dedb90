//! Error types for docshape
//!
//! A single error enum is shared by every crate in the workspace. Variants
//! follow the failure taxonomy of the metadata and query layers:
//!
//! - `UnresolvableType`: a native value cannot be mapped to a value type
//!   (inference logs it and defers the field; it is never fatal there)
//! - `InvalidPropertyType`: a caller asked the model for a property type it
//!   cannot represent
//! - `StructuralMismatch`: a query or an instance access names a field that is
//!   not part of the known metadata
//! - `StoreOperationFailed`: a native store round-trip failed; always
//!   propagated unchanged
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for docshape operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for docshape
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A native value's type cannot be mapped to a representable value type
    #[error("Unresolvable type for '{path}': {reason}")]
    UnresolvableType {
        /// Qualified field path (`collection.field`)
        path: String,
        /// Why the type could not be resolved
        reason: String,
    },

    /// The model cannot represent the requested property type
    #[error("Invalid property type for '{property}': {reason}")]
    InvalidPropertyType {
        /// Property name the caller tried to add
        property: String,
        /// Why the type was rejected
        reason: String,
    },

    /// A field referenced by a query or accessor is not part of the metadata
    #[error("Structural mismatch: field '{field}' is not defined on '{type_name}'")]
    StructuralMismatch {
        /// Type the field was looked up on
        type_name: String,
        /// Field that could not be found
        field: String,
    },

    /// A native store round-trip failed
    #[error("Store operation '{operation}' failed: {message}")]
    StoreOperationFailed {
        /// Operation being performed (`scan`, `insert`, ...)
        operation: String,
        /// Message reported by the store
        message: String,
    },

    /// A type with the same full name already exists
    #[error("Duplicate resource type: {0}")]
    DuplicateType(String),

    /// A type name could not be resolved
    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    /// A resource set name could not be resolved
    #[error("Unknown resource set: {0}")]
    UnknownResourceSet(String),

    /// A model operation violates a structural rule (wrong type kind, second set for a type, ...)
    #[error("Invalid model operation: {0}")]
    InvalidModel(String),

    /// Mutation attempted on a frozen model
    #[error("Resource model is read-only: {0}")]
    ReadOnly(String),

    /// The query tree contains a node the translator cannot handle
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// An update or delete addressed a document the store does not hold
    #[error("No document in '{collection}' with id {id}")]
    DocumentNotFound {
        /// Collection the write targeted
        collection: String,
        /// Native identifier, rendered for display
        id: String,
    },

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Build a `StructuralMismatch` error
    pub fn structural_mismatch(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Error::StructuralMismatch {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Build an `InvalidPropertyType` error
    pub fn invalid_property_type(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPropertyType {
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Build a `StoreOperationFailed` error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StoreOperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build an `UnresolvableType` error
    pub fn unresolvable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnresolvableType {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build an `UnsupportedExpression` error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedExpression(message.into())
    }

    /// True for `StructuralMismatch`
    pub fn is_structural_mismatch(&self) -> bool {
        matches!(self, Error::StructuralMismatch { .. })
    }

    /// True for `DocumentNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DocumentNotFound { .. })
    }

    /// True for `StoreOperationFailed`
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::StoreOperationFailed { .. })
    }
}
