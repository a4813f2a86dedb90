//! Core types for docshape
//!
//! This crate defines the foundational types used throughout the system:
//! - Native values: Document, NativeValue, NativeType, ObjectId
//! - Resource model: ResourceModel, ResourceType, ResourceProperty, ResourceSet
//! - Resource instances: ResourceInstance, PropertyValue
//! - Provider type map and structural shapes (the native view of the model)
//! - Metadata: model + provider types + shapes, as cached and snapshotted
//! - Conversion between documents and resource instances
//! - MetadataConfig
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod convert;
pub mod error;
pub mod instance;
pub mod metadata;
pub mod model;
pub mod names;
pub mod native;
pub mod provider_types;
pub mod shape;

pub use config::MetadataConfig;
pub use convert::{key_to_native, to_document, to_resource_instance};
pub use error::{Error, Result};
pub use instance::{PropertyValue, ResourceInstance};
pub use metadata::Metadata;
pub use model::{
    PrimitiveType, PropertyKind, ResourceModel, ResourceProperty, ResourceSet, ResourceType,
    ResourceTypeKind, ValueType,
};
pub use native::{Document, NativeType, NativeValue, ObjectId};
pub use provider_types::ProviderTypeMap;
pub use shape::{ShapeField, StructuralShape};
