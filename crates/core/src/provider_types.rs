//! Provider type map
//!
//! Records, per qualified field path (`collection.field`,
//! `collection.nested.field`), the native type last observed for that field.
//! The model type of a field is often widened (nullable, object id shown as
//! string); native filters need the concrete type, so the translator looks it
//! up here rather than in the model.
//!
//! An entry can also be assumed rather than observed (the synthetic key of a
//! collection no document has been read from yet). The first `record` for the
//! path replaces the assumption.

use crate::names;
use crate::native::NativeType;
use std::collections::{HashMap, HashSet};

/// Qualified field path → last observed native type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderTypeMap {
    types: HashMap<String, NativeType>,
    assumed: HashSet<String>,
}

impl ProviderTypeMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the native type of a field, returning the previous entry
    pub fn record(&mut self, path: impl Into<String>, native: NativeType) -> Option<NativeType> {
        let path = path.into();
        self.assumed.remove(&path);
        self.types.insert(path, native)
    }

    /// Record a native type that was not observed in any document
    pub fn assume(&mut self, path: impl Into<String>, native: NativeType) -> Option<NativeType> {
        let path = path.into();
        self.assumed.insert(path.clone());
        self.types.insert(path, native)
    }

    /// True if the entry for a path is assumed rather than observed
    pub fn is_assumed(&self, path: &str) -> bool {
        self.assumed.contains(path)
    }

    /// Native type of a qualified path
    pub fn get(&self, path: &str) -> Option<NativeType> {
        self.types.get(path).copied()
    }

    /// Native type of a field addressed by collection and native field names
    pub fn field(&self, collection: &str, fields: &[&str]) -> Option<NativeType> {
        self.get(&names::qualified_path(collection, fields))
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate recorded paths
    pub fn iter(&self) -> impl Iterator<Item = (&str, NativeType)> {
        self.types.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
