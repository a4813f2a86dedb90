//! ChangeTracker: unit-of-work over resource instances
//!
//! Buffers create/update/delete operations against resource instances and
//! replays them against the document store on `save_changes`.
//!
//! # Rules
//!
//! - `create_resource` appends an Insert; values set on it are buffered in
//!   the instance and written as one document
//! - `set_value` on a tracked (existing) resource finds or creates its Update
//!   entry; the last write per property wins
//! - `delete_resource` appends a Delete, or drops the pending Insert if the
//!   resource was created in this unit of work
//! - `save_changes` replays entries in recorded order: inserts as full
//!   documents, updates as per-field set/unset by native id, deletes by
//!   native id
//!
//! An update or delete whose native id matches no document fails with
//! `DocumentNotFound`. The first failing operation stops the replay and its
//! error is returned.
//! Entries already applied are removed from the pending list and are not
//! rolled back; the failed entry and everything after it stay pending.
//!
//! A tracker is single-threaded; one tracker per unit of work.

use docshape_core::convert::{key_to_native, native_for_property, property_value};
use docshape_core::{
    Document, Error, Metadata, NativeValue, PrimitiveType, PropertyKind, PropertyValue,
    ResourceInstance, ResourceProperty, Result, ValueType,
};
use docshape_storage::DocumentStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle of a resource tracked by a `ChangeTracker`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(u64);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

/// Kind of a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Write a new document
    Insert,
    /// Set/unset fields of an existing document
    Update,
    /// Remove an existing document
    Delete,
}

/// One buffered change
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Backing collection (resource set name)
    pub collection: String,
    /// Affected resource
    pub handle: ResourceHandle,
    /// Kind of change
    pub kind: ChangeKind,
    /// Modified properties with their latest values (updates only)
    pub modified: Vec<(String, PropertyValue)>,
}

/// Counts of operations applied by `save_changes`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveResult {
    /// Documents inserted
    pub inserted: usize,
    /// Documents updated
    pub updated: usize,
    /// Documents deleted
    pub deleted: usize,
}

impl SaveResult {
    /// Total number of operations applied
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

#[derive(Debug, Clone)]
struct TrackedResource {
    collection: String,
    instance: ResourceInstance,
    deleted: bool,
}

/// Unit of work over one metadata snapshot and one store
pub struct ChangeTracker {
    store: Arc<dyn DocumentStore>,
    metadata: Arc<Metadata>,
    resources: HashMap<ResourceHandle, TrackedResource>,
    pending: Vec<PendingChange>,
    next_handle: u64,
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("store", &self.store.identity())
            .field("tracked", &self.resources.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ChangeTracker {
    /// Start a unit of work
    pub fn new(store: Arc<dyn DocumentStore>, metadata: Arc<Metadata>) -> Self {
        ChangeTracker {
            store,
            metadata,
            resources: HashMap::new(),
            pending: Vec::new(),
            next_handle: 1,
        }
    }

    fn allocate(&mut self, collection: &str, instance: ResourceInstance) -> ResourceHandle {
        let handle = ResourceHandle(self.next_handle);
        self.next_handle += 1;
        self.resources.insert(
            handle,
            TrackedResource {
                collection: collection.to_string(),
                instance,
                deleted: false,
            },
        );
        handle
    }

    fn tracked(&self, handle: ResourceHandle) -> Result<&TrackedResource> {
        match self.resources.get(&handle) {
            Some(resource) if !resource.deleted => Ok(resource),
            Some(_) => Err(Error::InvalidOperation(format!("{} was deleted", handle))),
            None => Err(Error::InvalidOperation(format!("{} is not tracked", handle))),
        }
    }

    /// Create a new, empty resource in a set
    pub fn create_resource(&mut self, set: &str) -> Result<ResourceHandle> {
        let entity = self.metadata.model.entity_type_of(set)?;
        let instance = ResourceInstance::new(entity.full_name());
        let handle = self.allocate(set, instance);
        self.pending.push(PendingChange {
            collection: set.to_string(),
            handle,
            kind: ChangeKind::Insert,
            modified: Vec::new(),
        });
        debug!(target: "docshape::changes", %handle, set, "Created resource");
        Ok(handle)
    }

    /// Track an existing resource (for example one returned by a query)
    ///
    /// Tracking the same key twice returns the same handle.
    pub fn get_resource(
        &mut self,
        set: &str,
        instance: &ResourceInstance,
    ) -> Result<ResourceHandle> {
        let entity = self.metadata.model.entity_type_of(set)?;
        if instance.type_name() != entity.full_name() {
            return Err(Error::InvalidOperation(format!(
                "resource of type '{}' does not belong to set '{}'",
                instance.type_name(),
                set
            )));
        }
        let key_property = entity
            .key_property()
            .ok_or_else(|| Error::InvalidModel(format!("'{}' has no key", entity.full_name())))?;
        let key = instance.get(key_property.name())?;
        if key.is_null() {
            return Err(Error::InvalidOperation(format!(
                "resource in '{}' has a null key",
                set
            )));
        }
        let key_name = key_property.name().to_string();
        let existing = self.resources.iter().find(|(_, r)| {
            !r.deleted && r.collection == set && r.instance.try_get(&key_name) == Some(key)
        });
        if let Some((handle, _)) = existing {
            return Ok(*handle);
        }
        Ok(self.allocate(set, instance.clone()))
    }

    /// Current state of a tracked resource
    pub fn resolve_resource(&self, handle: ResourceHandle) -> Result<&ResourceInstance> {
        Ok(&self.tracked(handle)?.instance)
    }

    /// Set a property of a tracked resource
    ///
    /// # Errors
    ///
    /// `StructuralMismatch` for unknown properties, `InvalidPropertyType` for
    /// values of the wrong type, `InvalidOperation` when changing the key of
    /// a stored resource or touching a deleted one.
    pub fn set_value(
        &mut self,
        handle: ResourceHandle,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let resource = self.tracked(handle)?;
        let collection = resource.collection.clone();
        let type_name = resource.instance.type_name().to_string();
        let declared = self
            .metadata
            .model
            .resolve_property(&type_name, property)
            .ok_or_else(|| Error::structural_mismatch(&type_name, property))?;
        let value = check_value(declared, value.into())?;

        let insert_pending = self
            .pending
            .iter()
            .any(|c| c.handle == handle && c.kind == ChangeKind::Insert);
        if declared.is_key() && !insert_pending {
            return Err(Error::InvalidOperation(format!(
                "key '{}' of a stored resource cannot change",
                property
            )));
        }

        if let Some(resource) = self.resources.get_mut(&handle) {
            resource.instance.set(property, value.clone());
        }
        if insert_pending {
            return Ok(());
        }

        let entry = match self
            .pending
            .iter()
            .position(|c| c.handle == handle && c.kind == ChangeKind::Update)
        {
            Some(idx) => &mut self.pending[idx],
            None => {
                self.pending.push(PendingChange {
                    collection,
                    handle,
                    kind: ChangeKind::Update,
                    modified: Vec::new(),
                });
                let last = self.pending.len() - 1;
                &mut self.pending[last]
            }
        };
        match entry.modified.iter_mut().find(|(name, _)| name == property) {
            Some((_, slot)) => *slot = value,
            None => entry.modified.push((property.to_string(), value)),
        }
        Ok(())
    }

    /// Delete a tracked resource
    pub fn delete_resource(&mut self, handle: ResourceHandle) -> Result<()> {
        let collection = self.tracked(handle)?.collection.clone();
        let insert_idx = self
            .pending
            .iter()
            .position(|c| c.handle == handle && c.kind == ChangeKind::Insert);
        match insert_idx {
            Some(idx) => {
                // Never written: forget it entirely
                self.pending.remove(idx);
                self.resources.remove(&handle);
            }
            None => {
                self.pending
                    .retain(|c| !(c.handle == handle && c.kind == ChangeKind::Update));
                self.pending.push(PendingChange {
                    collection,
                    handle,
                    kind: ChangeKind::Delete,
                    modified: Vec::new(),
                });
                if let Some(resource) = self.resources.get_mut(&handle) {
                    resource.deleted = true;
                }
            }
        }
        debug!(target: "docshape::changes", %handle, "Deleted resource");
        Ok(())
    }

    /// Pending changes in replay order
    pub fn pending_changes(&self) -> &[PendingChange] {
        &self.pending
    }

    /// True if anything would be written by `save_changes`
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard pending changes and tracked resources without writing
    pub fn clear_changes(&mut self) {
        debug!(
            target: "docshape::changes",
            discarded = self.pending.len(),
            "Clearing pending changes"
        );
        self.pending.clear();
        self.resources.clear();
    }

    /// Replay pending changes against the store
    pub fn save_changes(&mut self) -> Result<SaveResult> {
        let mut result = SaveResult::default();
        let pending = std::mem::take(&mut self.pending);
        let mut remaining = pending.into_iter();
        while let Some(change) = remaining.next() {
            if let Err(e) = self.apply(&change, &mut result) {
                warn!(
                    target: "docshape::changes",
                    handle = %change.handle,
                    kind = ?change.kind,
                    collection = %change.collection,
                    applied = result.total(),
                    error = %e,
                    "Save aborted"
                );
                self.pending = std::iter::once(change).chain(remaining).collect();
                return Err(e);
            }
        }
        self.resources.retain(|_, r| !r.deleted);
        info!(
            target: "docshape::changes",
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            "Saved changes"
        );
        Ok(result)
    }

    fn apply(&mut self, change: &PendingChange, result: &mut SaveResult) -> Result<()> {
        let metadata = Arc::clone(&self.metadata);
        let collection = change.collection.as_str();
        match change.kind {
            ChangeKind::Insert => {
                let instance = &self.tracked(change.handle)?.instance;
                let document = docshape_core::to_document(instance, &metadata, collection)?;
                let id = self.store.insert(collection, document)?;
                // Expose the store-assigned key on the tracked instance
                let entity = metadata.model.entity_type_of(collection)?;
                if let Some(key) = entity.key_property() {
                    if let Some(value) = property_value(&id, key.value_type(), &metadata.model) {
                        if let Some(resource) = self.resources.get_mut(&change.handle) {
                            resource.instance.set(key.name(), value);
                        }
                    }
                }
                result.inserted += 1;
            }
            ChangeKind::Update => {
                let id = self.native_key(change.handle, collection)?;
                let entity = metadata.model.entity_type_of(collection)?;
                let mut set = Document::new();
                let mut unset = Vec::new();
                for (name, value) in &change.modified {
                    let property = entity
                        .property(name)
                        .ok_or_else(|| Error::structural_mismatch(entity.full_name(), name))?;
                    if value.is_null() {
                        unset.push(property.native_name().to_string());
                    } else {
                        set.insert(
                            property.native_name(),
                            native_for_property(
                                value,
                                property.value_type(),
                                &metadata.model,
                                &metadata.provider_types,
                                collection,
                                &[property.native_name()],
                            )?,
                        );
                    }
                }
                if self.store.update(collection, &id, set, unset)? == 0 {
                    return Err(not_found(collection, &id));
                }
                result.updated += 1;
            }
            ChangeKind::Delete => {
                let id = self.native_key(change.handle, collection)?;
                if self.store.delete(collection, &id)? == 0 {
                    return Err(not_found(collection, &id));
                }
                result.deleted += 1;
            }
        }
        Ok(())
    }

    fn native_key(&self, handle: ResourceHandle, collection: &str) -> Result<NativeValue> {
        let resource = self
            .resources
            .get(&handle)
            .ok_or_else(|| Error::InvalidOperation(format!("{} is not tracked", handle)))?;
        let entity = self.metadata.model.entity_type_of(collection)?;
        let key = entity
            .key_property()
            .ok_or_else(|| Error::InvalidModel(format!("'{}' has no key", entity.full_name())))?;
        key_to_native(&self.metadata, collection, resource.instance.get(key.name())?)
    }
}

fn not_found(collection: &str, id: &NativeValue) -> Error {
    Error::DocumentNotFound {
        collection: collection.to_string(),
        id: format!("{:?}", id),
    }
}

/// Validate a value against a property's declared type, widening numbers
fn check_value(property: &ResourceProperty, value: PropertyValue) -> Result<PropertyValue> {
    let mismatch = |value: &PropertyValue| {
        Error::invalid_property_type(
            property.name(),
            format!(
                "{} value for {} property",
                value.type_name(),
                property.value_type()
            ),
        )
    };
    match (property.value_type(), value) {
        (ValueType::Primitive(_), PropertyValue::Null) if property.kind() == PropertyKind::Key => {
            Err(Error::invalid_property_type(property.name(), "key cannot be null"))
        }
        (_, PropertyValue::Null) => Ok(PropertyValue::Null),
        (ValueType::Primitive(p) | ValueType::Nullable(p), value) => widen(*p, value, &mismatch),
        (ValueType::Complex(_), value @ PropertyValue::Complex(_)) => Ok(value),
        (ValueType::Collection(_), value @ PropertyValue::Collection(_)) => Ok(value),
        (_, value) => Err(mismatch(&value)),
    }
}

fn widen(
    target: PrimitiveType,
    value: PropertyValue,
    mismatch: &dyn Fn(&PropertyValue) -> Error,
) -> Result<PropertyValue> {
    match (target, value) {
        (PrimitiveType::Int64, PropertyValue::Int32(i)) => Ok(PropertyValue::Int64(i64::from(i))),
        (PrimitiveType::Double, PropertyValue::Int32(i)) => Ok(PropertyValue::Double(f64::from(i))),
        (target, value) if value.primitive_type() == Some(target) => Ok(value),
        (_, value) => Err(mismatch(&value)),
    }
}
