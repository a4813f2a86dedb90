//! Schema inference
//!
//! Builds a resource model and provider type map from sampled documents, and
//! folds documents read later into an existing model.
//!
//! ## Folding rules
//!
//! For every field of a document, relative to its owner type:
//!
//! 1. Known field holding an object or array: recurse into the nested
//!    structure (the owner's complex type, or the item type of a collection).
//! 2. Unknown field:
//!    - object: complex type `<owner>_<field>` (or `<field>` with global
//!      names), then recurse
//!    - array: object elements recurse into an item complex type, scalar
//!      elements register a collection of that primitive
//!    - scalar: nullable primitive property
//!    - null or empty array: deferred until a later value resolves it
//! 3. Fields still deferred when a pass finishes become nullable strings.
//! 4. `_id` holding an object id (or missing everywhere) becomes the synthetic
//!    string key `db_id`; any other scalar `_id` becomes a natural key.
//!
//! Conflicting types keep the first registration in the model; the provider
//! type map keeps the last observed native type.

use docshape_core::names;
use docshape_core::native::NATIVE_ID_FIELD;
use docshape_core::{
    Document, Error, Metadata, MetadataConfig, NativeType, NativeValue, PrimitiveType,
    ProviderTypeMap, ResourceModel, ResourceProperty, ResourceTypeKind, Result, ValueType,
};
use docshape_storage::{DocumentStore, ScanOrder};
use tracing::{debug, info, warn};

/// Build metadata for every non-system collection of a store
///
/// # Errors
///
/// Store failures are propagated unchanged; naming collisions and
/// unresolvable values are logged and skipped.
pub fn infer_metadata(store: &dyn DocumentStore, config: &MetadataConfig) -> Result<Metadata> {
    config.validate()?;
    if config.sample_limit() == Some(0) && !config.update_dynamically {
        warn!(
            target: "docshape::metadata",
            store = store.identity(),
            "prefetch_count = 0 without update_dynamically; sets expose only their key"
        );
    }
    let order = if config.fetch_from_end {
        ScanOrder::Reverse
    } else {
        ScanOrder::Forward
    };

    let mut model = ResourceModel::default();
    let mut provider_types = ProviderTypeMap::new();
    let mut sampled = 0usize;
    {
        let mut session = Inference::new(&mut model, &mut provider_types, config);
        for collection in store.collection_names()? {
            if names::is_system_collection(&collection) {
                debug!(
                    target: "docshape::metadata",
                    collection = %collection,
                    "Skipping system collection"
                );
                continue;
            }
            let Some(entity) = session.register_collection(&collection)? else {
                continue;
            };
            if config.sample_limit() != Some(0) {
                for document in store.scan(&collection, order, config.sample_limit())? {
                    session.fold_document(&entity, &collection, &document?)?;
                    sampled += 1;
                }
            }
            session.finish_collection(&entity, &collection)?;
        }
    }

    let metadata = Metadata::new(model, provider_types)?;
    info!(
        target: "docshape::metadata",
        store = store.identity(),
        sets = metadata.model.sets().count(),
        types = metadata.model.types().count(),
        sampled,
        "Metadata populated"
    );
    Ok(metadata)
}

/// Fold one document into existing metadata
///
/// Registers the collection if it is new. Shapes are rebuilt when anything
/// changed. Returns true if the model or provider type map changed.
pub fn fold_into(
    metadata: &mut Metadata,
    config: &MetadataConfig,
    collection: &str,
    document: &Document,
) -> Result<bool> {
    if names::is_system_collection(collection) {
        return Ok(false);
    }
    let changed = {
        let mut session = Inference::new(
            &mut metadata.model,
            &mut metadata.provider_types,
            config,
        );
        let Some(entity) = session.register_collection(collection)? else {
            return Ok(false);
        };
        session.fold_document(&entity, collection, document)?;
        session.finish_collection(&entity, collection)?;
        session.changed
    };
    if changed {
        metadata.rebuild_shapes()?;
        debug!(target: "docshape::metadata", collection, "Folded new structure into metadata");
    }
    Ok(changed)
}

/// Field seen only with null or empty values so far
#[derive(Debug, Clone, PartialEq)]
struct Deferred {
    owner: String,
    native_name: String,
}

/// One inference pass over a mutable model
struct Inference<'a> {
    model: &'a mut ResourceModel,
    provider_types: &'a mut ProviderTypeMap,
    config: &'a MetadataConfig,
    deferred: Vec<Deferred>,
    changed: bool,
}

impl<'a> Inference<'a> {
    fn new(
        model: &'a mut ResourceModel,
        provider_types: &'a mut ProviderTypeMap,
        config: &'a MetadataConfig,
    ) -> Self {
        Inference {
            model,
            provider_types,
            config,
            deferred: Vec::new(),
            changed: false,
        }
    }

    /// Entity type and set for a collection, created on first sight
    ///
    /// Returns None when the normalized name collides with another type.
    fn register_collection(&mut self, collection: &str) -> Result<Option<String>> {
        if let Some(set) = self.model.resolve_set(collection) {
            return Ok(Some(set.entity_type().to_string()));
        }
        let full_name = match self.model.add_entity_type(collection) {
            Ok(ty) => ty.full_name().to_string(),
            Err(Error::DuplicateType(existing)) => {
                warn!(
                    target: "docshape::metadata",
                    collection,
                    existing = %existing,
                    "Collection name collides with an existing type; skipping"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.model.add_resource_set(collection, &full_name)?;
        self.changed = true;
        debug!(
            target: "docshape::metadata",
            collection,
            entity = %full_name,
            "Registered collection"
        );
        Ok(Some(full_name))
    }

    fn fold_document(&mut self, entity: &str, collection: &str, document: &Document) -> Result<()> {
        self.fold_fields(entity, collection, &[], document)
    }

    fn fold_fields(
        &mut self,
        owner: &str,
        collection: &str,
        prefix: &[&str],
        document: &Document,
    ) -> Result<()> {
        for (name, value) in document.iter() {
            match self.register_field(owner, collection, prefix, name, value) {
                Ok(()) => {}
                Err(e @ Error::ReadOnly(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        target: "docshape::metadata",
                        path = %names::qualified_path(collection, &with(prefix, name)),
                        error = %e,
                        "Skipping field"
                    );
                }
            }
        }
        Ok(())
    }

    fn register_field(
        &mut self,
        owner: &str,
        collection: &str,
        prefix: &[&str],
        native_name: &str,
        value: &NativeValue,
    ) -> Result<()> {
        let path = with(prefix, native_name);
        let existing = self
            .model
            .resolve_type(owner)
            .and_then(|ty| ty.property_by_native(native_name))
            .cloned();
        match existing {
            Some(property) if prefix.is_empty() && property.is_key() => {
                self.refine_key(owner, collection, &property, value)
            }
            Some(property) => self.refine(&property, collection, &path, value),
            None if prefix.is_empty() && native_name == NATIVE_ID_FIELD => {
                self.register_key(owner, collection, value)
            }
            None => self.register_new(owner, collection, &path, value),
        }
    }

    /// Known field: recurse into nested structure, report conflicts
    fn refine(
        &mut self,
        property: &ResourceProperty,
        collection: &str,
        path: &[&str],
        value: &NativeValue,
    ) -> Result<()> {
        match (property.value_type(), value) {
            (_, NativeValue::Null) => Ok(()),
            (ValueType::Complex(ty), NativeValue::Document(nested)) => {
                self.fold_fields(ty, collection, path, nested)
            }
            (ValueType::Collection(item), NativeValue::Array(items)) => {
                self.record(collection, path, NativeType::Array);
                if let ValueType::Complex(ty) = item.as_ref() {
                    for element in items {
                        if let NativeValue::Document(nested) = element {
                            self.fold_fields(ty, collection, path, nested)?;
                        }
                    }
                }
                Ok(())
            }
            (declared, value) => {
                let observed = value.native_type();
                let fits = declared.primitive().is_some()
                    && declared.primitive() == PrimitiveType::from_native(observed);
                if !fits {
                    warn!(
                        target: "docshape::metadata",
                        path = %names::qualified_path(collection, path),
                        declared = %declared,
                        observed = %observed,
                        "Conflicting field type; keeping first registration"
                    );
                }
                if declared.primitive().is_some() && observed.is_scalar() {
                    self.record(collection, path, observed);
                }
                Ok(())
            }
        }
    }

    /// Known key: an assumed synthetic key takes the type of the first
    /// stored identifier
    fn refine_key(
        &mut self,
        entity: &str,
        collection: &str,
        property: &ResourceProperty,
        value: &NativeValue,
    ) -> Result<()> {
        let key_path = names::qualified_path(collection, &[property.native_name()]);
        if value.is_null() || !self.provider_types.is_assumed(&key_path) {
            return self.refine(property, collection, &[property.native_name()], value);
        }
        let Some(key_type) = PrimitiveType::from_native(value.native_type()) else {
            self.unresolvable(collection, &[NATIVE_ID_FIELD], "identifier is not a scalar");
            return Ok(());
        };
        let key_type = ValueType::Primitive(key_type);
        if property.value_type() != &key_type {
            self.model.set_key_type(entity, key_type)?;
            info!(
                target: "docshape::metadata",
                collection,
                native = %value.native_type(),
                "Retyped key from first stored identifier"
            );
        }
        self.record(collection, &[NATIVE_ID_FIELD], value.native_type());
        self.changed = true;
        Ok(())
    }

    fn register_key(&mut self, entity: &str, collection: &str, value: &NativeValue) -> Result<()> {
        let key_type = match value {
            // Treated as missing; the synthetic key is added when the pass ends
            NativeValue::Null => return Ok(()),
            NativeValue::ObjectId(_) => PrimitiveType::String,
            other => match PrimitiveType::from_native(other.native_type()) {
                Some(p) => p,
                None => {
                    self.unresolvable(collection, &[NATIVE_ID_FIELD], "identifier is not a scalar");
                    return Ok(());
                }
            },
        };
        self.model
            .add_key_property(entity, NATIVE_ID_FIELD, ValueType::Primitive(key_type))?;
        self.record(collection, &[NATIVE_ID_FIELD], value.native_type());
        self.changed = true;
        debug!(
            target: "docshape::metadata",
            collection,
            native = %value.native_type(),
            "Registered key"
        );
        Ok(())
    }

    fn register_new(
        &mut self,
        owner: &str,
        collection: &str,
        path: &[&str],
        value: &NativeValue,
    ) -> Result<()> {
        let Some(native_name) = path.last().copied() else {
            return Ok(());
        };
        match value {
            NativeValue::Null => {
                self.defer(owner, native_name);
                Ok(())
            }
            NativeValue::Document(nested) => {
                let Some(ty) = self.complex_type(owner, native_name)? else {
                    return Ok(());
                };
                self.model.add_complex_property(owner, native_name, &ty)?;
                self.added(owner, collection, path, NativeType::Document);
                self.fold_fields(&ty, collection, path, nested)
            }
            NativeValue::Array(items) => self.register_array(owner, collection, path, items),
            scalar => match PrimitiveType::from_native(scalar.native_type()) {
                Some(p) => {
                    self.model
                        .add_primitive_property(owner, native_name, ValueType::Nullable(p))?;
                    self.added(owner, collection, path, scalar.native_type());
                    Ok(())
                }
                None => {
                    self.unresolvable(collection, path, "no primitive representation");
                    Ok(())
                }
            },
        }
    }

    fn register_array(
        &mut self,
        owner: &str,
        collection: &str,
        path: &[&str],
        items: &[NativeValue],
    ) -> Result<()> {
        let Some(native_name) = path.last().copied() else {
            return Ok(());
        };
        let Some(first) = items.iter().find(|v| !v.is_null()) else {
            self.defer(owner, native_name);
            return Ok(());
        };
        match first {
            NativeValue::Document(_) => {
                let Some(ty) = self.complex_type(owner, native_name)? else {
                    return Ok(());
                };
                self.model.add_collection_property(
                    owner,
                    native_name,
                    ValueType::Complex(ty.clone()),
                )?;
                self.added(owner, collection, path, NativeType::Array);
                for element in items {
                    if let NativeValue::Document(nested) = element {
                        self.fold_fields(&ty, collection, path, nested)?;
                    }
                }
                Ok(())
            }
            NativeValue::Array(_) => {
                self.unresolvable(collection, path, "arrays of arrays are not supported");
                Ok(())
            }
            scalar => match PrimitiveType::from_native(scalar.native_type()) {
                Some(p) => {
                    self.model.add_collection_property(
                        owner,
                        native_name,
                        ValueType::Nullable(p),
                    )?;
                    self.added(owner, collection, path, NativeType::Array);
                    Ok(())
                }
                None => {
                    self.unresolvable(collection, path, "no primitive representation");
                    Ok(())
                }
            },
        }
    }

    /// Complex type for a nested object, created if missing
    ///
    /// With global names an existing complex type of the same name is shared,
    /// unless it already embeds the owner; then the per-path name is used.
    fn complex_type(&mut self, owner: &str, field: &str) -> Result<Option<String>> {
        let owner_name = self
            .model
            .resolve_type(owner)
            .map(|ty| ty.name().to_string())
            .ok_or_else(|| Error::UnknownType(owner.to_string()))?;
        let global = self.config.use_global_complex_type_names;
        let mut name = names::complex_type_name(&owner_name, field, global);
        if global && self.model.embeds(&self.model.qualify(&name), owner) {
            // The shared type already contains the owner; nesting it would recurse
            debug!(
                target: "docshape::metadata",
                owner,
                field,
                "Shared complex type would contain itself; using per-path name"
            );
            name = names::complex_type_name(&owner_name, field, false);
        }
        let full_name = self.model.qualify(&name);
        if self.model.embeds(&full_name, owner) {
            warn!(
                target: "docshape::metadata",
                owner,
                field,
                type_name = %full_name,
                "Complex type would contain itself; skipping field"
            );
            return Ok(None);
        }
        match self.model.resolve_type(&full_name).map(|ty| ty.kind()) {
            Some(ResourceTypeKind::Complex) => Ok(Some(full_name)),
            Some(ResourceTypeKind::Entity) => {
                warn!(
                    target: "docshape::metadata",
                    owner,
                    field,
                    type_name = %full_name,
                    "Complex type name taken by an entity type; skipping field"
                );
                Ok(None)
            }
            None => {
                self.model.add_complex_type(&name)?;
                self.changed = true;
                Ok(Some(full_name))
            }
        }
    }

    fn record(&mut self, collection: &str, path: &[&str], native: NativeType) {
        let previous = self
            .provider_types
            .record(names::qualified_path(collection, path), native);
        if previous != Some(native) {
            self.changed = true;
        }
    }

    /// Bookkeeping after a property was added to `owner`
    fn added(&mut self, owner: &str, collection: &str, path: &[&str], native: NativeType) {
        if let Some(native_name) = path.last() {
            self.deferred
                .retain(|d| !(d.owner == owner && d.native_name == *native_name));
        }
        self.record(collection, path, native);
        self.changed = true;
        debug!(
            target: "docshape::metadata",
            path = %names::qualified_path(collection, path),
            native = %native,
            "Registered field"
        );
    }

    fn defer(&mut self, owner: &str, native_name: &str) {
        let deferred = Deferred {
            owner: owner.to_string(),
            native_name: native_name.to_string(),
        };
        if !self.deferred.contains(&deferred) {
            self.deferred.push(deferred);
        }
    }

    fn unresolvable(&self, collection: &str, path: &[&str], reason: &str) {
        let error = Error::unresolvable(names::qualified_path(collection, path), reason);
        debug!(target: "docshape::metadata", error = %error, "Skipping field");
    }

    /// Finalize deferred fields and make sure the entity carries a key
    fn finish_collection(&mut self, entity: &str, collection: &str) -> Result<()> {
        for deferred in std::mem::take(&mut self.deferred) {
            let known = self
                .model
                .resolve_type(&deferred.owner)
                .and_then(|ty| ty.property_by_native(&deferred.native_name))
                .is_some();
            if known {
                continue;
            }
            self.model.add_primitive_property(
                &deferred.owner,
                &deferred.native_name,
                ValueType::Nullable(PrimitiveType::String),
            )?;
            self.changed = true;
            debug!(
                target: "docshape::metadata",
                collection,
                owner = %deferred.owner,
                field = %deferred.native_name,
                "Finalized unresolved field as nullable string"
            );
        }

        let has_key = self
            .model
            .resolve_type(entity)
            .and_then(|ty| ty.key_property())
            .is_some();
        if !has_key {
            self.model.add_key_property(
                entity,
                NATIVE_ID_FIELD,
                ValueType::Primitive(PrimitiveType::String),
            )?;
            self.provider_types.assume(
                names::qualified_path(collection, &[NATIVE_ID_FIELD]),
                NativeType::ObjectId,
            );
            self.changed = true;
            debug!(target: "docshape::metadata", collection, "Added synthetic key");
        }
        Ok(())
    }
}

fn with<'p>(prefix: &[&'p str], name: &'p str) -> Vec<&'p str> {
    let mut path = prefix.to_vec();
    path.push(name);
    path
}
