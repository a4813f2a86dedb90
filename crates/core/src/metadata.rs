//! Metadata snapshot: model + provider types + generated shapes
//!
//! One `Metadata` value is what a cache entry holds and what each consumer
//! receives a private copy of. Consumers freeze their copy; the cache keeps
//! mutating its own.

use crate::error::Result;
use crate::model::ResourceModel;
use crate::provider_types::ProviderTypeMap;
use crate::shape::StructuralShape;
use std::collections::HashMap;

/// Resource model together with the native-type knowledge needed to query it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    /// Typed model
    pub model: ResourceModel,
    /// Qualified field path → native type
    pub provider_types: ProviderTypeMap,
    /// Collection → full structural shape (the generated-type map)
    pub shapes: HashMap<String, StructuralShape>,
}

impl Metadata {
    /// Wrap a model and provider type map, building shapes for every set
    pub fn new(model: ResourceModel, provider_types: ProviderTypeMap) -> Result<Self> {
        let mut metadata = Metadata {
            model,
            provider_types,
            shapes: HashMap::new(),
        };
        metadata.rebuild_shapes()?;
        Ok(metadata)
    }

    /// Recompute the generated-type map from the current model
    pub fn rebuild_shapes(&mut self) -> Result<()> {
        let mut shapes = HashMap::new();
        for set in self.model.sets() {
            let shape =
                StructuralShape::for_collection(&self.model, &self.provider_types, set.name())?;
            shapes.insert(set.name().to_string(), shape);
        }
        self.shapes = shapes;
        Ok(())
    }

    /// Full shape of a collection
    pub fn shape(&self, collection: &str) -> Option<&StructuralShape> {
        self.shapes.get(collection)
    }

    /// Consumer copy: cloned model (placeholders applied), frozen
    pub fn consumer_snapshot(&self) -> Result<Metadata> {
        let mut model = self.model.clone_model();
        model.freeze();
        Metadata::new(model, self.provider_types.clone())
    }
}
