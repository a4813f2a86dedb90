//! Metadata cache
//!
//! One entry per store identity. An entry is populated synchronously on first
//! access under its own lock; readers take the populated `Arc<Metadata>`
//! without that lock. Dynamic discovery replaces the entry's snapshot under
//! the same lock (copy-on-write), bumping a generation counter consumers use
//! to notice the change.
//!
//! The entry owns the mutable model. Consumers always receive a frozen
//! `consumer_snapshot()` copy.
//!
//! Population failures are not cached: the next access retries.

use crate::inference;
use dashmap::DashMap;
use docshape_core::{Document, Metadata, MetadataConfig, ResourceModel, Result};
use docshape_storage::DocumentStore;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Process-wide cache shared by providers opened without an explicit cache
static GLOBAL_CACHE: Lazy<Arc<MetadataCache>> = Lazy::new(|| Arc::new(MetadataCache::new()));

#[derive(Debug, Default)]
struct CacheEntry {
    /// Serializes population and dynamic folds
    populate: Mutex<()>,
    /// Populated metadata and its generation
    state: RwLock<Option<(u64, Arc<Metadata>)>>,
}

impl CacheEntry {
    fn current(&self) -> Option<(u64, Arc<Metadata>)> {
        self.state.read().clone()
    }
}

/// Metadata cache keyed by store identity
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    /// Generations are unique across the cache, so a repopulated entry never
    /// repeats the generation of the entry it replaced
    generation: AtomicU64,
}

impl MetadataCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache
    pub fn global() -> Arc<MetadataCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn entry(&self, identity: &str) -> Arc<CacheEntry> {
        // Clone out of the map so no shard lock is held during population
        Arc::clone(
            self.entries
                .entry(identity.to_string())
                .or_default()
                .value(),
        )
    }

    /// Shared metadata for a store, populating it on first access
    ///
    /// The entry is keyed by identity only; the configuration of the first
    /// successful population applies to every later caller.
    ///
    /// # Errors
    ///
    /// Store failures and invalid configuration. Nothing is cached on error.
    pub fn get_or_populate(
        &self,
        store: &dyn DocumentStore,
        config: &MetadataConfig,
    ) -> Result<Arc<Metadata>> {
        Ok(self.get_or_populate_versioned(store, config)?.1)
    }

    pub(crate) fn get_or_populate_versioned(
        &self,
        store: &dyn DocumentStore,
        config: &MetadataConfig,
    ) -> Result<(u64, Arc<Metadata>)> {
        let entry = self.entry(store.identity());
        if let Some(current) = entry.current() {
            return Ok(current);
        }

        let _guard = entry.populate.lock();
        // Another caller may have populated while we waited
        if let Some(current) = entry.current() {
            return Ok(current);
        }
        debug!(target: "docshape::metadata", store = store.identity(), "Populating metadata");
        let metadata = Arc::new(inference::infer_metadata(store, config)?);
        let generation = self.next_generation();
        *entry.state.write() = Some((generation, Arc::clone(&metadata)));
        Ok((generation, metadata))
    }

    /// Frozen copy of a store's resource model
    pub fn build_metadata(
        &self,
        store: &dyn DocumentStore,
        config: &MetadataConfig,
    ) -> Result<ResourceModel> {
        Ok(self.snapshot(store, config)?.model)
    }

    /// Frozen consumer copy of a store's full metadata
    pub fn snapshot(&self, store: &dyn DocumentStore, config: &MetadataConfig) -> Result<Metadata> {
        self.get_or_populate(store, config)?.consumer_snapshot()
    }

    /// Current generation and metadata of a populated entry
    pub fn current(&self, identity: &str) -> Option<(u64, Arc<Metadata>)> {
        self.entries.get(identity).and_then(|entry| entry.current())
    }

    /// Fold documents read at runtime into a populated entry
    ///
    /// Returns the latest metadata for the entry (new or unchanged), or None
    /// if the entry is not populated.
    pub fn fold(
        &self,
        identity: &str,
        config: &MetadataConfig,
        collection: &str,
        documents: &[Document],
    ) -> Result<Option<Arc<Metadata>>> {
        let Some(entry) = self.entries.get(identity).map(|e| Arc::clone(e.value())) else {
            return Ok(None);
        };
        let _guard = entry.populate.lock();
        let Some((_, current)) = entry.current() else {
            return Ok(None);
        };

        let mut updated: Option<Metadata> = None;
        for document in documents {
            let target = updated.get_or_insert_with(|| (*current).clone());
            if !inference::fold_into(target, config, collection, document)? {
                continue;
            }
            debug!(
                target: "docshape::metadata",
                store = identity,
                collection,
                "Dynamic discovery changed metadata"
            );
        }
        match updated {
            Some(metadata) if metadata != *current => {
                let metadata = Arc::new(metadata);
                *entry.state.write() = Some((self.next_generation(), Arc::clone(&metadata)));
                Ok(Some(metadata))
            }
            _ => Ok(Some(current)),
        }
    }

    /// Drop the entry for one store; the next access repopulates
    pub fn reset(&self, identity: &str) -> bool {
        let removed = self.entries.remove(identity).is_some();
        if removed {
            info!(target: "docshape::metadata", store = identity, "Metadata cache entry reset");
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!(target: "docshape::metadata", entries = count, "Metadata cache cleared");
    }

    /// True if metadata for the identity is populated
    pub fn contains(&self, identity: &str) -> bool {
        self.current(identity).is_some()
    }

    /// Number of entries (populated or in progress)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
