//! DocumentProvider: the consumer-facing facade
//!
//! A provider binds one store to one metadata cache. It exposes:
//! - metadata lookups (`resolve_type`, `resolve_set`, `resolve_property`, ...)
//! - query execution (`execute`, `query`, `count`)
//! - change tracking (`begin_changes`)
//!
//! Lookups and translation run against a frozen consumer snapshot. The
//! snapshot follows the cache: when dynamic discovery or a reset changes the
//! shared entry, the next access takes a fresh snapshot.

use crate::cache::MetadataCache;
use crate::stream::{Discovery, ResourceStream};
use docshape_concurrency::ChangeTracker;
use docshape_core::{
    Error, Metadata, MetadataConfig, ResourceProperty, ResourceSet, ResourceType, Result,
};
use docshape_query::{QueryExpr, QueryOp, TranslateOptions, TranslatedQuery, Translator};
use docshape_storage::DocumentStore;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of executing a query
#[derive(Debug)]
pub enum QueryOutcome {
    /// Resource instances, converted lazily
    Rows(ResourceStream),
    /// Number of matching documents
    Count(u64),
}

impl QueryOutcome {
    /// Rows, or `InvalidOperation` for a count
    pub fn into_rows(self) -> Result<ResourceStream> {
        match self {
            QueryOutcome::Rows(rows) => Ok(rows),
            QueryOutcome::Count(_) => Err(Error::InvalidOperation(
                "query ends in Count; it has no rows".to_string(),
            )),
        }
    }

    /// Count, or `InvalidOperation` for rows
    pub fn into_count(self) -> Result<u64> {
        match self {
            QueryOutcome::Count(n) => Ok(n),
            QueryOutcome::Rows(_) => Err(Error::InvalidOperation(
                "query does not end in Count".to_string(),
            )),
        }
    }
}

/// Typed access to one document store
pub struct DocumentProvider {
    store: Arc<dyn DocumentStore>,
    config: MetadataConfig,
    cache: Arc<MetadataCache>,
    snapshot: RwLock<(u64, Arc<Metadata>)>,
}

impl fmt::Debug for DocumentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentProvider")
            .field("store", &self.store.identity())
            .field("config", &self.config)
            .field("generation", &self.snapshot.read().0)
            .finish()
    }
}

impl DocumentProvider {
    /// Open a provider over the process-wide metadata cache
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a store failure while populating metadata.
    pub fn open(store: Arc<dyn DocumentStore>, config: MetadataConfig) -> Result<Self> {
        Self::open_with_cache(store, config, MetadataCache::global())
    }

    /// Open a provider over an explicit metadata cache
    pub fn open_with_cache(
        store: Arc<dyn DocumentStore>,
        config: MetadataConfig,
        cache: Arc<MetadataCache>,
    ) -> Result<Self> {
        config.validate()?;
        let (generation, shared) = cache.get_or_populate_versioned(store.as_ref(), &config)?;
        let snapshot = Arc::new(shared.consumer_snapshot()?);
        info!(
            target: "docshape::metadata",
            store = store.identity(),
            sets = snapshot.model.sets().count(),
            generation,
            "Provider opened"
        );
        Ok(DocumentProvider {
            store,
            config,
            cache,
            snapshot: RwLock::new((generation, snapshot)),
        })
    }

    /// Identity of the underlying store
    pub fn identity(&self) -> &str {
        self.store.identity()
    }

    /// Configuration the provider was opened with
    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    /// Cache the provider reads metadata from
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Current frozen metadata snapshot
    ///
    /// A failed refresh is logged and the previous snapshot is returned.
    pub fn metadata(&self) -> Arc<Metadata> {
        if let Err(e) = self.refresh() {
            warn!(
                target: "docshape::metadata",
                store = self.store.identity(),
                error = %e,
                "Metadata refresh failed; using previous snapshot"
            );
        }
        Arc::clone(&self.snapshot.read().1)
    }

    /// Take a new snapshot if the cache entry changed
    ///
    /// Repopulates the entry if it was reset. Returns true if the snapshot
    /// was replaced.
    pub fn refresh(&self) -> Result<bool> {
        let (generation, shared) = match self.cache.current(self.store.identity()) {
            Some(current) => current,
            None => self
                .cache
                .get_or_populate_versioned(self.store.as_ref(), &self.config)?,
        };
        if generation == self.snapshot.read().0 {
            return Ok(false);
        }
        let fresh = Arc::new(shared.consumer_snapshot()?);
        let mut snapshot = self.snapshot.write();
        if snapshot.0 == generation {
            return Ok(false);
        }
        *snapshot = (generation, fresh);
        debug!(
            target: "docshape::metadata",
            store = self.store.identity(),
            generation,
            "Took new metadata snapshot"
        );
        Ok(true)
    }

    /// Resolve a type by full name
    pub fn resolve_type(&self, full_name: &str) -> Option<ResourceType> {
        self.metadata().model.resolve_type(full_name).cloned()
    }

    /// Resolve a resource set by name
    pub fn resolve_set(&self, name: &str) -> Option<ResourceSet> {
        self.metadata().model.resolve_set(name).cloned()
    }

    /// Resolve a property of a type
    pub fn resolve_property(&self, type_name: &str, property: &str) -> Option<ResourceProperty> {
        self.metadata()
            .model
            .resolve_property(type_name, property)
            .cloned()
    }

    /// Resource set exposing an entity type
    pub fn resolve_set_for_type(&self, type_name: &str) -> Option<ResourceSet> {
        self.metadata().model.resolve_set_for_type(type_name).cloned()
    }

    /// Translate without executing
    pub fn translate(&self, query: &QueryExpr) -> Result<TranslatedQuery> {
        let metadata = self.metadata();
        Translator::new(&metadata, TranslateOptions::from(&self.config)).translate(query)
    }

    /// Translate and execute a query
    ///
    /// # Errors
    ///
    /// Translation errors (`UnknownResourceSet`, `StructuralMismatch`,
    /// `UnsupportedExpression`) before anything reaches the store; store
    /// failures unchanged.
    pub fn execute(&self, query: &QueryExpr) -> Result<QueryOutcome> {
        let metadata = self.metadata();
        let translated =
            Translator::new(&metadata, TranslateOptions::from(&self.config)).translate(query)?;
        debug!(
            target: "docshape::query",
            set = %query.set,
            native = ?translated.native,
            count = translated.count,
            "Executing query"
        );
        if translated.count {
            return Ok(QueryOutcome::Count(self.store.count(&translated.native)?));
        }
        let cursor = self.store.execute(&translated.native)?;
        let discovery = self.config.update_dynamically.then(|| Discovery {
            cache: Arc::clone(&self.cache),
            identity: self.store.identity().to_string(),
            config: self.config,
        });
        Ok(QueryOutcome::Rows(ResourceStream::new(
            cursor,
            query.set.clone(),
            metadata,
            translated.projection,
            discovery,
        )))
    }

    /// Execute a row query
    pub fn query(&self, query: &QueryExpr) -> Result<ResourceStream> {
        self.execute(query)?.into_rows()
    }

    /// Count the resources a query matches
    ///
    /// A trailing `Count` is added if the query does not end in one.
    pub fn count(&self, query: &QueryExpr) -> Result<u64> {
        if matches!(query.ops.last(), Some(QueryOp::Count)) {
            return self.execute(query)?.into_count();
        }
        self.execute(&query.clone().count())?.into_count()
    }

    /// Start a unit of work against the current snapshot
    pub fn begin_changes(&self) -> ChangeTracker {
        ChangeTracker::new(Arc::clone(&self.store), self.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshape_core::{PropertyValue, ResourceInstance};
    use docshape_query::Expr;
    use docshape_storage::MemoryStore;
    use serde_json::json;

    fn grocery() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, name, price) in [(1, "Bread", 2.5), (2, "Milk", 1.25), (3, "Wine", 12.0)] {
            store
                .insert_json("Products", json!({"ID": id, "Name": name, "Price": price}))
                .unwrap();
        }
        store
    }

    fn provider(store: Arc<MemoryStore>, config: MetadataConfig) -> DocumentProvider {
        DocumentProvider::open_with_cache(store, config, Arc::new(MetadataCache::new())).unwrap()
    }

    fn names(stream: ResourceStream) -> Vec<String> {
        stream
            .map(|r| r.unwrap().get("Name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_filter_order_page() {
        let provider = provider(grocery(), MetadataConfig::default());
        let query = QueryExpr::new("Products")
            .filter(Expr::prop("Price").gt(Expr::constant(2)))
            .order_by_desc(Expr::prop("Price"));
        assert_eq!(names(provider.query(&query).unwrap()), vec!["Wine", "Bread"]);

        let page = QueryExpr::new("Products")
            .order_by(Expr::prop("Name"))
            .skip(1)
            .take(1);
        assert_eq!(names(provider.query(&page).unwrap()), vec!["Milk"]);
    }

    #[test]
    fn test_count_and_outcome_kinds() {
        let provider = provider(grocery(), MetadataConfig::default());
        let query =
            QueryExpr::new("Products").filter(Expr::prop("Name").ne(Expr::constant("Milk")));
        assert_eq!(provider.count(&query).unwrap(), 2);
        assert_eq!(provider.count(&query.clone().count()).unwrap(), 2);
        assert!(matches!(
            provider.query(&query.count()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_projection_hides_other_properties() {
        let provider = provider(grocery(), MetadataConfig::default());
        let query = QueryExpr::new("Products")
            .filter(Expr::prop("Name").eq(Expr::constant("Milk")))
            .select(vec![Expr::prop("Name")]);
        let rows: Vec<ResourceInstance> = provider
            .query(&query)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name").unwrap(), &PropertyValue::from("Milk"));
        assert!(rows[0].get("ID").unwrap_err().is_structural_mismatch());
    }

    #[test]
    fn test_lookups_use_frozen_snapshot() {
        let provider = provider(grocery(), MetadataConfig::default());
        let set = provider.resolve_set("Products").unwrap();
        assert!(set.is_read_only());
        let ty = provider.resolve_type(set.entity_type()).unwrap();
        assert_eq!(
            provider.resolve_set_for_type(ty.full_name()).unwrap().name(),
            "Products"
        );
        assert!(provider.resolve_property(ty.full_name(), "Price").is_some());
        assert!(provider.resolve_property(ty.full_name(), "Colour").is_none());
        assert!(provider.metadata().model.is_frozen());
    }

    #[test]
    fn test_dynamic_discovery_reaches_later_snapshots() {
        let config = MetadataConfig {
            update_dynamically: true,
            ..MetadataConfig::with_prefetch(1)
        };
        let store = grocery();
        store
            .insert_json("Products", json!({"ID": 4, "Name": "Cheese", "Aged": true}))
            .unwrap();
        let provider = provider(store, config);
        assert!(provider.resolve_property("Docshape.Products", "Aged").is_none());

        let rows: Vec<ResourceInstance> = provider
            .query(&QueryExpr::new("Products"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[3].get("Aged").unwrap(), &PropertyValue::Boolean(true));
        // Converted before the field was discovered
        assert!(rows[0].get("Aged").unwrap_err().is_structural_mismatch());
        assert!(provider.resolve_property("Docshape.Products", "Aged").is_some());

        let aged = QueryExpr::new("Products").filter(Expr::prop("Aged").eq(Expr::constant(true)));
        assert_eq!(provider.count(&aged).unwrap(), 1);
    }

    #[test]
    fn test_reset_entry_is_repopulated_on_access() {
        let store = grocery();
        let provider = provider(store.clone(), MetadataConfig::default());
        store
            .insert_json("Products", json!({"Name": "Olives", "Jar": "small"}))
            .unwrap();
        assert!(provider.cache().reset(provider.identity()));
        assert!(provider.resolve_property("Docshape.Products", "Jar").is_some());
    }
}
