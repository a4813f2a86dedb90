//! MemoryStore: in-process document store
//!
//! Collections are insertion-ordered `Vec<Document>` behind one
//! `parking_lot::RwLock`; insertion order is the natural order. Query
//! results are materialized under the read lock and handed out as an owning
//! cursor, so readers never hold the lock while the caller iterates.
//!
//! Filters use the strict comparison in [`crate::eval`]. Statistics count
//! scans, executed queries and documents returned, which tests use to check
//! how much of a collection a component actually read.

use crate::eval;
use crate::query::{NativeQuery, ScanOrder};
use crate::traits::{DocumentCursor, DocumentStore};
use docshape_core::native::NATIVE_ID_FIELD;
use docshape_core::{Document, Error, NativeValue, ObjectId, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Read counters of a `MemoryStore`
#[derive(Debug, Default)]
pub struct StoreStats {
    scans: AtomicU64,
    queries: AtomicU64,
    documents_read: AtomicU64,
}

impl StoreStats {
    /// Natural-order scans served
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Native queries executed (including counts)
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Documents handed out by scans and queries
    pub fn documents_read(&self) -> u64 {
        self.documents_read.load(Ordering::Relaxed)
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.scans.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        self.documents_read.store(0, Ordering::Relaxed);
    }
}

/// In-memory document store
#[derive(Debug)]
pub struct MemoryStore {
    identity: String,
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    stats: StoreStats,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with a unique identity
    pub fn new() -> Self {
        Self::with_identity(format!("memory://{}", uuid::Uuid::new_v4()))
    }

    /// Create an empty store with a fixed identity
    ///
    /// Two stores with the same identity share cached metadata.
    pub fn with_identity(identity: impl Into<String>) -> Self {
        MemoryStore {
            identity: identity.into(),
            collections: RwLock::new(BTreeMap::new()),
            stats: StoreStats::default(),
        }
    }

    /// Create an empty collection (no-op if it exists)
    pub fn create_collection(&self, name: &str) {
        self.collections.write().entry(name.to_string()).or_default();
    }

    /// Drop a collection, returning whether it existed
    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// Insert a JSON object (extended forms `$oid`, `$date`, `$numberLong` accepted)
    pub fn insert_json(&self, collection: &str, value: serde_json::Value) -> Result<NativeValue> {
        self.insert(collection, Document::from_json(value)?)
    }

    /// Snapshot of a collection in natural order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Read counters
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn cursor(&self, documents: Vec<Document>) -> DocumentCursor {
        self.stats
            .documents_read
            .fetch_add(documents.len() as u64, Ordering::Relaxed);
        Box::new(documents.into_iter().map(Ok))
    }

    fn run_query(&self, query: &NativeQuery) -> Vec<Document> {
        let collections = self.collections.read();
        let Some(documents) = collections.get(&query.collection) else {
            return Vec::new();
        };
        let mut selected: Vec<(usize, Document)> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| query.filter.as_ref().map_or(true, |f| eval::matches(f, doc)))
            .map(|(i, doc)| (i, doc.clone()))
            .collect();
        drop(collections);

        eval::sort_documents(&mut selected, &query.sort);
        let skip = query.skip.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = query.limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, doc)| doc)
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn scan(
        &self,
        collection: &str,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<DocumentCursor> {
        self.stats.scans.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read();
        let documents = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        let limit = limit.unwrap_or(usize::MAX);
        let sampled: Vec<Document> = match order {
            ScanOrder::Forward => documents.iter().take(limit).cloned().collect(),
            ScanOrder::Reverse => documents.iter().rev().take(limit).cloned().collect(),
        };
        drop(collections);
        Ok(self.cursor(sampled))
    }

    fn execute(&self, query: &NativeQuery) -> Result<DocumentCursor> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "docshape::store",
            collection = %query.collection,
            filter = ?query.filter.as_ref().map(|f| f.to_string()),
            sort = query.sort.len(),
            skip = ?query.skip,
            limit = ?query.limit,
            "Executing native query"
        );
        let documents = self.run_query(query);
        Ok(self.cursor(documents))
    }

    fn count(&self, query: &NativeQuery) -> Result<u64> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.run_query(query).len() as u64)
    }

    fn insert(&self, collection: &str, document: Document) -> Result<NativeValue> {
        let mut collections = self.collections.write();
        let documents = collections.entry(collection.to_string()).or_default();

        let (id, document) = match document.id() {
            Some(id) if !id.is_null() => (id.clone(), document),
            _ => {
                let id = NativeValue::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert(NATIVE_ID_FIELD, id.clone());
                for (key, value) in document {
                    if key != NATIVE_ID_FIELD {
                        with_id.insert(key, value);
                    }
                }
                (id, with_id)
            }
        };
        if documents.iter().any(|d| d.id() == Some(&id)) {
            return Err(Error::store(
                "insert",
                format!("duplicate key {:?} in '{}'", id, collection),
            ));
        }
        documents.push(document);
        Ok(id)
    }

    fn update(
        &self,
        collection: &str,
        id: &NativeValue,
        set: Document,
        unset: Vec<String>,
    ) -> Result<u64> {
        if set.contains_key(NATIVE_ID_FIELD) || unset.iter().any(|f| f == NATIVE_ID_FIELD) {
            return Err(Error::store(
                "update",
                format!("field '{}' is immutable", NATIVE_ID_FIELD),
            ));
        }
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(document) = documents.iter_mut().find(|d| d.id() == Some(id)) else {
            return Ok(0);
        };
        for (key, value) in set {
            document.insert(key, value);
        }
        for key in &unset {
            document.remove(key);
        }
        Ok(1)
    }

    fn delete(&self, collection: &str, id: &NativeValue) -> Result<u64> {
        let mut collections = self.collections.write();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|d| d.id() != Some(id));
        Ok((before - documents.len()) as u64)
    }
}
